//! The GPU runtime seam.
//!
//! Everything below this module talks in raw runtime status codes; everything
//! above it talks in [`DeviceError`]. [`check`] is the only bridge.
//!
//! Implementations:
//! - [`DynRuntime`]: `libcudart` / `libamdhip64` loaded at run time (no build-time SDK)
//! - [`NullRuntime`]: no driver present, every call fails
//! - [`SimRuntime`]: in-process simulation for tests and CPU-only hosts

pub mod ffi;
pub mod null;
pub mod sim;

use std::ffi::{c_int, c_void};
use std::fmt;

use crate::error::DeviceError;

pub use ffi::{DynRuntime, RuntimeFlavor};
pub use null::NullRuntime;
pub use sim::{SimDriver, SimOp, SimRuntime, SimStats};

/// Raw status code returned by a runtime call.
///
/// Numbering follows the CUDA runtime (HIP uses the same values for the codes below).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub c_int);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const INVALID_VALUE: Status = Status(1);
    pub const INITIALIZATION_ERROR: Status = Status(3);
    pub const INSUFFICIENT_DRIVER: Status = Status(35);
    pub const NO_DEVICE: Status = Status(100);
    pub const INVALID_DEVICE: Status = Status(101);
    pub const INVALID_RESOURCE_HANDLE: Status = Status(400);
    pub const NOT_SUPPORTED: Status = Status(801);

    pub fn is_success(self) -> bool {
        self == Status::SUCCESS
    }

    /// Turn a raw FFI return code into a `Result`.
    pub fn into_result(self) -> Result<(), Status> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Fallback description used when the runtime cannot describe a code itself.
    pub fn describe(self) -> &'static str {
        match self {
            Status::SUCCESS => "no error",
            Status::INVALID_VALUE => "invalid argument",
            Status::INITIALIZATION_ERROR => "initialization error",
            Status::INSUFFICIENT_DRIVER => "GPU driver version is insufficient for runtime version",
            Status::NO_DEVICE => "no GPU-capable device is detected",
            Status::INVALID_DEVICE => "invalid device ordinal",
            Status::INVALID_RESOURCE_HANDLE => "invalid resource handle",
            Status::NOT_SUPPORTED => "operation not supported",
            _ => "unknown error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.describe())
    }
}

/// Direction of a memory copy. Discriminants match `cudaMemcpyKind` / `hipMemcpyKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MemcpyKind {
    HostToHost = 0,
    HostToDevice = 1,
    DeviceToHost = 2,
    DeviceToDevice = 3,
    /// Direction inferred from the pointers (unified addressing).
    Default = 4,
}

impl MemcpyKind {
    pub fn as_raw(self) -> c_int {
        self as c_int
    }
}

/// Opaque handle to a runtime stream.
///
/// This crate never creates or destroys streams; it only passes handles the
/// caller already owns back to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Stream(*mut c_void);

// Stream handles are process-global identifiers; the runtime synchronizes access.
unsafe impl Send for Stream {}
unsafe impl Sync for Stream {}

impl Stream {
    /// The legacy default stream (null handle).
    pub const DEFAULT: Stream = Stream(std::ptr::null_mut());

    /// Wrap a raw `cudaStream_t` / `hipStream_t`.
    ///
    /// # Safety
    /// `raw` must be null or a live stream created by the runtime this handle is used with.
    pub unsafe fn from_raw(raw: *mut c_void) -> Self {
        Stream(raw)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_default(self) -> bool {
        self.0.is_null()
    }
}

impl Default for Stream {
    fn default() -> Self {
        Stream::DEFAULT
    }
}

/// Raw GPU runtime operations.
///
/// Device selection (`get_device` / `set_device`) is per calling thread, as in
/// the CUDA and HIP runtimes.
pub trait GpuRuntime: Send + Sync {
    /// Short name used in diagnostics (`"cuda"`, `"hip"`, `"sim"`, ...).
    fn name(&self) -> &str;

    fn get_device_count(&self) -> Result<c_int, Status>;

    fn get_device(&self) -> Result<c_int, Status>;

    fn set_device(&self, device: c_int) -> Result<(), Status>;

    fn device_synchronize(&self) -> Result<(), Status>;

    fn stream_synchronize(&self, stream: Stream) -> Result<(), Status>;

    /// Enqueue a copy of `nbytes` from `src` to `dst` on `stream`.
    ///
    /// # Safety
    /// `dst` and `src` must be valid for `nbytes` bytes in the address spaces
    /// implied by `kind`, and stay valid until the stream has drained.
    unsafe fn memcpy_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        nbytes: usize,
        kind: MemcpyKind,
        stream: Stream,
    ) -> Result<(), Status>;

    /// Whether [`GpuRuntime::memcpy_with_stream`] is a real combined primitive.
    fn supports_memcpy_with_stream(&self) -> bool {
        false
    }

    /// Copy and wait for `stream` in a single runtime call.
    ///
    /// # Safety
    /// Same contract as [`GpuRuntime::memcpy_async`].
    unsafe fn memcpy_with_stream(
        &self,
        _dst: *mut c_void,
        _src: *const c_void,
        _nbytes: usize,
        _kind: MemcpyKind,
        _stream: Stream,
    ) -> Result<(), Status> {
        Err(Status::NOT_SUPPORTED)
    }

    /// Human-readable description of `status`.
    fn error_string(&self, status: Status) -> String {
        status.describe().to_string()
    }
}

/// Translate a runtime result into a crate error carrying the code and the
/// runtime's own message.
pub fn check<T>(
    runtime: &dyn GpuRuntime,
    result: Result<T, Status>,
    context: &'static str,
) -> crate::Result<T> {
    result.map_err(|status| DeviceError::Runtime {
        code: status.0,
        message: runtime.error_string(status),
        context,
    })
}
