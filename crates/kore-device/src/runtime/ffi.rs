//! Runtime-loaded CUDA / HIP runtime entry points via dlopen.
//!
//! Both runtimes expose the same C signatures for the calls this crate needs,
//! differing only in the `cuda` / `hip` symbol prefix, so one loader serves both.
//! Nothing is linked at build time.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::Path;

use libloading::Library;

use super::{GpuRuntime, MemcpyKind, Status, Stream};

type FnGetDeviceCount = unsafe extern "C" fn(*mut c_int) -> c_int;
type FnGetDevice = unsafe extern "C" fn(*mut c_int) -> c_int;
type FnSetDevice = unsafe extern "C" fn(c_int) -> c_int;
type FnDeviceSynchronize = unsafe extern "C" fn() -> c_int;
type FnStreamSynchronize = unsafe extern "C" fn(*mut c_void) -> c_int;
type FnMemcpyAsync = unsafe extern "C" fn(
    *mut c_void, *const c_void, usize, c_int, *mut c_void,
) -> c_int;
type FnMemcpyWithStream = unsafe extern "C" fn(
    *mut c_void, *const c_void, usize, c_int, *mut c_void,
) -> c_int;
type FnGetErrorString = unsafe extern "C" fn(c_int) -> *const c_char;

/// Which vendor runtime a [`DynRuntime`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFlavor {
    Cuda,
    Hip,
}

impl RuntimeFlavor {
    /// Library names tried in order when no explicit path is configured.
    pub fn default_libraries(self) -> &'static [&'static str] {
        match self {
            RuntimeFlavor::Cuda => &[
                "libcudart.so",
                "libcudart.so.12",
                "libcudart.so.11.0",
                "cudart64_12.dll",
                "cudart64_110.dll",
            ],
            RuntimeFlavor::Hip => &["libamdhip64.so", "libamdhip64.so.6", "amdhip64.dll"],
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            RuntimeFlavor::Cuda => "cuda",
            RuntimeFlavor::Hip => "hip",
        }
    }

    pub fn name(self) -> &'static str {
        self.prefix()
    }
}

/// A vendor GPU runtime resolved from a shared library at run time.
pub struct DynRuntime {
    _lib: Library,
    flavor: RuntimeFlavor,
    get_device_count: FnGetDeviceCount,
    get_device: FnGetDevice,
    set_device: FnSetDevice,
    device_synchronize: FnDeviceSynchronize,
    stream_synchronize: FnStreamSynchronize,
    memcpy_async: FnMemcpyAsync,
    memcpy_with_stream: Option<FnMemcpyWithStream>,
    get_error_string: FnGetErrorString,
}

// Safety: the resolved entry points are process-global and the vendor
// runtimes are internally synchronized.
unsafe impl Send for DynRuntime {}
unsafe impl Sync for DynRuntime {}

impl DynRuntime {
    /// Try the flavor's default library names in order.
    pub fn load(flavor: RuntimeFlavor) -> Result<Self, String> {
        let mut last_err = String::from("no candidate libraries");
        for name in flavor.default_libraries() {
            match Self::load_from(flavor, name) {
                Ok(rt) => return Ok(rt),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Load the runtime from an explicit library path or name.
    pub fn load_from(flavor: RuntimeFlavor, library: impl AsRef<Path>) -> Result<Self, String> {
        let path = library.as_ref();
        let lib = unsafe { Library::new(path) }
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        let prefix = flavor.prefix();

        unsafe {
            let get_device_count = *lib
                .get::<FnGetDeviceCount>(symbol(prefix, "GetDeviceCount").as_bytes())
                .map_err(|e| missing(prefix, "GetDeviceCount", e))?;
            let get_device = *lib
                .get::<FnGetDevice>(symbol(prefix, "GetDevice").as_bytes())
                .map_err(|e| missing(prefix, "GetDevice", e))?;
            let set_device = *lib
                .get::<FnSetDevice>(symbol(prefix, "SetDevice").as_bytes())
                .map_err(|e| missing(prefix, "SetDevice", e))?;
            let device_synchronize = *lib
                .get::<FnDeviceSynchronize>(symbol(prefix, "DeviceSynchronize").as_bytes())
                .map_err(|e| missing(prefix, "DeviceSynchronize", e))?;
            let stream_synchronize = *lib
                .get::<FnStreamSynchronize>(symbol(prefix, "StreamSynchronize").as_bytes())
                .map_err(|e| missing(prefix, "StreamSynchronize", e))?;
            let memcpy_async = *lib
                .get::<FnMemcpyAsync>(symbol(prefix, "MemcpyAsync").as_bytes())
                .map_err(|e| missing(prefix, "MemcpyAsync", e))?;
            let get_error_string = *lib
                .get::<FnGetErrorString>(symbol(prefix, "GetErrorString").as_bytes())
                .map_err(|e| missing(prefix, "GetErrorString", e))?;
            // Only HIP ships the combined copy-and-wait entry point (HIP >= 3.1).
            let memcpy_with_stream = match flavor {
                RuntimeFlavor::Hip => lib
                    .get::<FnMemcpyWithStream>(b"hipMemcpyWithStream\0")
                    .ok()
                    .map(|f| *f),
                RuntimeFlavor::Cuda => None,
            };

            tracing::debug!(
                "loaded {} runtime from {} (memcpy_with_stream: {})",
                prefix,
                path.display(),
                memcpy_with_stream.is_some()
            );

            Ok(DynRuntime {
                _lib: lib,
                flavor,
                get_device_count,
                get_device,
                set_device,
                device_synchronize,
                stream_synchronize,
                memcpy_async,
                memcpy_with_stream,
                get_error_string,
            })
        }
    }

    pub fn flavor(&self) -> RuntimeFlavor {
        self.flavor
    }
}

fn symbol(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}\0")
}

fn missing(prefix: &str, name: &str, err: libloading::Error) -> String {
    format!("missing symbol {prefix}{name}: {err}")
}

impl GpuRuntime for DynRuntime {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    fn get_device_count(&self) -> Result<c_int, Status> {
        let mut count: c_int = 0;
        Status(unsafe { (self.get_device_count)(&mut count) }).into_result()?;
        Ok(count)
    }

    fn get_device(&self) -> Result<c_int, Status> {
        let mut device: c_int = 0;
        Status(unsafe { (self.get_device)(&mut device) }).into_result()?;
        Ok(device)
    }

    fn set_device(&self, device: c_int) -> Result<(), Status> {
        Status(unsafe { (self.set_device)(device) }).into_result()
    }

    fn device_synchronize(&self) -> Result<(), Status> {
        Status(unsafe { (self.device_synchronize)() }).into_result()
    }

    fn stream_synchronize(&self, stream: Stream) -> Result<(), Status> {
        Status(unsafe { (self.stream_synchronize)(stream.as_raw()) }).into_result()
    }

    unsafe fn memcpy_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        nbytes: usize,
        kind: MemcpyKind,
        stream: Stream,
    ) -> Result<(), Status> {
        Status((self.memcpy_async)(dst, src, nbytes, kind.as_raw(), stream.as_raw())).into_result()
    }

    fn supports_memcpy_with_stream(&self) -> bool {
        self.memcpy_with_stream.is_some()
    }

    unsafe fn memcpy_with_stream(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        nbytes: usize,
        kind: MemcpyKind,
        stream: Stream,
    ) -> Result<(), Status> {
        match self.memcpy_with_stream {
            Some(f) => Status(f(dst, src, nbytes, kind.as_raw(), stream.as_raw())).into_result(),
            None => Err(Status::NOT_SUPPORTED),
        }
    }

    fn error_string(&self, status: Status) -> String {
        let ptr = unsafe { (self.get_error_string)(status.0) };
        if ptr.is_null() {
            return status.describe().to_string();
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}
