//! # kore-device
//!
//! GPU device selection and synchronization primitives for Kore.
//!
//! Provides:
//! - Device enumeration and per-thread device selection (`device_count` never fails)
//! - A process-wide sync warning level (`disabled` / `warn` / `error`)
//! - Synchronized copy and stream wait, both gated by that level so accidental
//!   host/device syncs in hot loops can be surfaced or forbidden
//! - CUDA / HIP runtimes loaded at run time via `libloading`, plus a simulated
//!   runtime for tests and GPU-less hosts
//!
//! ```no_run
//! use kore_device::{set_sync_warning_level, stream_synchronize, Stream, SyncWarningLevel};
//!
//! set_sync_warning_level(SyncWarningLevel::Warn);
//! if kore_device::device_count() > 0 {
//!     stream_synchronize(Stream::DEFAULT)?; // logs a sync warning
//! }
//! # Ok::<(), kore_device::DeviceError>(())
//! ```

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod gate;
pub mod runtime;
pub mod sync;
pub mod warning;

pub use config::{Backend, RuntimeConfig};
pub use context::{context, init, init_with, GpuContext};
pub use device::{
    current_device, device_count, device_count_ensure_non_zero, device_guard, device_synchronize,
    is_available, set_device, DeviceGuard, DeviceIndex,
};
pub use error::DeviceError;
pub use runtime::{GpuRuntime, MemcpyKind, Status, Stream};
pub use sync::{memcpy_and_sync, stream_synchronize};
pub use warning::{
    get_sync_warning_level, set_sync_warning_level, warning_state, SyncWarningLevel, WarningState,
};

pub type Result<T> = std::result::Result<T, DeviceError>;
