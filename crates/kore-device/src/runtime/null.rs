//! Runtime used when no GPU library could be loaded.

use std::ffi::{c_int, c_void};

use super::{GpuRuntime, MemcpyKind, Status, Stream};

/// Every call fails with [`Status::INSUFFICIENT_DRIVER`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRuntime;

impl GpuRuntime for NullRuntime {
    fn name(&self) -> &str {
        "none"
    }

    fn get_device_count(&self) -> Result<c_int, Status> {
        Err(Status::INSUFFICIENT_DRIVER)
    }

    fn get_device(&self) -> Result<c_int, Status> {
        Err(Status::INSUFFICIENT_DRIVER)
    }

    fn set_device(&self, _device: c_int) -> Result<(), Status> {
        Err(Status::INSUFFICIENT_DRIVER)
    }

    fn device_synchronize(&self) -> Result<(), Status> {
        Err(Status::INSUFFICIENT_DRIVER)
    }

    fn stream_synchronize(&self, _stream: Stream) -> Result<(), Status> {
        Err(Status::INSUFFICIENT_DRIVER)
    }

    unsafe fn memcpy_async(
        &self,
        _dst: *mut c_void,
        _src: *const c_void,
        _nbytes: usize,
        _kind: MemcpyKind,
        _stream: Stream,
    ) -> Result<(), Status> {
        Err(Status::INSUFFICIENT_DRIVER)
    }
}
