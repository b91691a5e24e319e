//! Synchronizing copy and stream wait, gated by the sync warning level.
//!
//! Both primitives run [`check_sync`] before touching the runtime. With the
//! level at `Error` the runtime is never called.

use std::ffi::c_void;

use crate::context::{context, GpuContext};
use crate::gate::check_sync;
use crate::runtime::{check, MemcpyKind, Stream};
use crate::Result;

impl GpuContext {
    /// Copy `nbytes` from `src` to `dst` on `stream` and block until the stream drains.
    ///
    /// Uses the runtime's combined copy-and-wait call when it has one,
    /// otherwise an async copy followed by a stream synchronize.
    ///
    /// # Safety
    /// `dst` and `src` must be valid for `nbytes` bytes in the address spaces
    /// implied by `kind`.
    #[track_caller]
    pub unsafe fn memcpy_and_sync(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        nbytes: usize,
        kind: MemcpyKind,
        stream: Stream,
    ) -> Result<()> {
        check_sync("memcpy_and_sync")?;
        let rt = self.runtime();
        if rt.supports_memcpy_with_stream() {
            return check(
                rt,
                rt.memcpy_with_stream(dst, src, nbytes, kind, stream),
                "memcpy_with_stream",
            );
        }
        check(rt, rt.memcpy_async(dst, src, nbytes, kind, stream), "memcpy_async")?;
        check(rt, rt.stream_synchronize(stream), "stream_synchronize")
    }

    /// Block until all work queued on `stream` is done.
    #[track_caller]
    pub fn stream_synchronize(&self, stream: Stream) -> Result<()> {
        check_sync("stream_synchronize")?;
        check(self.runtime(), self.runtime.stream_synchronize(stream), "stream_synchronize")
    }
}

/// [`GpuContext::memcpy_and_sync`] on the process-wide context.
///
/// # Safety
/// See [`GpuContext::memcpy_and_sync`].
#[track_caller]
pub unsafe fn memcpy_and_sync(
    dst: *mut c_void,
    src: *const c_void,
    nbytes: usize,
    kind: MemcpyKind,
    stream: Stream,
) -> Result<()> {
    context().memcpy_and_sync(dst, src, nbytes, kind, stream)
}

/// [`GpuContext::stream_synchronize`] on the process-wide context.
#[track_caller]
pub fn stream_synchronize(stream: Stream) -> Result<()> {
    context().stream_synchronize(stream)
}
