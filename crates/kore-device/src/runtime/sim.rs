//! In-process simulated GPU runtime.
//!
//! Models just enough of a real runtime to exercise the device and
//! synchronization layers without hardware:
//! - a configurable driver state (healthy, no device, no driver, broken)
//! - a per-thread active device, held in thread-local storage so it goes away
//!   with the thread
//! - per-stream queues: copies are enqueued by `memcpy_async` and only land
//!   in host memory once the stream is synchronized
//! - one-shot failure injection per operation
//! - call counters for every entry point

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_int, c_void};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{GpuRuntime, MemcpyKind, Status, Stream};

/// Driver state reported by a [`SimRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimDriver {
    /// Driver loaded with `devices` visible devices.
    Healthy { devices: c_int },
    /// Driver loaded but no device present.
    NoDevice,
    /// No driver, or one too old for the runtime.
    NoDriver,
    /// Every call fails with the given status.
    Broken(Status),
}

/// Runtime entry points, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    GetDeviceCount,
    GetDevice,
    SetDevice,
    DeviceSynchronize,
    StreamSynchronize,
    MemcpyAsync,
    MemcpyWithStream,
}

/// Number of calls that reached each entry point, successful or not.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimStats {
    pub device_count_calls: usize,
    pub get_device_calls: usize,
    pub set_device_calls: usize,
    pub device_sync_calls: usize,
    pub stream_sync_calls: usize,
    pub memcpy_async_calls: usize,
    pub memcpy_with_stream_calls: usize,
    /// Bytes actually written to destination buffers.
    pub bytes_copied: usize,
}

#[derive(Debug, Clone, Copy)]
struct PendingCopy {
    dst: usize,
    src: usize,
    nbytes: usize,
}

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Active device of this thread, per runtime id. Absent means device 0.
    static CURRENT_DEVICE: RefCell<HashMap<u64, c_int>> = RefCell::new(HashMap::new());
}

/// Simulated runtime. See the module docs.
pub struct SimRuntime {
    id: u64,
    driver: SimDriver,
    combined_copy: bool,
    streams: Mutex<HashSet<usize>>,
    next_stream: AtomicUsize,
    pending: Mutex<HashMap<usize, Vec<PendingCopy>>>,
    injected: Mutex<HashMap<SimOp, Status>>,
    stats: Mutex<SimStats>,
}

impl SimRuntime {
    pub fn new(driver: SimDriver) -> Self {
        Self {
            id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
            driver,
            combined_copy: false,
            streams: Mutex::new(HashSet::new()),
            next_stream: AtomicUsize::new(1),
            pending: Mutex::new(HashMap::new()),
            injected: Mutex::new(HashMap::new()),
            stats: Mutex::new(SimStats::default()),
        }
    }

    /// Healthy driver with `devices` devices.
    pub fn with_devices(devices: c_int) -> Self {
        Self::new(SimDriver::Healthy { devices })
    }

    pub fn no_device() -> Self {
        Self::new(SimDriver::NoDevice)
    }

    pub fn no_driver() -> Self {
        Self::new(SimDriver::NoDriver)
    }

    pub fn broken(status: Status) -> Self {
        Self::new(SimDriver::Broken(status))
    }

    /// Advertise the combined copy-and-wait primitive (as HIP does).
    pub fn with_memcpy_with_stream(mut self, enabled: bool) -> Self {
        self.combined_copy = enabled;
        self
    }

    pub fn driver(&self) -> SimDriver {
        self.driver
    }

    /// Create a stream handle valid for this runtime.
    pub fn create_stream(&self) -> Stream {
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().insert(id);
        // Safety: the id is registered as a live stream of this runtime.
        unsafe { Stream::from_raw(id as *mut c_void) }
    }

    /// Forget a stream; its pending copies are dropped without running.
    pub fn destroy_stream(&self, stream: Stream) {
        let id = stream.as_raw() as usize;
        self.streams.lock().remove(&id);
        self.pending.lock().remove(&id);
    }

    /// Make the next call to `op` fail with `status`.
    pub fn fail_next(&self, op: SimOp, status: Status) {
        self.injected.lock().insert(op, status);
    }

    pub fn stats(&self) -> SimStats {
        *self.stats.lock()
    }

    /// Copies enqueued on `stream` that have not landed yet.
    pub fn pending_copies(&self, stream: Stream) -> usize {
        self.pending
            .lock()
            .get(&(stream.as_raw() as usize))
            .map_or(0, Vec::len)
    }

    fn devices(&self) -> Result<c_int, Status> {
        match self.driver {
            SimDriver::Healthy { devices } => Ok(devices),
            SimDriver::NoDevice => Err(Status::NO_DEVICE),
            SimDriver::NoDriver => Err(Status::INSUFFICIENT_DRIVER),
            SimDriver::Broken(status) => Err(status),
        }
    }

    /// Driver must be healthy with at least one device.
    fn usable(&self) -> Result<c_int, Status> {
        match self.devices()? {
            0 => Err(Status::NO_DEVICE),
            n => Ok(n),
        }
    }

    fn take_injected(&self, op: SimOp) -> Result<(), Status> {
        match self.injected.lock().remove(&op) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn record(&self, f: impl FnOnce(&mut SimStats)) {
        f(&mut self.stats.lock());
    }

    fn stream_id(&self, stream: Stream) -> Result<usize, Status> {
        let id = stream.as_raw() as usize;
        if id == 0 || self.streams.lock().contains(&id) {
            Ok(id)
        } else {
            Err(Status::INVALID_RESOURCE_HANDLE)
        }
    }

    /// Run every copy queued on `id`, in issue order.
    fn drain(&self, id: usize) {
        let copies = self.pending.lock().remove(&id).unwrap_or_default();
        let mut bytes = 0;
        for c in copies {
            // Safety: `memcpy_async` callers guarantee both ranges stay valid
            // until the stream drains.
            unsafe {
                std::ptr::copy(c.src as *const u8, c.dst as *mut u8, c.nbytes);
            }
            bytes += c.nbytes;
        }
        self.record(|s| s.bytes_copied += bytes);
    }
}

impl GpuRuntime for SimRuntime {
    fn name(&self) -> &str {
        "sim"
    }

    fn get_device_count(&self) -> Result<c_int, Status> {
        self.record(|s| s.device_count_calls += 1);
        self.take_injected(SimOp::GetDeviceCount)?;
        self.devices()
    }

    fn get_device(&self) -> Result<c_int, Status> {
        self.record(|s| s.get_device_calls += 1);
        self.take_injected(SimOp::GetDevice)?;
        self.usable()?;
        Ok(CURRENT_DEVICE.with(|m| m.borrow().get(&self.id).copied().unwrap_or(0)))
    }

    fn set_device(&self, device: c_int) -> Result<(), Status> {
        self.record(|s| s.set_device_calls += 1);
        self.take_injected(SimOp::SetDevice)?;
        let devices = self.usable()?;
        if device < 0 || device >= devices {
            return Err(Status::INVALID_DEVICE);
        }
        CURRENT_DEVICE.with(|m| m.borrow_mut().insert(self.id, device));
        Ok(())
    }

    fn device_synchronize(&self) -> Result<(), Status> {
        self.record(|s| s.device_sync_calls += 1);
        self.take_injected(SimOp::DeviceSynchronize)?;
        self.usable()?;
        let ids: Vec<usize> = self.pending.lock().keys().copied().collect();
        for id in ids {
            self.drain(id);
        }
        Ok(())
    }

    fn stream_synchronize(&self, stream: Stream) -> Result<(), Status> {
        self.record(|s| s.stream_sync_calls += 1);
        self.take_injected(SimOp::StreamSynchronize)?;
        self.usable()?;
        let id = self.stream_id(stream)?;
        self.drain(id);
        Ok(())
    }

    unsafe fn memcpy_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        nbytes: usize,
        _kind: MemcpyKind,
        stream: Stream,
    ) -> Result<(), Status> {
        self.record(|s| s.memcpy_async_calls += 1);
        self.take_injected(SimOp::MemcpyAsync)?;
        self.usable()?;
        let id = self.stream_id(stream)?;
        if nbytes == 0 {
            return Ok(());
        }
        if dst.is_null() || src.is_null() {
            return Err(Status::INVALID_VALUE);
        }
        self.pending.lock().entry(id).or_default().push(PendingCopy {
            dst: dst as usize,
            src: src as usize,
            nbytes,
        });
        Ok(())
    }

    fn supports_memcpy_with_stream(&self) -> bool {
        self.combined_copy
    }

    unsafe fn memcpy_with_stream(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        nbytes: usize,
        _kind: MemcpyKind,
        stream: Stream,
    ) -> Result<(), Status> {
        self.record(|s| s.memcpy_with_stream_calls += 1);
        if !self.combined_copy {
            return Err(Status::NOT_SUPPORTED);
        }
        self.take_injected(SimOp::MemcpyWithStream)?;
        self.usable()?;
        let id = self.stream_id(stream)?;
        if nbytes != 0 {
            if dst.is_null() || src.is_null() {
                return Err(Status::INVALID_VALUE);
            }
            self.pending.lock().entry(id).or_default().push(PendingCopy {
                dst: dst as usize,
                src: src as usize,
                nbytes,
            });
        }
        self.drain(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_lands_on_stream_sync() {
        let rt = SimRuntime::with_devices(1);
        let stream = rt.create_stream();
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        unsafe {
            rt.memcpy_async(
                dst.as_mut_ptr() as *mut c_void,
                src.as_ptr() as *const c_void,
                4,
                MemcpyKind::HostToDevice,
                stream,
            )
            .unwrap();
        }
        assert_eq!(rt.pending_copies(stream), 1);
        rt.stream_synchronize(stream).unwrap();
        assert_eq!(rt.pending_copies(stream), 0);
        assert_eq!(dst, src);
        assert_eq!(rt.stats().bytes_copied, 4);
    }

    #[test]
    fn test_device_sync_drains_all_streams() {
        let rt = SimRuntime::with_devices(1);
        let a = rt.create_stream();
        let src = [7u8; 8];
        let mut d1 = [0u8; 8];
        let mut d2 = [0u8; 8];
        unsafe {
            rt.memcpy_async(d1.as_mut_ptr().cast(), src.as_ptr().cast(), 8, MemcpyKind::Default, a)
                .unwrap();
            rt.memcpy_async(d2.as_mut_ptr().cast(), src.as_ptr().cast(), 8, MemcpyKind::Default, Stream::DEFAULT)
                .unwrap();
        }
        rt.device_synchronize().unwrap();
        assert_eq!(d1, src);
        assert_eq!(d2, src);
    }

    #[test]
    fn test_unknown_stream_rejected() {
        let rt = SimRuntime::with_devices(1);
        let s = rt.create_stream();
        rt.destroy_stream(s);
        assert_eq!(rt.stream_synchronize(s), Err(Status::INVALID_RESOURCE_HANDLE));
    }

    #[test]
    fn test_driver_states() {
        assert_eq!(SimRuntime::no_device().get_device_count(), Err(Status::NO_DEVICE));
        assert_eq!(SimRuntime::no_driver().get_device_count(), Err(Status::INSUFFICIENT_DRIVER));
        assert_eq!(
            SimRuntime::broken(Status::INITIALIZATION_ERROR).get_device_count(),
            Err(Status::INITIALIZATION_ERROR)
        );
        assert_eq!(SimRuntime::with_devices(3).get_device_count(), Ok(3));
        assert_eq!(SimRuntime::with_devices(0).get_device(), Err(Status::NO_DEVICE));
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let rt = SimRuntime::with_devices(2);
        rt.fail_next(SimOp::SetDevice, Status::INITIALIZATION_ERROR);
        assert_eq!(rt.set_device(1), Err(Status::INITIALIZATION_ERROR));
        assert_eq!(rt.set_device(1), Ok(()));
        assert_eq!(rt.stats().set_device_calls, 2);
    }

    #[test]
    fn test_device_is_per_thread() {
        let rt = std::sync::Arc::new(SimRuntime::with_devices(4));
        rt.set_device(3).unwrap();
        let other = std::sync::Arc::clone(&rt);
        let seen = std::thread::spawn(move || other.get_device().unwrap()).join().unwrap();
        assert_eq!(seen, 0);
        assert_eq!(rt.get_device(), Ok(3));
    }

    #[test]
    fn test_device_is_per_runtime() {
        let a = SimRuntime::with_devices(4);
        let b = SimRuntime::with_devices(4);
        a.set_device(2).unwrap();
        assert_eq!(a.get_device(), Ok(2));
        assert_eq!(b.get_device(), Ok(0));
        b.set_device(1).unwrap();
        assert_eq!(a.get_device(), Ok(2));
    }

    #[test]
    fn test_combined_copy_requires_opt_in() {
        let rt = SimRuntime::with_devices(1);
        let src = [1u8];
        let mut dst = [0u8];
        let res = unsafe {
            rt.memcpy_with_stream(dst.as_mut_ptr().cast(), src.as_ptr().cast(), 1, MemcpyKind::Default, Stream::DEFAULT)
        };
        assert_eq!(res, Err(Status::NOT_SUPPORTED));

        let rt = SimRuntime::with_devices(1).with_memcpy_with_stream(true);
        unsafe {
            rt.memcpy_with_stream(dst.as_mut_ptr().cast(), src.as_ptr().cast(), 1, MemcpyKind::Default, Stream::DEFAULT)
                .unwrap();
        }
        assert_eq!(dst, src);
    }
}
