//! Device enumeration and selection.
//!
//! `device_count` never fails: any driver problem is reported once through
//! `tracing` and turned into a count of zero. Everything else propagates
//! runtime failures as [`DeviceError::Runtime`].

use std::ffi::c_int;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::{context, DeviceProbe, GpuContext};
use crate::error::DeviceError;
use crate::runtime::{check, GpuRuntime, Status};
use crate::Result;

/// GPU device ordinal. Valid values are `0..device_count()`.
pub type DeviceIndex = i16;

/// Set once the first driver-problem diagnostic has been logged in this process.
static DRIVER_DIAGNOSTIC_EMITTED: AtomicBool = AtomicBool::new(false);

#[cfg(test)]
pub(crate) fn driver_diagnostic_emitted() -> bool {
    DRIVER_DIAGNOSTIC_EMITTED.load(Ordering::Relaxed)
}

fn report_driver_problem(runtime: &dyn GpuRuntime, problem: &str) {
    if !DRIVER_DIAGNOSTIC_EMITTED.swap(true, Ordering::Relaxed) {
        tracing::warn!(runtime = runtime.name(), "{}; reporting 0 GPU devices", problem);
    }
}

fn probe_devices(runtime: &dyn GpuRuntime) -> DeviceProbe {
    let raw = panic::catch_unwind(AssertUnwindSafe(|| runtime.get_device_count()));
    let problem = match raw {
        Ok(Ok(n)) if n < 0 => format!("GPU runtime reported a negative device count ({n})"),
        Ok(Ok(n)) => match DeviceIndex::try_from(n) {
            Ok(count) => return DeviceProbe { count, problem: None },
            Err(_) => format!(
                "GPU runtime reported {n} devices, more than the supported maximum of {}",
                DeviceIndex::MAX
            ),
        },
        // No device is a normal machine state, not a driver problem.
        Ok(Err(Status::NO_DEVICE)) => return DeviceProbe { count: 0, problem: None },
        Ok(Err(Status::INSUFFICIENT_DRIVER)) => format!(
            "no usable GPU driver was found for the {} runtime (missing, or too old)",
            runtime.name()
        ),
        Ok(Err(status)) => format!("GPU runtime initialization: {}", runtime.error_string(status)),
        Err(_) => String::from("GPU runtime initialization: device count query panicked"),
    };
    report_driver_problem(runtime, &problem);
    DeviceProbe { count: 0, problem: Some(problem) }
}

impl GpuContext {
    fn probe(&self) -> &DeviceProbe {
        self.probe.get_or_init(|| probe_devices(&*self.runtime))
    }

    /// Number of visible devices; 0 on any driver problem. Probed once per context.
    pub fn device_count(&self) -> DeviceIndex {
        self.probe().count
    }

    /// Like [`GpuContext::device_count`], but zero devices is an error.
    pub fn device_count_ensure_non_zero(&self) -> Result<DeviceIndex> {
        let probe = self.probe();
        if probe.count == 0 {
            return Err(DeviceError::NoDevice { detail: probe.problem.clone() });
        }
        Ok(probe.count)
    }

    pub fn is_available(&self) -> bool {
        self.device_count() > 0
    }

    /// The calling thread's active device.
    ///
    /// Fails with [`DeviceError::Runtime`] when the runtime call fails, and with
    /// [`DeviceError::IndexOutOfRange`] when the runtime reports an ordinal that
    /// does not fit a [`DeviceIndex`].
    pub fn current_device(&self) -> Result<DeviceIndex> {
        let raw = check(self.runtime(), self.runtime.get_device(), "get_device")?;
        DeviceIndex::try_from(raw).map_err(|_| DeviceError::IndexOutOfRange(raw))
    }

    /// Select the calling thread's active device.
    ///
    /// The runtime validates `device`; on rejection the previous device stays active.
    pub fn set_device(&self, device: DeviceIndex) -> Result<()> {
        check(self.runtime(), self.runtime.set_device(c_int::from(device)), "set_device")
    }

    /// Block until all work on the current device is done.
    ///
    /// An explicit sync the caller asked for, so the sync policy gate is not consulted.
    pub fn device_synchronize(&self) -> Result<()> {
        check(self.runtime(), self.runtime.device_synchronize(), "device_synchronize")
    }

    /// Switch to `device` until the returned guard is dropped.
    pub fn device_guard(&self, device: DeviceIndex) -> Result<DeviceGuard<'_>> {
        DeviceGuard::new(self, device)
    }
}

/// Restores the thread's previous device on drop.
///
/// Device selection is per thread, so the guard must be dropped on the thread
/// that created it and is therefore not `Send`:
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<kore_device::DeviceGuard<'static>>();
/// ```
#[must_use = "the previous device is restored when the guard is dropped"]
pub struct DeviceGuard<'a> {
    ctx: &'a GpuContext,
    original: DeviceIndex,
    current: DeviceIndex,
    _not_send: PhantomData<*const ()>,
}

impl<'a> DeviceGuard<'a> {
    fn new(ctx: &'a GpuContext, device: DeviceIndex) -> Result<Self> {
        let original = ctx.current_device()?;
        if device != original {
            ctx.set_device(device)?;
        }
        Ok(Self { ctx, original, current: device, _not_send: PhantomData })
    }

    pub fn original_device(&self) -> DeviceIndex {
        self.original
    }

    pub fn current_device(&self) -> DeviceIndex {
        self.current
    }
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        if self.current != self.original {
            if let Err(e) = self.ctx.set_device(self.original) {
                tracing::warn!("failed to restore device {}: {}", self.original, e);
            }
        }
    }
}

/// Number of visible devices in the process-wide context; never fails.
pub fn device_count() -> DeviceIndex {
    context().device_count()
}

pub fn device_count_ensure_non_zero() -> Result<DeviceIndex> {
    context().device_count_ensure_non_zero()
}

pub fn is_available() -> bool {
    context().is_available()
}

pub fn current_device() -> Result<DeviceIndex> {
    context().current_device()
}

pub fn set_device(device: DeviceIndex) -> Result<()> {
    context().set_device(device)
}

pub fn device_synchronize() -> Result<()> {
    context().device_synchronize()
}

pub fn device_guard(device: DeviceIndex) -> Result<DeviceGuard<'static>> {
    context().device_guard(device)
}
