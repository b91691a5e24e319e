//! Free functions over the process-wide context.

use std::sync::{Arc, OnceLock};

use kore_device::runtime::SimRuntime;
use kore_device::{
    Backend, DeviceError, GpuContext, GpuRuntime, MemcpyKind, RuntimeConfig, Stream,
    SyncWarningLevel,
};
use serial_test::serial;

static SIM: OnceLock<Arc<SimRuntime>> = OnceLock::new();

/// Installs a simulated two-device runtime as the global context exactly once.
fn global_sim() -> &'static Arc<SimRuntime> {
    SIM.get_or_init(|| {
        let rt = Arc::new(SimRuntime::with_devices(2));
        kore_device::init_with(GpuContext::new(Arc::clone(&rt) as Arc<dyn GpuRuntime>))
            .expect("global context already installed");
        rt
    })
}

#[test]
fn test_second_init_rejected() {
    global_sim();
    let err = kore_device::init(&RuntimeConfig::new(Backend::Disabled)).unwrap_err();
    assert!(matches!(err, DeviceError::AlreadyInitialized));
    assert_eq!(kore_device::context().runtime().name(), "sim");
}

#[test]
fn test_free_device_functions() {
    global_sim();
    assert_eq!(kore_device::device_count(), 2);
    assert!(kore_device::is_available());
    assert_eq!(kore_device::device_count_ensure_non_zero().unwrap(), 2);

    kore_device::set_device(1).unwrap();
    assert_eq!(kore_device::current_device().unwrap(), 1);
    {
        let _guard = kore_device::device_guard(0).unwrap();
        assert_eq!(kore_device::current_device().unwrap(), 0);
    }
    assert_eq!(kore_device::current_device().unwrap(), 1);
    assert!(kore_device::set_device(2).is_err());
    assert_eq!(kore_device::current_device().unwrap(), 1);
    kore_device::device_synchronize().unwrap();
}

#[test]
#[serial(sync_level)]
fn test_free_sync_functions() {
    let rt = global_sim();
    let stream = rt.create_stream();
    let src = [4u8; 16];
    let mut dst = [0u8; 16];

    kore_device::set_sync_warning_level(SyncWarningLevel::Error);
    let forbidden = kore_device::stream_synchronize(stream).unwrap_err();
    kore_device::set_sync_warning_level(SyncWarningLevel::Disabled);
    match forbidden {
        DeviceError::SyncForbidden { location, .. } => {
            assert!(location.contains("global_context.rs"), "location: {location}")
        }
        other => panic!("unexpected error: {other}"),
    }

    unsafe {
        kore_device::memcpy_and_sync(dst.as_mut_ptr().cast(), src.as_ptr().cast(), 16, MemcpyKind::HostToDevice, stream)
            .unwrap();
    }
    assert_eq!(dst, src);
    kore_device::stream_synchronize(Stream::DEFAULT).unwrap();
}
