//! Platform initialization and device lookup.

use gpustream::prelude::*;
use gpustream_core::driver::simulated::SimulatedDriver;
use proptest::prelude::*;
use std::sync::Arc;

fn runtime_with(platform: Platform, devices: i32) -> (Runtime, Arc<SimulatedDriver>) {
    let sim = Arc::new(SimulatedDriver::builder(platform).devices(devices).build());
    let runtime = Runtime::builder().driver(sim.clone()).build();
    (runtime, sim)
}

#[test]
fn test_init_twice_is_harmless() {
    for platform in Platform::ALL {
        let (runtime, sim) = runtime_with(platform, 1);
        runtime.init(platform).unwrap();
        runtime.init(platform).unwrap();
        assert_eq!(sim.init_calls(), 2);
        assert_eq!(runtime.device_get_count(platform).unwrap(), 1);
    }
}

#[test]
fn test_queries_before_init_fail() {
    let (runtime, _sim) = runtime_with(Platform::Cuda, 1);
    let err = runtime.device_get_count(Platform::Cuda).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert_eq!(err.status().map(|s| s.name), Some("NOT_INITIALIZED"));
}

#[test]
fn test_zero_devices_is_not_an_error() {
    let (runtime, _sim) = runtime_with(Platform::Rocm, 0);
    runtime.init(Platform::Rocm).unwrap();
    assert_eq!(runtime.device_get_count(Platform::Rocm).unwrap(), 0);
    assert!(runtime.devices(Platform::Rocm).unwrap().is_empty());

    let err = runtime.device_get(Platform::Rocm, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDevice);
}

#[test]
fn test_host_without_gpu_reports_zero_devices() {
    for platform in Platform::ALL {
        let sim = Arc::new(
            SimulatedDriver::builder(platform)
                .devices(0)
                .no_device_status()
                .build(),
        );
        let runtime = Runtime::builder().driver(sim).build();
        runtime.init(platform).unwrap();

        assert_eq!(runtime.device_get_count(platform).unwrap(), 0);
        assert!(runtime.devices(platform).unwrap().is_empty());
        assert_eq!(runtime.device_get(platform, 0).unwrap_err().kind(), ErrorKind::NoDevice);
    }
}

#[test]
fn test_out_of_range_ordinals() {
    let (runtime, _sim) = runtime_with(Platform::Cuda, 2);
    runtime.init(Platform::Cuda).unwrap();

    for index in [-1, 2, i32::MIN, i32::MAX] {
        let err = runtime.device_get(Platform::Cuda, index).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDevice, "index {index}");
        assert_eq!(err.platform(), Some(Platform::Cuda));
        // Rejected before reaching the driver
        assert!(err.status().is_none());
    }
}

#[test]
fn test_device_properties() {
    let sim = Arc::new(
        SimulatedDriver::builder(Platform::Cuda)
            .devices(2)
            .device_memory(8 << 30)
            .build(),
    );
    let runtime = Runtime::builder().driver(sim).build();
    runtime.init(Platform::Cuda).unwrap();

    let device = runtime.device_get(Platform::Cuda, 1).unwrap();
    assert_eq!(device.ordinal(), 1);
    assert_eq!(device.platform(), Platform::Cuda);
    assert_eq!(device.total_memory().unwrap(), 8 << 30);
    assert!(device.name().unwrap().contains("CUDA"));
    assert_eq!(device, runtime.device_get(Platform::Cuda, 1).unwrap());
}

#[test]
fn test_unregistered_platform() {
    let (runtime, _sim) = runtime_with(Platform::Cuda, 1);
    let err = runtime.device_get_count(Platform::Rocm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(!runtime.is_available(Platform::Rocm));
}

proptest! {
    #[test]
    fn test_device_get_succeeds_exactly_in_range(
        devices in 0i32..8,
        index in -16i32..16,
        platform in prop::sample::select(Platform::ALL.to_vec()),
    ) {
        let (runtime, _sim) = runtime_with(platform, devices);
        runtime.init(platform).unwrap();

        match runtime.device_get(platform, index) {
            Ok(device) => {
                prop_assert!((0..devices).contains(&index));
                prop_assert_eq!(device.ordinal(), index);
            }
            Err(err) => {
                prop_assert!(!(0..devices).contains(&index));
                prop_assert_eq!(err.kind(), ErrorKind::NoDevice);
            }
        }
    }
}
