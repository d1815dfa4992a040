//! Solver handle creation through the full setup chain, on both platforms.

use gpustream::prelude::*;
use gpustream_core::driver::simulated::{SimulatedDriver, SimulatedDriverBuilder};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Runtime with a simulated driver behind every platform.
fn simulated_runtime(
    configure: impl Fn(SimulatedDriverBuilder) -> SimulatedDriverBuilder,
) -> (Runtime, Vec<Arc<SimulatedDriver>>) {
    let drivers: Vec<Arc<SimulatedDriver>> = Platform::ALL
        .iter()
        .map(|p| Arc::new(configure(SimulatedDriver::builder(*p)).build()))
        .collect();
    let runtime = drivers
        .iter()
        .fold(Runtime::builder(), |builder, driver| builder.driver(driver.clone()))
        .build();
    (runtime, drivers)
}

#[test]
fn test_solver_dn_handle_on_every_platform() {
    let (runtime, drivers) = simulated_runtime(|b| b.devices(2));

    for (platform, sim) in Platform::ALL.iter().copied().zip(&drivers) {
        assert!(gpustream::is_success(&runtime.init(platform)));
        let count = runtime.device_get_count(platform).unwrap();
        assert!(count > 0);

        let device = runtime.device_get(platform, 0).unwrap();
        let context = ctx_create(CtxFlags::SCHED_AUTO, &device).unwrap();
        let current = ctx_get_current().unwrap();
        assert_eq!(current.context(), context.context());
        assert_eq!(current.platform(), platform);

        let solver = solver_dn_create(&current).unwrap();
        assert!(!solver.as_raw().as_ptr().is_null());
        assert_eq!(solver.platform(), platform);
        assert_eq!(sim.live_handles(), 1);

        drop(solver);
        drop(context);
        assert_eq!(sim.live_handles(), 0);
        assert_eq!(sim.live_contexts(), 0);
    }
}

#[test]
fn test_blas_and_solver_share_a_context() {
    let (runtime, drivers) = simulated_runtime(|b| b);
    runtime.init(Platform::Rocm).unwrap();
    let device = runtime.device_get(Platform::Rocm, 0).unwrap();

    let mut context = ctx_create(CtxFlags::SCHED_BLOCKING_SYNC, &device).unwrap();
    let current = ctx_get_current().unwrap();
    let solver = solver_dn_create(&current).unwrap();
    let blas = blas_create(&current).unwrap();
    assert_ne!(solver.as_raw(), blas.as_raw());
    assert_eq!(context.live_handles(), 2);

    solver.destroy().unwrap();
    blas.destroy().unwrap();
    context.destroy().unwrap();
    assert_eq!(drivers[Platform::Rocm.index()].live_contexts(), 0);
}

#[test]
fn test_handle_requires_current_context() {
    let (runtime, _drivers) = simulated_runtime(|b| b);
    runtime.init(Platform::Cuda).unwrap();
    let device = runtime.device_get(Platform::Cuda, 0).unwrap();

    let _context = ctx_create(CtxFlags::SCHED_AUTO, &device).unwrap();
    let current = ctx_get_current().unwrap();
    ctx_clear_current().unwrap();

    let err = solver_dn_create(&current).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoCurrentContext);
    assert!(ctx_get_current().unwrap_err().is(ErrorKind::NoCurrentContext));
}

#[test]
fn test_failed_chain_leaks_nothing() {
    let (runtime, drivers) = simulated_runtime(|b| b.contexts_per_device(1).handles_per_context(0));
    let sim = &drivers[Platform::Cuda.index()];
    runtime.init(Platform::Cuda).unwrap();
    let device = runtime.device_get(Platform::Cuda, 0).unwrap();

    let mut context = ctx_create(CtxFlags::SCHED_AUTO, &device).unwrap();
    let err = ctx_create(CtxFlags::SCHED_AUTO, &device).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(err.status().map(|s| s.name), Some("CONTEXT_ALREADY_IN_USE"));
    assert_eq!(sim.live_contexts(), 1);
    assert!(context.is_current());

    let err = solver_dn_create(&ctx_get_current().unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(context.live_handles(), 0);
    assert_eq!(sim.live_handles(), 0);

    context.destroy().unwrap();
    assert_eq!(sim.live_contexts(), 0);
    assert_eq!(sim.current_raw(), None);
}

#[test]
fn test_unavailable_platform_does_not_affect_the_other() {
    let cuda = Arc::new(SimulatedDriver::builder(Platform::Cuda).build());
    let rocm = Arc::new(SimulatedDriver::builder(Platform::Rocm).unavailable().build());
    let runtime = Runtime::builder().driver(cuda).driver(rocm).build();

    let err = runtime.init(Platform::Rocm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert_eq!(err.platform(), Some(Platform::Rocm));
    assert_eq!(runtime.available_platforms(), vec![Platform::Cuda]);

    let device = runtime.device_get(Platform::Cuda, 0).unwrap();
    let _context = ctx_create(CtxFlags::SCHED_AUTO, &device).unwrap();
    assert!(solver_dn_create(&ctx_get_current().unwrap()).is_ok());
}

/// Same chain against the machine's real drivers. Platforms without a
/// driver or device are skipped.
#[test]
fn test_solver_dn_handle_on_hardware() {
    for platform in Platform::ALL {
        if gpustream::init(platform).is_err() {
            eprintln!("{platform} not available, skipping");
            continue;
        }
        let count = gpustream::device_get_count(platform).unwrap();
        if count == 0 {
            eprintln!("{platform} has no devices, skipping");
            continue;
        }

        let device = gpustream::device_get(platform, 0).unwrap();
        let _context = gpustream::ctx_create_default(&device).unwrap();
        let current = ctx_get_current().unwrap();
        match solver_dn_create(&current) {
            Ok(handle) => assert!(!handle.as_raw().as_ptr().is_null()),
            // Driver present but solver library not installed
            Err(err) => assert_eq!(err.kind(), ErrorKind::BackendUnavailable),
        }
    }
}
