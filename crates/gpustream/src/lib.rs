//! # gpustream
//!
//! A thin platform layer over two GPU vendor stacks, CUDA and ROCm. Every
//! entry point takes a [`Platform`] tag and is routed to that vendor's
//! driver; the returned devices, contexts and handles behave the same on
//! either platform.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gpustream::prelude::*;
//!
//! fn main() -> gpustream::Result<()> {
//!     let platform = Platform::Cuda;
//!     gpustream::init(platform)?;
//!     if gpustream::device_get_count(platform)? == 0 {
//!         return Ok(());
//!     }
//!     let device = gpustream::device_get(platform, 0)?;
//!     let _context = ctx_create(CtxFlags::SCHED_AUTO, &device)?;
//!     let current = ctx_get_current()?;
//!     let solver = solver_dn_create(&current)?;
//!     println!("cusolverDnHandle_t = {:p}", solver.as_raw().as_ptr());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `cuda` (default): CUDA backend, `libcuda` + cuSOLVER + cuBLAS
//! - `rocm` (default): ROCm backend, HIP + rocSOLVER + rocBLAS
//! - `serde`: (de)serialization of [`RuntimeConfig`]
//! - `test-utils`: the simulated driver, for testing code built on this crate
//!
//! Vendor libraries are opened at runtime. A platform whose libraries are
//! missing reports `BackendUnavailable`; the other platform keeps working.

pub use gpustream_core::{config, context, device, driver, error, handle, platform, runtime};

pub use gpustream_core::{
    blas_create, ctx_clear_current, ctx_create, ctx_get_current, ctx_scope, ctx_set_current,
    handle_create, is_success, solver_dn_create, BackendStatus, CapabilityKind, Context,
    ContextState, CtxFlags, CurrentContext, Device, Error, ErrorKind, OwningBlasHandle,
    OwningContext, OwningHandle, OwningSolverDnHandle, Platform, Result, Runtime, SchedPolicy,
    ScopedCurrent,
};
pub use gpustream_core::config::{runtime_config, RuntimeConfig, RuntimeConfigBuilder};

#[cfg(feature = "cuda")]
pub use gpustream_cuda as cuda;
#[cfg(feature = "rocm")]
pub use gpustream_rocm as rocm;

use once_cell::sync::Lazy;
use tracing::debug;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use gpustream_core::prelude::*;
}

static RUNTIME: Lazy<Runtime> = Lazy::new(|| system_runtime(runtime_config().clone()));

/// Builds a runtime with the vendor drivers compiled into this crate.
pub fn system_runtime(config: RuntimeConfig) -> Runtime {
    let builder = Runtime::builder().config(config);
    #[cfg(feature = "cuda")]
    let builder = builder.loader(Platform::Cuda, gpustream_cuda::load);
    #[cfg(feature = "rocm")]
    let builder = builder.loader(Platform::Rocm, gpustream_rocm::load);
    debug!("built system runtime");
    builder.build()
}

/// The process-wide runtime, configured from the environment on first use.
pub fn runtime() -> &'static Runtime {
    &RUNTIME
}

/// Initializes `platform`. Repeated calls are harmless.
///
/// Fails with `BackendUnavailable` when the vendor driver cannot be loaded
/// or reports a missing or insufficient installation.
pub fn init(platform: Platform) -> Result<()> {
    runtime().init(platform)
}

/// Number of devices on `platform`. Zero is a valid answer.
pub fn device_get_count(platform: Platform) -> Result<i32> {
    runtime().device_get_count(platform)
}

/// Device `index` of `platform`; `NoDevice` if `index` is out of range.
pub fn device_get(platform: Platform, index: i32) -> Result<Device> {
    runtime().device_get(platform, index)
}

/// Every device of `platform`.
pub fn devices(platform: Platform) -> Result<Vec<Device>> {
    runtime().devices(platform)
}

/// Platforms whose driver loads and initializes on this machine.
pub fn available_platforms() -> Vec<Platform> {
    runtime().available_platforms()
}

/// Creates a context with the configured default flags.
pub fn ctx_create_default(device: &Device) -> Result<OwningContext> {
    ctx_create(runtime().config().default_flags, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_runtime_respects_config() {
        let runtime = system_runtime(RuntimeConfigBuilder::new().platforms(Vec::<Platform>::new()).build());
        for platform in Platform::ALL {
            let err = runtime.init(platform).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        }
        assert!(runtime.available_platforms().is_empty());
    }

    #[test]
    fn test_global_runtime_never_panics() {
        for platform in Platform::ALL {
            match init(platform) {
                Ok(()) => assert!(device_get_count(platform).unwrap() >= 0),
                Err(err) => assert_eq!(err.platform(), Some(platform)),
            }
        }
    }
}
