//! CUDA backend for gpustream.
//!
//! Implements [`Driver`] over the CUDA driver API (`libcuda`), with dense
//! solver handles from cuSOLVER and BLAS handles from cuBLAS. Every library
//! is opened at runtime through `libloading`, so this crate builds without a
//! CUDA toolkit and reports `BackendUnavailable` on machines without one.
//!
//! # Modules
//!
//! - [`driver`]: The [`CudaDriver`] implementation
//! - [`flags`]: `CUctx_flags` encoding
//! - [`status`]: Status code names and classification

pub mod driver;
mod ffi;
pub mod flags;
pub mod status;

pub use driver::CudaDriver;

use gpustream_core::config::RuntimeConfig;
use gpustream_core::driver::Driver;
use gpustream_core::{Platform, Result};
use std::sync::Arc;

/// Loader for [`Runtime`](gpustream_core::Runtime) registration.
pub fn load(config: &RuntimeConfig) -> Result<Arc<dyn Driver>> {
    let driver = CudaDriver::load(config.libraries(Platform::Cuda))
        .map_err(|err| gpustream_core::Error::from(err).on(Platform::Cuda))?;
    Ok(Arc::new(driver))
}
