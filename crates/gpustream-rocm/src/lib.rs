//! ROCm backend for gpustream.
//!
//! Implements [`Driver`] over HIP (`libamdhip64`), with BLAS handles from
//! rocBLAS and dense solver handles for rocSOLVER, which shares rocBLAS's
//! handle type. Libraries are opened at runtime through `libloading`.

pub mod driver;
mod ffi;
pub mod flags;
pub mod status;

pub use driver::RocmDriver;

use gpustream_core::config::RuntimeConfig;
use gpustream_core::driver::Driver;
use gpustream_core::{Platform, Result};
use std::sync::Arc;

/// Loader for [`Runtime`](gpustream_core::Runtime) registration.
pub fn load(config: &RuntimeConfig) -> Result<Arc<dyn Driver>> {
    let driver = RocmDriver::load(config.libraries(Platform::Rocm))
        .map_err(|err| gpustream_core::Error::from(err).on(Platform::Rocm))?;
    Ok(Arc::new(driver))
}
