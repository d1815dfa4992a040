//! [`Driver`] implementation over the CUDA driver API.

use crate::ffi::DriverApi;
use crate::flags;
use crate::status::{self, check};
use gpustream_core::config::LibrarySet;
use gpustream_core::driver::library::{HandleLibrary, LibraryError};
use gpustream_core::driver::{Driver, DriverResult, RawContext, RawDevice, RawHandle};
use gpustream_core::{BackendStatus, CapabilityKind, CtxFlags, Platform};
use once_cell::sync::OnceCell;
use std::ffi::{c_char, CStr};
use tracing::{debug, warn};

const NAME_LEN: usize = 256;

/// The CUDA backend.
///
/// `libcuda` is opened when the driver is loaded. `libcusolver` and
/// `libcublas` are opened the first time a handle of that kind is requested,
/// so a machine without the math libraries can still enumerate devices and
/// create contexts.
#[derive(Debug)]
pub struct CudaDriver {
    api: DriverApi,
    libraries: LibrarySet,
    solver: OnceCell<Option<HandleLibrary>>,
    blas: OnceCell<Option<HandleLibrary>>,
}

impl CudaDriver {
    /// Opens `libcuda` from the configured candidates.
    pub fn load(libraries: &LibrarySet) -> Result<Self, LibraryError> {
        let api = DriverApi::load(&libraries.driver)?;
        debug!(path = api.path(), "loaded CUDA driver API");
        Ok(Self {
            api,
            libraries: libraries.clone(),
            solver: OnceCell::new(),
            blas: OnceCell::new(),
        })
    }

    fn handle_library(&self, kind: CapabilityKind) -> Option<&HandleLibrary> {
        let (cell, what, candidates, create, destroy) = match kind {
            CapabilityKind::SolverDn => (
                &self.solver,
                "cuSOLVER",
                &self.libraries.solver,
                "cusolverDnCreate",
                "cusolverDnDestroy",
            ),
            CapabilityKind::Blas => (
                &self.blas,
                "cuBLAS",
                &self.libraries.blas,
                "cublasCreate_v2",
                "cublasDestroy_v2",
            ),
        };
        cell.get_or_init(|| match HandleLibrary::open(what, candidates, create, destroy) {
            Ok(library) => {
                debug!(path = library.path(), "loaded {what}");
                Some(library)
            }
            Err(err) => {
                warn!(error = %err, "{what} unavailable");
                None
            }
        })
        .as_ref()
    }

    fn handle_status(kind: CapabilityKind, code: i32) -> BackendStatus {
        match kind {
            CapabilityKind::SolverDn => status::cusolver_status(code),
            CapabilityKind::Blas => status::cublas_status(code),
        }
    }
}

impl Driver for CudaDriver {
    fn platform(&self) -> Platform {
        Platform::Cuda
    }

    fn init(&self) -> DriverResult<()> {
        // SAFETY: cuInit takes no pointers and is safe to call repeatedly.
        check(unsafe { (self.api.cu_init)(0) })
    }

    fn device_count(&self) -> DriverResult<i32> {
        let mut count = 0;
        // SAFETY: `count` is a valid out-pointer for the duration of the call.
        check(unsafe { (self.api.cu_device_get_count)(&mut count) })?;
        Ok(count)
    }

    fn device_get(&self, ordinal: i32) -> DriverResult<RawDevice> {
        let mut device = 0;
        // SAFETY: `device` is a valid out-pointer; the ordinal was range checked.
        check(unsafe { (self.api.cu_device_get)(&mut device, ordinal) })?;
        Ok(RawDevice(device))
    }

    fn device_name(&self, device: RawDevice) -> DriverResult<String> {
        let mut buffer = [0 as c_char; NAME_LEN];
        // SAFETY: `buffer` is writable for `NAME_LEN` bytes.
        check(unsafe {
            (self.api.cu_device_get_name)(buffer.as_mut_ptr(), NAME_LEN as i32, device.0)
        })?;
        // SAFETY: the driver writes a NUL terminated string into `buffer`.
        let name = unsafe { CStr::from_ptr(buffer.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    fn device_total_mem(&self, device: RawDevice) -> DriverResult<usize> {
        let mut bytes = 0usize;
        // SAFETY: `bytes` is a valid out-pointer for the duration of the call.
        check(unsafe { (self.api.cu_device_total_mem)(&mut bytes, device.0) })?;
        Ok(bytes)
    }

    fn ctx_create(&self, flags: CtxFlags, device: RawDevice) -> DriverResult<RawContext> {
        let mut ctx = std::ptr::null_mut();
        // SAFETY: `ctx` is a valid out-pointer; `device` came from cuDeviceGet.
        check(unsafe { (self.api.cu_ctx_create)(&mut ctx, flags::encode(flags), device.0) })?;
        let ctx = RawContext::new(ctx).ok_or_else(|| status::cu_result(999))?;

        // cuCtxCreate pushes the new context onto the thread's stack. Pop it
        // so the binding stays with ctx_set_current.
        let mut popped = std::ptr::null_mut();
        // SAFETY: `popped` is a valid out-pointer.
        if let Err(status) = check(unsafe { (self.api.cu_ctx_pop_current)(&mut popped) }) {
            // SAFETY: `ctx` was created above and is not shared yet.
            let _ = unsafe { (self.api.cu_ctx_destroy)(ctx.as_ptr()) };
            return Err(status);
        }
        Ok(ctx)
    }

    fn ctx_destroy(&self, ctx: RawContext) -> DriverResult<()> {
        // SAFETY: `ctx` is a live context owned by the caller.
        check(unsafe { (self.api.cu_ctx_destroy)(ctx.as_ptr()) })
    }

    fn ctx_set_current(&self, ctx: Option<RawContext>) -> DriverResult<()> {
        let ptr = ctx.map_or(std::ptr::null_mut(), RawContext::as_ptr);
        // SAFETY: `ptr` is null or a live context.
        check(unsafe { (self.api.cu_ctx_set_current)(ptr) })
    }

    fn ctx_synchronize(&self) -> DriverResult<()> {
        // SAFETY: no arguments; fails cleanly without a current context.
        check(unsafe { (self.api.cu_ctx_synchronize)() })
    }

    fn handle_create(&self, kind: CapabilityKind) -> DriverResult<RawHandle> {
        let library = self
            .handle_library(kind)
            .ok_or_else(|| Self::handle_status(kind, status::LIBRARY_NOT_FOUND))?;
        let ptr = library.create().map_err(|code| Self::handle_status(kind, code))?;
        RawHandle::new(ptr).ok_or_else(|| Self::handle_status(kind, status::internal_error(kind)))
    }

    fn handle_destroy(&self, kind: CapabilityKind, handle: RawHandle) -> DriverResult<()> {
        let library = self
            .handle_library(kind)
            .ok_or_else(|| Self::handle_status(kind, status::LIBRARY_NOT_FOUND))?;
        // SAFETY: `handle` came from `create` on this library and is
        // released exactly once by its owner.
        unsafe { library.destroy(handle.as_ptr()) }.map_err(|code| Self::handle_status(kind, code))
    }
}
