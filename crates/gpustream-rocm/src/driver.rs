//! [`Driver`] implementation over HIP.

use crate::ffi::{HipApi, RocsolverVersionFn};
use crate::flags;
use crate::status::{self, check};
use gpustream_core::config::LibrarySet;
use gpustream_core::driver::library::{HandleLibrary, LibraryError, LoadedLibrary};
use gpustream_core::driver::{Driver, DriverResult, RawContext, RawDevice, RawHandle};
use gpustream_core::{CapabilityKind, CtxFlags, Platform};
use once_cell::sync::OnceCell;
use std::ffi::{c_char, CStr};
use tracing::{debug, warn};

const NAME_LEN: usize = 256;

/// rocSOLVER works on `rocblas_handle`s. Its handles come from rocBLAS
/// while the solver library is kept loaded next to it.
#[derive(Debug)]
struct SolverLibraries {
    handles: HandleLibrary,
    _rocsolver: LoadedLibrary,
}

impl SolverLibraries {
    fn open(libraries: &LibrarySet) -> Result<Self, LibraryError> {
        let rocsolver = LoadedLibrary::open("rocSOLVER", &libraries.solver)?;
        // SAFETY: declared as `rocblas_status (char*, size_t)` in rocsolver-functions.h.
        let version: RocsolverVersionFn = unsafe { rocsolver.symbol("rocsolver_get_version_string")? };
        let mut buffer = [0 as c_char; 64];
        // SAFETY: `buffer` is valid for `buffer.len()` bytes.
        if unsafe { version(buffer.as_mut_ptr(), buffer.len()) } == 0 {
            // SAFETY: rocSOLVER NUL terminates within the given length.
            let text = unsafe { CStr::from_ptr(buffer.as_ptr()) };
            debug!(path = rocsolver.path(), version = %text.to_string_lossy(), "loaded rocSOLVER");
        }

        let handles = open_rocblas("rocBLAS (for rocSOLVER)", libraries)?;
        Ok(Self {
            handles,
            _rocsolver: rocsolver,
        })
    }
}

fn open_rocblas(what: &'static str, libraries: &LibrarySet) -> Result<HandleLibrary, LibraryError> {
    HandleLibrary::open(
        what,
        &libraries.blas,
        "rocblas_create_handle",
        "rocblas_destroy_handle",
    )
}

/// The ROCm backend.
///
/// `libamdhip64` is opened when the driver is loaded; rocBLAS and rocSOLVER
/// on the first handle request of that kind.
#[derive(Debug)]
pub struct RocmDriver {
    api: HipApi,
    libraries: LibrarySet,
    solver: OnceCell<Option<SolverLibraries>>,
    blas: OnceCell<Option<HandleLibrary>>,
}

impl RocmDriver {
    /// Opens `libamdhip64` from the configured candidates.
    pub fn load(libraries: &LibrarySet) -> Result<Self, LibraryError> {
        let api = HipApi::load(&libraries.driver)?;
        debug!(path = api.path(), "loaded HIP runtime API");
        Ok(Self {
            api,
            libraries: libraries.clone(),
            solver: OnceCell::new(),
            blas: OnceCell::new(),
        })
    }

    fn handle_library(&self, kind: CapabilityKind) -> Option<&HandleLibrary> {
        match kind {
            CapabilityKind::SolverDn => self
                .solver
                .get_or_init(|| {
                    SolverLibraries::open(&self.libraries)
                        .map_err(|err| warn!(error = %err, "rocSOLVER unavailable"))
                        .ok()
                })
                .as_ref()
                .map(|solver| &solver.handles),
            CapabilityKind::Blas => self
                .blas
                .get_or_init(|| {
                    open_rocblas("rocBLAS", &self.libraries)
                        .map_err(|err| warn!(error = %err, "rocBLAS unavailable"))
                        .ok()
                })
                .as_ref(),
        }
    }
}

impl Driver for RocmDriver {
    fn platform(&self) -> Platform {
        Platform::Rocm
    }

    fn init(&self) -> DriverResult<()> {
        // SAFETY: hipInit takes no pointers and is safe to call repeatedly.
        check(unsafe { (self.api.hip_init)(0) })
    }

    fn device_count(&self) -> DriverResult<i32> {
        let mut count = 0;
        // SAFETY: `count` is a valid out-pointer for the duration of the call.
        check(unsafe { (self.api.hip_get_device_count)(&mut count) })?;
        Ok(count)
    }

    fn device_get(&self, ordinal: i32) -> DriverResult<RawDevice> {
        let mut device = 0;
        // SAFETY: `device` is a valid out-pointer; the ordinal was range checked.
        check(unsafe { (self.api.hip_device_get)(&mut device, ordinal) })?;
        Ok(RawDevice(device))
    }

    fn device_name(&self, device: RawDevice) -> DriverResult<String> {
        let mut buffer = [0 as c_char; NAME_LEN];
        // SAFETY: `buffer` is writable for `NAME_LEN` bytes.
        check(unsafe {
            (self.api.hip_device_get_name)(buffer.as_mut_ptr(), NAME_LEN as i32, device.0)
        })?;
        // SAFETY: HIP writes a NUL terminated string into `buffer`.
        let name = unsafe { CStr::from_ptr(buffer.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    fn device_total_mem(&self, device: RawDevice) -> DriverResult<usize> {
        let mut bytes = 0usize;
        // SAFETY: `bytes` is a valid out-pointer for the duration of the call.
        check(unsafe { (self.api.hip_device_total_mem)(&mut bytes, device.0) })?;
        Ok(bytes)
    }

    fn ctx_create(&self, flags: CtxFlags, device: RawDevice) -> DriverResult<RawContext> {
        let mut ctx = std::ptr::null_mut();
        // SAFETY: `ctx` is a valid out-pointer; `device` came from hipDeviceGet.
        check(unsafe { (self.api.hip_ctx_create)(&mut ctx, flags::encode(flags), device.0) })?;
        let ctx = RawContext::new(ctx).ok_or_else(|| status::hip_error(999))?;

        // hipCtxCreate pushes the new context; pop it so the binding stays
        // with ctx_set_current.
        let mut popped = std::ptr::null_mut();
        // SAFETY: `popped` is a valid out-pointer.
        if let Err(status) = check(unsafe { (self.api.hip_ctx_pop_current)(&mut popped) }) {
            // SAFETY: `ctx` was created above and is not shared yet.
            let _ = unsafe { (self.api.hip_ctx_destroy)(ctx.as_ptr()) };
            return Err(status);
        }
        Ok(ctx)
    }

    fn ctx_destroy(&self, ctx: RawContext) -> DriverResult<()> {
        // SAFETY: `ctx` is a live context owned by the caller.
        check(unsafe { (self.api.hip_ctx_destroy)(ctx.as_ptr()) })
    }

    fn ctx_set_current(&self, ctx: Option<RawContext>) -> DriverResult<()> {
        let ptr = ctx.map_or(std::ptr::null_mut(), RawContext::as_ptr);
        // SAFETY: `ptr` is null or a live context.
        check(unsafe { (self.api.hip_ctx_set_current)(ptr) })
    }

    fn ctx_synchronize(&self) -> DriverResult<()> {
        // SAFETY: no arguments; fails cleanly without a current context.
        check(unsafe { (self.api.hip_ctx_synchronize)() })
    }

    fn handle_create(&self, kind: CapabilityKind) -> DriverResult<RawHandle> {
        let library = self
            .handle_library(kind)
            .ok_or_else(|| status::rocblas_status(status::LIBRARY_NOT_FOUND))?;
        let ptr = library.create().map_err(status::rocblas_status)?;
        RawHandle::new(ptr).ok_or_else(|| status::rocblas_status(status::ROCBLAS_INTERNAL_ERROR))
    }

    fn handle_destroy(&self, kind: CapabilityKind, handle: RawHandle) -> DriverResult<()> {
        let library = self
            .handle_library(kind)
            .ok_or_else(|| status::rocblas_status(status::LIBRARY_NOT_FOUND))?;
        // SAFETY: `handle` came from `create` on this library and is
        // released exactly once by its owner.
        unsafe { library.destroy(handle.as_ptr()) }.map_err(status::rocblas_status)
    }
}
