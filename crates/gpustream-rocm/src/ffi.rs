//! Dynamically resolved HIP runtime API.

use gpustream_core::driver::library::{LibraryError, LoadedLibrary};
use std::ffi::{c_char, c_void};

/// `hipError_t`
pub type HipError = i32;
/// `hipDevice_t`
pub type HipDevice = i32;
/// `hipCtx_t`
pub type HipCtx = *mut c_void;

type HipInitFn = unsafe extern "C" fn(flags: u32) -> HipError;
type HipGetDeviceCountFn = unsafe extern "C" fn(count: *mut i32) -> HipError;
type HipDeviceGetFn = unsafe extern "C" fn(device: *mut HipDevice, ordinal: i32) -> HipError;
type HipDeviceGetNameFn =
    unsafe extern "C" fn(name: *mut c_char, len: i32, device: HipDevice) -> HipError;
type HipDeviceTotalMemFn = unsafe extern "C" fn(bytes: *mut usize, device: HipDevice) -> HipError;
type HipCtxCreateFn =
    unsafe extern "C" fn(ctx: *mut HipCtx, flags: u32, device: HipDevice) -> HipError;
type HipCtxDestroyFn = unsafe extern "C" fn(ctx: HipCtx) -> HipError;
type HipCtxPopCurrentFn = unsafe extern "C" fn(ctx: *mut HipCtx) -> HipError;
type HipCtxSetCurrentFn = unsafe extern "C" fn(ctx: HipCtx) -> HipError;
type HipCtxSynchronizeFn = unsafe extern "C" fn() -> HipError;

/// `rocsolver_get_version_string(char*, size_t)`
pub type RocsolverVersionFn = unsafe extern "C" fn(buf: *mut c_char, len: usize) -> i32;

/// Entry points of `libamdhip64`.
#[derive(Debug)]
pub struct HipApi {
    pub hip_init: HipInitFn,
    pub hip_get_device_count: HipGetDeviceCountFn,
    pub hip_device_get: HipDeviceGetFn,
    pub hip_device_get_name: HipDeviceGetNameFn,
    pub hip_device_total_mem: HipDeviceTotalMemFn,
    pub hip_ctx_create: HipCtxCreateFn,
    pub hip_ctx_destroy: HipCtxDestroyFn,
    pub hip_ctx_pop_current: HipCtxPopCurrentFn,
    pub hip_ctx_set_current: HipCtxSetCurrentFn,
    pub hip_ctx_synchronize: HipCtxSynchronizeFn,
    library: LoadedLibrary,
}

impl HipApi {
    /// Opens the first loadable candidate and resolves every entry point.
    pub fn load(candidates: &[String]) -> Result<Self, LibraryError> {
        let library = LoadedLibrary::open("HIP runtime", candidates)?;

        // SAFETY: the prototypes above follow hip_runtime_api.h. The context
        // entry points are deprecated but still exported by ROCm 6.
        unsafe {
            Ok(Self {
                hip_init: library.symbol("hipInit")?,
                hip_get_device_count: library.symbol("hipGetDeviceCount")?,
                hip_device_get: library.symbol("hipDeviceGet")?,
                hip_device_get_name: library.symbol("hipDeviceGetName")?,
                hip_device_total_mem: library.symbol("hipDeviceTotalMem")?,
                hip_ctx_create: library.symbol("hipCtxCreate")?,
                hip_ctx_destroy: library.symbol("hipCtxDestroy")?,
                hip_ctx_pop_current: library.symbol("hipCtxPopCurrent")?,
                hip_ctx_set_current: library.symbol("hipCtxSetCurrent")?,
                hip_ctx_synchronize: library.symbol("hipCtxSynchronize")?,
                library,
            })
        }
    }

    /// Name the library was opened from.
    pub fn path(&self) -> &str {
        self.library.path()
    }
}
