//! Dynamically resolved CUDA driver API.

use gpustream_core::driver::library::{LibraryError, LoadedLibrary};
use std::ffi::{c_char, c_void};

/// `CUresult`
pub type CuResult = i32;
/// `CUdevice`
pub type CuDevice = i32;
/// `CUcontext`
pub type CuContext = *mut c_void;

type CuInitFn = unsafe extern "C" fn(flags: u32) -> CuResult;
type CuDeviceGetCountFn = unsafe extern "C" fn(count: *mut i32) -> CuResult;
type CuDeviceGetFn = unsafe extern "C" fn(device: *mut CuDevice, ordinal: i32) -> CuResult;
type CuDeviceGetNameFn =
    unsafe extern "C" fn(name: *mut c_char, len: i32, device: CuDevice) -> CuResult;
type CuDeviceTotalMemFn = unsafe extern "C" fn(bytes: *mut usize, device: CuDevice) -> CuResult;
type CuCtxCreateFn =
    unsafe extern "C" fn(ctx: *mut CuContext, flags: u32, device: CuDevice) -> CuResult;
type CuCtxDestroyFn = unsafe extern "C" fn(ctx: CuContext) -> CuResult;
type CuCtxPopCurrentFn = unsafe extern "C" fn(ctx: *mut CuContext) -> CuResult;
type CuCtxSetCurrentFn = unsafe extern "C" fn(ctx: CuContext) -> CuResult;
type CuCtxSynchronizeFn = unsafe extern "C" fn() -> CuResult;

/// Entry points of `libcuda`.
#[derive(Debug)]
pub struct DriverApi {
    pub cu_init: CuInitFn,
    pub cu_device_get_count: CuDeviceGetCountFn,
    pub cu_device_get: CuDeviceGetFn,
    pub cu_device_get_name: CuDeviceGetNameFn,
    pub cu_device_total_mem: CuDeviceTotalMemFn,
    pub cu_ctx_create: CuCtxCreateFn,
    pub cu_ctx_destroy: CuCtxDestroyFn,
    pub cu_ctx_pop_current: CuCtxPopCurrentFn,
    pub cu_ctx_set_current: CuCtxSetCurrentFn,
    pub cu_ctx_synchronize: CuCtxSynchronizeFn,
    library: LoadedLibrary,
}

impl DriverApi {
    /// Opens the first loadable candidate and resolves every entry point.
    pub fn load(candidates: &[String]) -> Result<Self, LibraryError> {
        let library = LoadedLibrary::open("CUDA driver", candidates)?;

        // SAFETY: the prototypes above follow cuda.h. The `_v2` entry points
        // are the ones the unsuffixed macros resolve to since CUDA 4.0.
        unsafe {
            Ok(Self {
                cu_init: library.symbol("cuInit")?,
                cu_device_get_count: library.symbol("cuDeviceGetCount")?,
                cu_device_get: library.symbol("cuDeviceGet")?,
                cu_device_get_name: library.symbol("cuDeviceGetName")?,
                cu_device_total_mem: library.symbol("cuDeviceTotalMem_v2")?,
                cu_ctx_create: library.symbol("cuCtxCreate_v2")?,
                cu_ctx_destroy: library.symbol("cuCtxDestroy_v2")?,
                cu_ctx_pop_current: library.symbol("cuCtxPopCurrent_v2")?,
                cu_ctx_set_current: library.symbol("cuCtxSetCurrent")?,
                cu_ctx_synchronize: library.symbol("cuCtxSynchronize")?,
                library,
            })
        }
    }

    /// Name the library was opened from.
    pub fn path(&self) -> &str {
        self.library.path()
    }
}
