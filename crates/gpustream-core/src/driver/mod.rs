//! Vendor driver interface.
//!
//! A [`Driver`] is the thin, status-code level surface of one vendor stack:
//! exactly the calls the device, context and handle layers need, with raw
//! vendor statuses as errors. The layers above own all bookkeeping
//! (thread-local current context, lifecycle checks, classification into
//! [`ErrorKind`](crate::error::ErrorKind)), so a driver stays a direct mapping
//! onto the vendor ABI.

#[cfg(feature = "dynload")]
pub mod library;
#[cfg(any(test, feature = "test-utils"))]
pub mod simulated;

use crate::context::CtxFlags;
use crate::error::BackendStatus;
use crate::handle::CapabilityKind;
use crate::platform::Platform;
use std::ffi::c_void;
use std::fmt::Debug;
use std::ptr::NonNull;

/// Result of a raw driver call.
pub type DriverResult<T> = std::result::Result<T, BackendStatus>;

/// Vendor device identifier (`CUdevice` / `hipDevice_t`, both plain `int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawDevice(pub i32);

/// Opaque vendor context pointer (`CUcontext` / `hipCtx_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawContext(NonNull<c_void>);

/// Opaque vendor library handle (`cusolverDnHandle_t`, `cublasHandle_t`,
/// `rocblas_handle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawHandle(NonNull<c_void>);

// Safety: both are opaque tokens issued by the vendor runtime. This crate
// never dereferences them; the vendor APIs accept them from any thread.
unsafe impl Send for RawContext {}
unsafe impl Sync for RawContext {}
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

macro_rules! raw_pointer_impl {
    ($ty:ident) => {
        impl $ty {
            /// Wraps a vendor pointer, returning `None` for null.
            pub fn new(ptr: *mut c_void) -> Option<Self> {
                NonNull::new(ptr).map(Self)
            }

            /// The pointer exactly as the vendor library expects it.
            pub fn as_ptr(self) -> *mut c_void {
                self.0.as_ptr()
            }
        }
    };
}

raw_pointer_impl!(RawContext);
raw_pointer_impl!(RawHandle);

/// One vendor backend.
///
/// Implementations must be callable from any thread. Calls that act on the
/// "current context" use the vendor's own per-thread state, which the
/// context layer keeps in sync with its thread-local slot.
pub trait Driver: Debug + Send + Sync {
    /// Platform this driver serves.
    fn platform(&self) -> Platform;

    /// Initializes the vendor runtime (`cuInit` / `hipInit`). Must be idempotent.
    fn init(&self) -> DriverResult<()>;

    /// Number of visible devices.
    fn device_count(&self) -> DriverResult<i32>;

    /// Device handle for an ordinal already checked to be in range.
    fn device_get(&self, ordinal: i32) -> DriverResult<RawDevice>;

    /// Marketing name of the device.
    fn device_name(&self, device: RawDevice) -> DriverResult<String>;

    /// Total device memory in bytes.
    fn device_total_mem(&self, device: RawDevice) -> DriverResult<usize>;

    /// Creates a context on `device`, leaving the calling thread's current
    /// context unchanged. The context layer binds it with `ctx_set_current`.
    fn ctx_create(&self, flags: CtxFlags, device: RawDevice) -> DriverResult<RawContext>;

    /// Destroys a context.
    fn ctx_destroy(&self, ctx: RawContext) -> DriverResult<()>;

    /// Sets (or with `None`, clears) the calling thread's current context.
    ///
    /// Vendors keep a per-thread context stack: `Some` replaces its top entry
    /// and `None` pops it. Because `ctx_create` never pushes, the stack holds
    /// at most one entry and `None` leaves the thread unbound.
    fn ctx_set_current(&self, ctx: Option<RawContext>) -> DriverResult<()>;

    /// Blocks until all work queued on the current context has finished.
    fn ctx_synchronize(&self) -> DriverResult<()>;

    /// Creates a library handle bound to the calling thread's current context.
    fn handle_create(&self, kind: CapabilityKind) -> DriverResult<RawHandle>;

    /// Destroys a library handle.
    fn handle_destroy(&self, kind: CapabilityKind, handle: RawHandle) -> DriverResult<()>;
}
