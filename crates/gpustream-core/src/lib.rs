//! Platform-agnostic GPU device, context and handle layer.
//!
//! This crate defines the vocabulary shared by every GPU backend: a
//! result-carrying error type that keeps the raw vendor status, the
//! [`Platform`] tag, the [`Driver`](driver::Driver) dispatch trait each
//! backend implements, and the device, context and handle layers built on
//! top of it. Vendor bindings live in separate crates (`gpustream-cuda`,
//! `gpustream-rocm`); the `gpustream` crate wires them into a process-wide
//! runtime.
//!
//! # Key Concepts
//!
//! - **Platform**: which vendor stack a call is routed to
//! - **Device**: a read-only record of one physical GPU
//! - **Context**: an execution environment bound to one device, current on
//!   zero or more threads
//! - **Handle**: a vendor library session (dense solver, BLAS) created against
//!   the calling thread's current context
//!
//! # Modules
//!
//! - [`config`]: Runtime configuration and environment overrides
//! - [`context`]: Context creation, the thread-local current context, scoped switching
//! - [`device`]: Device records
//! - [`driver`]: Backend dispatch trait and raw vendor values
//! - [`error`]: Error kinds and vendor status codes
//! - [`handle`]: Per-capability library handles
//! - [`platform`]: Platform tags
//! - [`runtime`]: The per-platform dispatch table

pub mod config;
pub mod context;
pub mod device;
pub mod driver;
pub mod error;
pub mod handle;
pub mod platform;
pub mod runtime;

// Re-export commonly used items at the crate root
pub use context::{
    ctx_clear_current, ctx_create, ctx_get_current, ctx_scope, ctx_set_current, Context,
    ContextState, CtxFlags, CurrentContext, OwningContext, SchedPolicy, ScopedCurrent,
};
pub use device::Device;
pub use error::{is_success, BackendStatus, Error, ErrorKind, Result};
pub use handle::{
    blas_create, handle_create, solver_dn_create, CapabilityKind, OwningBlasHandle, OwningHandle,
    OwningSolverDnHandle,
};
pub use platform::Platform;
pub use runtime::Runtime;

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use gpustream_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{runtime_config, RuntimeConfig, RuntimeConfigBuilder};
    pub use crate::context::{
        ctx_clear_current, ctx_create, ctx_get_current, ctx_scope, ctx_set_current, Context,
        ContextState, CtxFlags, CurrentContext, OwningContext, SchedPolicy, ScopedCurrent,
    };
    pub use crate::device::Device;
    pub use crate::driver::Driver;
    pub use crate::error::{BackendStatus, Error, ErrorKind, Result};
    pub use crate::handle::{
        blas_create, solver_dn_create, Blas, Capability, CapabilityKind, OwningBlasHandle,
        OwningHandle, OwningSolverDnHandle, SolverDn,
    };
    pub use crate::platform::Platform;
    pub use crate::runtime::{Runtime, RuntimeBuilder};
}
