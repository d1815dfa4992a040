//! Per-capability library handles.
//!
//! A handle is created against the calling thread's current context, the
//! same ambient binding `cusolverDnCreate` and `rocblas_create_handle` use.
//! It keeps its context alive and blocks the context's destruction until the
//! handle is released.

use crate::context::{Context, CurrentContext};
use crate::driver::RawHandle;
use crate::error::{Error, ErrorKind, Result};
use crate::platform::Platform;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// Library capabilities a driver can create handles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// Dense linear solver (cuSOLVER-Dn, rocSOLVER).
    SolverDn,
    /// Dense BLAS (cuBLAS, rocBLAS).
    Blas,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SolverDn => write!(f, "solver-dn"),
            Self::Blas => write!(f, "blas"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Type-level tag selecting a [`CapabilityKind`].
pub trait Capability: sealed::Sealed + 'static {
    /// The capability this tag stands for.
    const KIND: CapabilityKind;
}

/// Dense solver capability.
#[derive(Debug)]
pub enum SolverDn {}

/// BLAS capability.
#[derive(Debug)]
pub enum Blas {}

impl sealed::Sealed for SolverDn {}
impl sealed::Sealed for Blas {}

impl Capability for SolverDn {
    const KIND: CapabilityKind = CapabilityKind::SolverDn;
}

impl Capability for Blas {
    const KIND: CapabilityKind = CapabilityKind::Blas;
}

/// An owned library handle.
pub struct OwningHandle<C: Capability> {
    raw: RawHandle,
    released: bool,
    context: Context,
    _capability: PhantomData<C>,
}

/// Owned dense-solver handle.
pub type OwningSolverDnHandle = OwningHandle<SolverDn>;

/// Owned BLAS handle.
pub type OwningBlasHandle = OwningHandle<Blas>;

impl<C: Capability> OwningHandle<C> {
    /// The vendor handle, exactly as the vendor library expects it.
    pub fn as_raw(&self) -> RawHandle {
        self.raw
    }

    /// Context the handle was created against.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Platform of the handle.
    pub fn platform(&self) -> Platform {
        self.context.platform()
    }

    /// Capability of the handle.
    pub fn kind(&self) -> CapabilityKind {
        C::KIND
    }

    /// Destroys the handle, reporting vendor failures.
    pub fn destroy(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let raw = self.raw;
        let result = self
            .context
            .driver()
            .handle_destroy(C::KIND, raw)
            .map_err(|status| {
                Error::from_status(
                    status,
                    ErrorKind::InvalidState,
                    format!("failed to destroy {} handle", C::KIND),
                )
                .on(self.platform())
            });
        self.context.release_handle();
        debug!(platform = %self.platform(), context = self.context.id(), kind = %C::KIND, "destroyed handle");
        result
    }
}

impl<C: Capability> Drop for OwningHandle<C> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(kind = %C::KIND, error = %err, "failed to destroy handle");
        }
    }
}

impl<C: Capability> fmt::Debug for OwningHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwningHandle")
            .field("kind", &C::KIND)
            .field("raw", &self.raw)
            .field("context", &self.context.id())
            .finish()
    }
}

/// Creates a handle for capability `C` on the calling thread's current
/// context.
///
/// Fails with `NoCurrentContext` when nothing is current, with
/// `InvalidState` when `current` no longer names the current context, and
/// with `ResourceExhausted` when the vendor cannot allocate the handle.
pub fn handle_create<C: Capability>(current: &CurrentContext) -> Result<OwningHandle<C>> {
    current.ensure_current()?;
    let context = current.context().clone();
    context.retain_handle()?;

    match context.driver().handle_create(C::KIND) {
        Ok(raw) => {
            debug!(platform = %context.platform(), context = context.id(), kind = %C::KIND, "created handle");
            Ok(OwningHandle {
                raw,
                released: false,
                context,
                _capability: PhantomData,
            })
        }
        Err(status) => {
            context.release_handle();
            Err(Error::from_status(
                status,
                ErrorKind::ResourceExhausted,
                format!("failed to create {} handle", C::KIND),
            )
            .on(context.platform()))
        }
    }
}

/// Creates a dense-solver handle on the current context.
pub fn solver_dn_create(current: &CurrentContext) -> Result<OwningSolverDnHandle> {
    handle_create::<SolverDn>(current)
}

/// Creates a BLAS handle on the current context.
pub fn blas_create(current: &CurrentContext) -> Result<OwningBlasHandle> {
    handle_create::<Blas>(current)
}
