//! Runtime loading of vendor shared libraries.
//!
//! Backends never link against a vendor toolkit. They open the first
//! loadable name from a configured candidate list and resolve symbols by
//! name, so the workspace builds and its tests run on machines without any
//! GPU stack installed.

use crate::error::Error;
use libloading::Library;
use std::ffi::c_void;
use std::fmt;
use thiserror::Error as ThisError;
use tracing::debug;

/// Failure to open a vendor library or resolve one of its symbols.
#[derive(Debug, ThisError)]
pub enum LibraryError {
    /// The candidate list was empty.
    #[error("no library names configured for {what}")]
    NoCandidates {
        /// Human readable library role, e.g. `"CUDA driver"`.
        what: &'static str,
    },

    /// None of the candidates could be opened.
    #[error("could not load {what} (tried {tried}): {source}")]
    NotFound {
        /// Human readable library role.
        what: &'static str,
        /// Comma separated candidate names.
        tried: String,
        /// Error of the last attempt.
        #[source]
        source: libloading::Error,
    },

    /// The library opened but lacks a required symbol.
    #[error("{path} does not export {symbol}: {source}")]
    MissingSymbol {
        /// Path or name the library was opened from.
        path: String,
        /// Symbol that failed to resolve.
        symbol: &'static str,
        /// Loader error.
        #[source]
        source: libloading::Error,
    },
}

impl From<LibraryError> for Error {
    fn from(err: LibraryError) -> Self {
        Error::backend_unavailable(err.to_string())
    }
}

/// An opened vendor library.
pub struct LoadedLibrary {
    library: Library,
    path: String,
}

impl LoadedLibrary {
    /// Opens the first loadable entry of `candidates`.
    pub fn open(what: &'static str, candidates: &[String]) -> Result<Self, LibraryError> {
        let mut last_error = None;
        for name in candidates {
            // SAFETY: vendor libraries run only their documented
            // initializers on load.
            match unsafe { Library::new(name) } {
                Ok(library) => {
                    debug!(what, path = %name, "opened library");
                    return Ok(Self {
                        library,
                        path: name.clone(),
                    });
                }
                Err(err) => last_error = Some(err),
            }
        }

        match last_error {
            Some(source) => Err(LibraryError::NotFound {
                what,
                tried: candidates.join(", "),
                source,
            }),
            None => Err(LibraryError::NoCandidates { what }),
        }
    }

    /// Name the library was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolves `symbol` as a value of type `T`.
    ///
    /// # Safety
    ///
    /// `T` must be the exact function pointer type of the exported symbol.
    /// The returned value must not outlive `self`.
    pub unsafe fn symbol<T: Copy>(&self, symbol: &'static str) -> Result<T, LibraryError> {
        // SAFETY: the caller guarantees `T` matches the symbol's type.
        let resolved = unsafe { self.library.get::<T>(symbol.as_bytes()) }.map_err(|source| {
            LibraryError::MissingSymbol {
                path: self.path.clone(),
                symbol,
                source,
            }
        })?;
        Ok(*resolved)
    }
}

impl fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedLibrary").field("path", &self.path).finish()
    }
}

/// `xxxCreate(handle_t*)` as exported by cuSOLVER, cuBLAS and rocBLAS.
pub type HandleCreateFn = unsafe extern "C" fn(handle: *mut *mut c_void) -> i32;

/// `xxxDestroy(handle_t)`.
pub type HandleDestroyFn = unsafe extern "C" fn(handle: *mut c_void) -> i32;

/// A library whose handles follow the create/destroy pair convention.
pub struct HandleLibrary {
    create: HandleCreateFn,
    destroy: HandleDestroyFn,
    library: LoadedLibrary,
}

impl HandleLibrary {
    /// Opens `candidates` and resolves the create/destroy pair.
    pub fn open(
        what: &'static str,
        candidates: &[String],
        create_symbol: &'static str,
        destroy_symbol: &'static str,
    ) -> Result<Self, LibraryError> {
        let library = LoadedLibrary::open(what, candidates)?;
        // SAFETY: both symbols are declared with these prototypes in the
        // vendor headers; the pointers live as long as `library`.
        let (create, destroy) = unsafe {
            (
                library.symbol::<HandleCreateFn>(create_symbol)?,
                library.symbol::<HandleDestroyFn>(destroy_symbol)?,
            )
        };
        Ok(Self {
            create,
            destroy,
            library,
        })
    }

    /// Name the library was opened from.
    pub fn path(&self) -> &str {
        self.library.path()
    }

    /// Calls the create entry point. Returns the vendor status on failure.
    pub fn create(&self) -> Result<*mut c_void, i32> {
        let mut handle = std::ptr::null_mut();
        // SAFETY: `handle` is a valid out-pointer for the duration of the call.
        let code = unsafe { (self.create)(&mut handle) };
        if code == 0 {
            Ok(handle)
        } else {
            Err(code)
        }
    }

    /// Calls the destroy entry point. Returns the vendor status on failure.
    ///
    /// # Safety
    ///
    /// `handle` must come from [`create`](Self::create) on this library and
    /// must not be used afterwards.
    pub unsafe fn destroy(&self, handle: *mut c_void) -> Result<(), i32> {
        // SAFETY: upheld by the caller.
        let code = unsafe { (self.destroy)(handle) };
        if code == 0 {
            Ok(())
        } else {
            Err(code)
        }
    }
}

impl fmt::Debug for HandleLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleLibrary")
            .field("path", &self.library.path())
            .finish()
    }
}
