//! Error type shared by every layer of the crate.
//!
//! Vendor libraries report failures as integer status codes. Those codes are
//! kept verbatim in a [`BackendStatus`] and classified into a
//! platform-agnostic [`ErrorKind`], so callers can branch on the kind while
//! diagnostics still show the exact vendor code.

use crate::platform::Platform;
use std::fmt;
use thiserror::Error;

/// Platform-agnostic failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The vendor driver or runtime library is missing or unusable.
    BackendUnavailable,
    /// No device is visible, or the requested ordinal is out of range.
    NoDevice,
    /// The vendor refused to create a context.
    ContextCreationFailed,
    /// The calling thread has no current context.
    NoCurrentContext,
    /// The vendor ran out of memory, handles or context slots.
    ResourceExhausted,
    /// The operation is illegal in the resource's current lifecycle state.
    InvalidState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BackendUnavailable => "backend unavailable",
            Self::NoDevice => "no device",
            Self::ContextCreationFailed => "context creation failed",
            Self::NoCurrentContext => "no current context",
            Self::ResourceExhausted => "resource exhausted",
            Self::InvalidState => "invalid state",
        };
        f.write_str(s)
    }
}

/// A raw status code returned by a vendor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    /// Library that produced the code, e.g. `"cuda"` or `"rocblas"`.
    pub library: &'static str,
    /// The raw status value.
    pub code: i32,
    /// Symbolic name of the code, e.g. `"CUDA_ERROR_OUT_OF_MEMORY"`.
    pub name: &'static str,
    /// Classification chosen by the backend, if the code has an obvious one.
    pub kind: Option<ErrorKind>,
}

impl BackendStatus {
    /// Creates an unclassified status.
    pub const fn new(library: &'static str, code: i32, name: &'static str) -> Self {
        Self {
            library,
            code,
            name,
            kind: None,
        }
    }

    /// Attaches a classification.
    #[must_use]
    pub const fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.library, self.name, self.code)
    }
}

/// Error returned by every fallible operation in the crate.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}{}", status_suffix(.platform, .status))]
pub struct Error {
    kind: ErrorKind,
    platform: Option<Platform>,
    status: Option<BackendStatus>,
    message: String,
}

fn status_suffix(platform: &Option<Platform>, status: &Option<BackendStatus>) -> String {
    match (platform, status) {
        (Some(p), Some(s)) => format!(" [{p}: {s}]"),
        (None, Some(s)) => format!(" [{s}]"),
        (Some(p), None) => format!(" [{p}]"),
        (None, None) => String::new(),
    }
}

impl Error {
    /// Creates an error with no vendor status attached.
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            platform: None,
            status: None,
            message: message.into(),
        }
    }

    /// Creates an error from a vendor status.
    ///
    /// The status' own classification wins; `fallback` is used when the
    /// backend did not classify the code.
    pub fn from_status<S: Into<String>>(
        status: BackendStatus,
        fallback: ErrorKind,
        message: S,
    ) -> Self {
        Self {
            kind: status.kind.unwrap_or(fallback),
            platform: None,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a `NoDevice` error.
    pub fn no_device<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::NoDevice, message)
    }

    /// Creates a `NoCurrentContext` error.
    pub fn no_current_context() -> Self {
        Self::new(
            ErrorKind::NoCurrentContext,
            "no context is current on the calling thread",
        )
    }

    /// Creates an `InvalidState` error.
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Creates a `BackendUnavailable` error.
    pub fn backend_unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    /// Tags the error with the platform it came from.
    #[must_use]
    pub fn on(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Platform-agnostic category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Platform the failure happened on, if known.
    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    /// Raw vendor status, if the failure came from a vendor call.
    pub fn status(&self) -> Option<&BackendStatus> {
        self.status.as_ref()
    }

    /// Human readable description without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error has the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns `true` if `result` holds a value.
pub fn is_success<T>(result: &Result<T>) -> bool {
    result.is_ok()
}
