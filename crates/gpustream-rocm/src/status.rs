//! `hipError_t` and `rocblas_status` classification.

use gpustream_core::{BackendStatus, ErrorKind};
use ErrorKind::{BackendUnavailable, InvalidState, NoDevice, ResourceExhausted};

/// Library tag of HIP statuses.
pub const HIP: &str = "hip";
/// Library tag of rocBLAS statuses, also used for rocSOLVER handles.
pub const ROCBLAS: &str = "rocblas";

/// Code used when a handle library could not be loaded at all.
pub const LIBRARY_NOT_FOUND: i32 = -1;

/// `rocblas_status_internal_error`
pub const ROCBLAS_INTERNAL_ERROR: i32 = 6;

type Entry = (i32, &'static str, Option<ErrorKind>);

const HIP_ERRORS: &[Entry] = &[
    (1, "hipErrorInvalidValue", None),
    (2, "hipErrorOutOfMemory", Some(ResourceExhausted)),
    (3, "hipErrorNotInitialized", Some(BackendUnavailable)),
    (4, "hipErrorDeinitialized", Some(BackendUnavailable)),
    (35, "hipErrorInsufficientDriver", Some(BackendUnavailable)),
    (100, "hipErrorNoDevice", Some(NoDevice)),
    (101, "hipErrorInvalidDevice", Some(NoDevice)),
    (201, "hipErrorInvalidContext", Some(InvalidState)),
    (209, "hipErrorNoBinaryForGpu", Some(BackendUnavailable)),
    (216, "hipErrorContextAlreadyInUse", Some(ResourceExhausted)),
    (400, "hipErrorInvalidHandle", Some(InvalidState)),
    (801, "hipErrorNotSupported", None),
    (999, "hipErrorUnknown", None),
];

const ROCBLAS_STATUSES: &[Entry] = &[
    (LIBRARY_NOT_FOUND, "rocblas_library_not_found", Some(BackendUnavailable)),
    (1, "rocblas_status_invalid_handle", Some(InvalidState)),
    (2, "rocblas_status_not_implemented", None),
    (3, "rocblas_status_invalid_pointer", None),
    (5, "rocblas_status_memory_error", Some(ResourceExhausted)),
    (ROCBLAS_INTERNAL_ERROR, "rocblas_status_internal_error", None),
    (11, "rocblas_status_invalid_value", None),
];

fn lookup(library: &'static str, table: &[Entry], code: i32, unknown: &'static str) -> BackendStatus {
    match table.iter().find(|(c, _, _)| *c == code) {
        Some(&(_, name, Some(kind))) => BackendStatus::new(library, code, name).with_kind(kind),
        Some(&(_, name, None)) => BackendStatus::new(library, code, name),
        None => BackendStatus::new(library, code, unknown),
    }
}

/// Classifies a non-zero `hipError_t`.
pub fn hip_error(code: i32) -> BackendStatus {
    lookup(HIP, HIP_ERRORS, code, "hipErrorUnrecognized")
}

/// Classifies a non-zero `rocblas_status`.
pub fn rocblas_status(code: i32) -> BackendStatus {
    lookup(ROCBLAS, ROCBLAS_STATUSES, code, "rocblas_status_unrecognized")
}

/// Turns a `hipError_t` into a driver result.
pub fn check(code: i32) -> Result<(), BackendStatus> {
    if code == 0 {
        Ok(())
    } else {
        Err(hip_error(code))
    }
}
