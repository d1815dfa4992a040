//! `CUresult`, `cusolverStatus_t` and `cublasStatus_t` classification.

use gpustream_core::{BackendStatus, CapabilityKind, ErrorKind};
use ErrorKind::{BackendUnavailable, InvalidState, NoDevice, ResourceExhausted};

/// Library tag of driver API statuses.
pub const CUDA: &str = "cuda";
/// Library tag of cuSOLVER statuses.
pub const CUSOLVER: &str = "cusolver";
/// Library tag of cuBLAS statuses.
pub const CUBLAS: &str = "cublas";

/// Code used when a handle library could not be loaded at all.
pub const LIBRARY_NOT_FOUND: i32 = -1;

type Entry = (i32, &'static str, Option<ErrorKind>);

const CU_RESULTS: &[Entry] = &[
    (1, "CUDA_ERROR_INVALID_VALUE", None),
    (2, "CUDA_ERROR_OUT_OF_MEMORY", Some(ResourceExhausted)),
    (3, "CUDA_ERROR_NOT_INITIALIZED", Some(BackendUnavailable)),
    (4, "CUDA_ERROR_DEINITIALIZED", Some(BackendUnavailable)),
    (34, "CUDA_ERROR_STUB_LIBRARY", Some(BackendUnavailable)),
    (46, "CUDA_ERROR_DEVICE_UNAVAILABLE", Some(NoDevice)),
    (100, "CUDA_ERROR_NO_DEVICE", Some(NoDevice)),
    (101, "CUDA_ERROR_INVALID_DEVICE", Some(NoDevice)),
    (201, "CUDA_ERROR_INVALID_CONTEXT", Some(InvalidState)),
    (216, "CUDA_ERROR_CONTEXT_ALREADY_IN_USE", Some(ResourceExhausted)),
    (400, "CUDA_ERROR_INVALID_HANDLE", Some(InvalidState)),
    (709, "CUDA_ERROR_CONTEXT_IS_DESTROYED", Some(InvalidState)),
    (801, "CUDA_ERROR_NOT_SUPPORTED", None),
    (803, "CUDA_ERROR_SYSTEM_DRIVER_MISMATCH", Some(BackendUnavailable)),
    (804, "CUDA_ERROR_COMPAT_NOT_SUPPORTED_ON_DEVICE", Some(BackendUnavailable)),
    (999, "CUDA_ERROR_UNKNOWN", None),
];

const CUSOLVER_STATUSES: &[Entry] = &[
    (LIBRARY_NOT_FOUND, "CUSOLVER_LIBRARY_NOT_FOUND", Some(BackendUnavailable)),
    (1, "CUSOLVER_STATUS_NOT_INITIALIZED", Some(BackendUnavailable)),
    (2, "CUSOLVER_STATUS_ALLOC_FAILED", Some(ResourceExhausted)),
    (3, "CUSOLVER_STATUS_INVALID_VALUE", None),
    (4, "CUSOLVER_STATUS_ARCH_MISMATCH", Some(BackendUnavailable)),
    (7, "CUSOLVER_STATUS_INTERNAL_ERROR", None),
    (9, "CUSOLVER_STATUS_NOT_SUPPORTED", None),
];

const CUBLAS_STATUSES: &[Entry] = &[
    (LIBRARY_NOT_FOUND, "CUBLAS_LIBRARY_NOT_FOUND", Some(BackendUnavailable)),
    (1, "CUBLAS_STATUS_NOT_INITIALIZED", Some(BackendUnavailable)),
    (3, "CUBLAS_STATUS_ALLOC_FAILED", Some(ResourceExhausted)),
    (7, "CUBLAS_STATUS_INVALID_VALUE", None),
    (8, "CUBLAS_STATUS_ARCH_MISMATCH", Some(BackendUnavailable)),
    (14, "CUBLAS_STATUS_INTERNAL_ERROR", None),
    (15, "CUBLAS_STATUS_NOT_SUPPORTED", None),
];

fn lookup(library: &'static str, table: &[Entry], code: i32, unknown: &'static str) -> BackendStatus {
    match table.iter().find(|(c, _, _)| *c == code) {
        Some(&(_, name, Some(kind))) => BackendStatus::new(library, code, name).with_kind(kind),
        Some(&(_, name, None)) => BackendStatus::new(library, code, name),
        None => BackendStatus::new(library, code, unknown),
    }
}

/// Classifies a non-zero `CUresult`.
pub fn cu_result(code: i32) -> BackendStatus {
    lookup(CUDA, CU_RESULTS, code, "CUDA_ERROR_UNRECOGNIZED")
}

/// Classifies a non-zero `cusolverStatus_t`.
pub fn cusolver_status(code: i32) -> BackendStatus {
    lookup(CUSOLVER, CUSOLVER_STATUSES, code, "CUSOLVER_STATUS_UNRECOGNIZED")
}

/// Classifies a non-zero `cublasStatus_t`.
pub fn cublas_status(code: i32) -> BackendStatus {
    lookup(CUBLAS, CUBLAS_STATUSES, code, "CUBLAS_STATUS_UNRECOGNIZED")
}

/// `*_STATUS_INTERNAL_ERROR` of the library serving `kind`.
pub fn internal_error(kind: CapabilityKind) -> i32 {
    match kind {
        CapabilityKind::SolverDn => 7,
        CapabilityKind::Blas => 14,
    }
}

/// Turns a `CUresult` into a driver result.
pub fn check(code: i32) -> Result<(), BackendStatus> {
    if code == 0 {
        Ok(())
    } else {
        Err(cu_result(code))
    }
}
