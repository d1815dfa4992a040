//! GPU vendor platform tags.
//!
//! Every device, context and handle in this crate is bound to exactly one
//! [`Platform`] for its whole lifetime.

use crate::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

/// Vendor compute stacks the layer can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Platform {
    /// NVIDIA CUDA driver API with cuSOLVER/cuBLAS
    Cuda,
    /// AMD ROCm (HIP runtime) with rocSOLVER/rocBLAS
    Rocm,
}

impl Platform {
    /// All platforms, in dispatch table order.
    pub const ALL: [Platform; 2] = [Platform::Cuda, Platform::Rocm];

    /// Number of dispatch table slots.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this platform in the dispatch table.
    pub const fn index(self) -> usize {
        match self {
            Self::Cuda => 0,
            Self::Rocm => 1,
        }
    }

    /// Lowercase identifier used in configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Rocm => "rocm",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuda => write!(f, "CUDA"),
            Self::Rocm => write!(f, "ROCm"),
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cuda" | "nvidia" => Ok(Self::Cuda),
            "rocm" | "hip" | "amd" => Ok(Self::Rocm),
            other => Err(Error::new(
                ErrorKind::BackendUnavailable,
                format!("unknown platform '{other}'"),
            )),
        }
    }
}
