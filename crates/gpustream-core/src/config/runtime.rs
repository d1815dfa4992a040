//! Runtime configuration.
//!
//! Selects which platforms the dispatch table may load, which shared
//! libraries each backend tries, and the default context flags. Values come
//! from built-in defaults, optionally overridden by environment variables:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `GPUSTREAM_PLATFORMS` | comma separated platforms to enable, e.g. `cuda,rocm` |
//! | `GPUSTREAM_CTX_SCHED` | default scheduling policy: `auto`, `spin`, `yield`, `blocking_sync` |
//! | `GPUSTREAM_CUDA_DRIVER_LIB` | candidate paths for `libcuda` |
//! | `GPUSTREAM_CUDA_SOLVER_LIB` | candidate paths for `libcusolver` |
//! | `GPUSTREAM_CUDA_BLAS_LIB` | candidate paths for `libcublas` |
//! | `GPUSTREAM_HIP_LIB` | candidate paths for `libamdhip64` |
//! | `GPUSTREAM_ROCSOLVER_LIB` | candidate paths for `librocsolver` |
//! | `GPUSTREAM_ROCBLAS_LIB` | candidate paths for `librocblas` |
//!
//! Library variables hold a platform path list (`:` separated on Unix, `;`
//! on Windows).

use crate::context::{CtxFlags, SchedPolicy};
use crate::platform::Platform;
use once_cell::sync::Lazy;
use std::ffi::OsString;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Candidate shared-library names for one backend, tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LibrarySet {
    /// Driver or runtime library (`libcuda`, `libamdhip64`).
    pub driver: Vec<String>,
    /// Dense solver library (`libcusolver`, `librocsolver`).
    pub solver: Vec<String>,
    /// BLAS library (`libcublas`, `librocblas`).
    pub blas: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

impl LibrarySet {
    /// Default library names for CUDA on the build target.
    pub fn cuda_defaults() -> Self {
        if cfg!(target_os = "windows") {
            Self {
                driver: names(&["nvcuda.dll"]),
                solver: names(&["cusolver64_11.dll", "cusolver64_12.dll"]),
                blas: names(&["cublas64_12.dll", "cublas64_11.dll"]),
            }
        } else {
            Self {
                driver: names(&["libcuda.so.1", "libcuda.so"]),
                solver: names(&["libcusolver.so.11", "libcusolver.so.12", "libcusolver.so"]),
                blas: names(&["libcublas.so.12", "libcublas.so.11", "libcublas.so"]),
            }
        }
    }

    /// Default library names for ROCm on the build target.
    pub fn rocm_defaults() -> Self {
        if cfg!(target_os = "windows") {
            Self {
                driver: names(&["amdhip64_6.dll", "amdhip64.dll"]),
                solver: names(&["rocsolver.dll"]),
                blas: names(&["rocblas.dll"]),
            }
        } else {
            Self {
                driver: names(&["libamdhip64.so.6", "libamdhip64.so.5", "libamdhip64.so"]),
                solver: names(&["librocsolver.so.0", "librocsolver.so"]),
                blas: names(&["librocblas.so.4", "librocblas.so.3", "librocblas.so"]),
            }
        }
    }
}

/// Configuration of the runtime dispatch table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeConfig {
    /// Platforms the runtime may load, in order of preference.
    pub platforms: Vec<Platform>,
    /// Flags used when a caller does not pass any.
    pub default_flags: CtxFlags,
    /// CUDA library candidates.
    pub cuda: LibrarySet,
    /// ROCm library candidates.
    pub rocm: LibrarySet,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            platforms: Platform::ALL.to_vec(),
            default_flags: CtxFlags::SCHED_AUTO,
            cuda: LibrarySet::cuda_defaults(),
            rocm: LibrarySet::rocm_defaults(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `GPUSTREAM_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut config = Self::default();
        let text = |key: &str| lookup(key).and_then(|v| v.into_string().ok());

        if let Some(value) = text("GPUSTREAM_PLATFORMS") {
            let platforms: Vec<Platform> = value
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| match Platform::from_str(s) {
                    Ok(p) => Some(p),
                    Err(err) => {
                        warn!(value = s, error = %err, "ignoring entry in GPUSTREAM_PLATFORMS");
                        None
                    }
                })
                .collect();
            config.platforms = platforms;
        }

        if let Some(value) = text("GPUSTREAM_CTX_SCHED") {
            match parse_sched(&value) {
                Some(sched) => config.default_flags.sched = sched,
                None => warn!(value = %value, "ignoring unknown GPUSTREAM_CTX_SCHED"),
            }
        }

        let paths = |key: &str| {
            lookup(key).map(|v| {
                std::env::split_paths(&v)
                    .map(|p| p.to_string_lossy().into_owned())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
        };
        let overrides = [
            ("GPUSTREAM_CUDA_DRIVER_LIB", &mut config.cuda.driver),
            ("GPUSTREAM_CUDA_SOLVER_LIB", &mut config.cuda.solver),
            ("GPUSTREAM_CUDA_BLAS_LIB", &mut config.cuda.blas),
            ("GPUSTREAM_HIP_LIB", &mut config.rocm.driver),
            ("GPUSTREAM_ROCSOLVER_LIB", &mut config.rocm.solver),
            ("GPUSTREAM_ROCBLAS_LIB", &mut config.rocm.blas),
        ];
        for (key, target) in overrides {
            if let Some(list) = paths(key).filter(|l| !l.is_empty()) {
                *target = list;
            }
        }

        config
    }

    /// Whether `platform` may be loaded.
    pub fn is_enabled(&self, platform: Platform) -> bool {
        self.platforms.contains(&platform)
    }

    /// Library candidates for `platform`.
    pub fn libraries(&self, platform: Platform) -> &LibrarySet {
        match platform {
            Platform::Cuda => &self.cuda,
            Platform::Rocm => &self.rocm,
        }
    }
}

fn parse_sched(value: &str) -> Option<SchedPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(SchedPolicy::Auto),
        "spin" => Some(SchedPolicy::Spin),
        "yield" => Some(SchedPolicy::Yield),
        "blocking_sync" | "blocking-sync" | "blocking" => Some(SchedPolicy::BlockingSync),
        _ => None,
    }
}

/// Global configuration read from the environment on first use.
pub static RUNTIME_CONFIG: Lazy<Arc<RuntimeConfig>> =
    Lazy::new(|| Arc::new(RuntimeConfig::from_env()));

/// Get the process-wide runtime configuration.
pub fn runtime_config() -> &'static RuntimeConfig {
    &RUNTIME_CONFIG
}

/// Builder for creating a custom runtime configuration.
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// Restrict the runtime to these platforms.
    pub fn platforms<I: IntoIterator<Item = Platform>>(mut self, platforms: I) -> Self {
        self.config.platforms = platforms.into_iter().collect();
        self
    }

    /// Set the default context flags.
    pub fn default_flags(mut self, flags: CtxFlags) -> Self {
        self.config.default_flags = flags;
        self
    }

    /// Replace the library candidates of one platform.
    pub fn libraries(mut self, platform: Platform, libraries: LibrarySet) -> Self {
        match platform {
            Platform::Cuda => self.config.cuda = libraries,
            Platform::Rocm => self.config.rocm = libraries,
        }
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
