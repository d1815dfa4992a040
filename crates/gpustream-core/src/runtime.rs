//! Platform dispatch table.
//!
//! A [`Runtime`] holds one slot per [`Platform`]. Each slot owns either a
//! ready driver or a loader that produces one on first use, so a machine with
//! only one vendor stack never touches the other vendor's libraries. Load
//! results, failures included, are cached for the lifetime of the runtime.

use crate::config::RuntimeConfig;
use crate::device::{self, Device};
use crate::driver::Driver;
use crate::error::{Error, ErrorKind, Result};
use crate::platform::Platform;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Produces the driver of one platform from the runtime configuration.
pub type DriverLoader = Box<dyn Fn(&RuntimeConfig) -> Result<Arc<dyn Driver>> + Send + Sync>;

struct Slot {
    loader: Option<DriverLoader>,
    driver: OnceCell<Result<Arc<dyn Driver>>>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            loader: None,
            driver: OnceCell::new(),
        }
    }
}

/// Routes platform-tagged calls to the driver of that platform.
pub struct Runtime {
    config: RuntimeConfig,
    slots: [Slot; Platform::COUNT],
}

impl Runtime {
    /// Starts building a runtime with the default configuration and no
    /// drivers.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder {
            config: RuntimeConfig::default(),
            slots: std::array::from_fn(|_| Slot::empty()),
        }
    }

    /// Configuration the runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Driver of `platform`, loading it on first use.
    pub fn driver(&self, platform: Platform) -> Result<Arc<dyn Driver>> {
        if !self.config.is_enabled(platform) {
            return Err(Error::backend_unavailable("platform disabled by configuration").on(platform));
        }

        let slot = &self.slots[platform.index()];
        slot.driver
            .get_or_init(|| {
                let loaded = match &slot.loader {
                    Some(loader) => loader(&self.config),
                    None => Err(Error::backend_unavailable("no driver registered").on(platform)),
                };
                match &loaded {
                    Ok(_) => info!(%platform, "loaded driver"),
                    Err(err) => info!(%platform, error = %err, "driver not available"),
                }
                loaded
            })
            .clone()
    }

    /// Initializes `platform`. Repeated calls are harmless.
    pub fn init(&self, platform: Platform) -> Result<()> {
        let driver = self.driver(platform)?;
        driver.init().map_err(|status| {
            Error::from_status(status, ErrorKind::BackendUnavailable, "driver initialization failed")
                .on(platform)
        })?;
        debug!(%platform, "initialized");
        Ok(())
    }

    /// Number of devices visible on `platform`. Zero is a valid answer.
    pub fn device_get_count(&self, platform: Platform) -> Result<i32> {
        device::device_count(&self.driver(platform)?)
    }

    /// Device `index` of `platform`.
    ///
    /// Fails with `NoDevice` when `index` is negative or not below the
    /// device count.
    pub fn device_get(&self, platform: Platform, index: i32) -> Result<Device> {
        device::device_get(&self.driver(platform)?, index)
    }

    /// Every device of `platform`, in ordinal order.
    pub fn devices(&self, platform: Platform) -> Result<Vec<Device>> {
        let driver = self.driver(platform)?;
        let count = device::device_count(&driver)?;
        (0..count).map(|i| device::device_get(&driver, i)).collect()
    }

    /// Whether `platform` loads and initializes.
    pub fn is_available(&self, platform: Platform) -> bool {
        self.init(platform).is_ok()
    }

    /// Platforms that load and initialize, in configuration order.
    pub fn available_platforms(&self) -> Vec<Platform> {
        self.config
            .platforms
            .iter()
            .copied()
            .filter(|p| self.is_available(*p))
            .collect()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded: Vec<Platform> = Platform::ALL
            .iter()
            .copied()
            .filter(|p| matches!(self.slots[p.index()].driver.get(), Some(Ok(_))))
            .collect();
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("loaded", &loaded)
            .finish()
    }
}

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    slots: [Slot; Platform::COUNT],
}

impl RuntimeBuilder {
    /// Replaces the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an already constructed driver for its platform.
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        let slot = &mut self.slots[driver.platform().index()];
        slot.loader = None;
        slot.driver = OnceCell::with_value(Ok(driver));
        self
    }

    /// Registers a loader run the first time `platform` is used.
    pub fn loader<F>(mut self, platform: Platform, loader: F) -> Self
    where
        F: Fn(&RuntimeConfig) -> Result<Arc<dyn Driver>> + Send + Sync + 'static,
    {
        let slot = &mut self.slots[platform.index()];
        slot.loader = Some(Box::new(loader));
        slot.driver = OnceCell::new();
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> Runtime {
        Runtime {
            config: self.config,
            slots: self.slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfigBuilder;
    use crate::driver::simulated::SimulatedDriver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_init_is_idempotent() {
        let sim = Arc::new(SimulatedDriver::builder(Platform::Cuda).devices(2).build());
        let runtime = Runtime::builder().driver(sim.clone()).build();

        runtime.init(Platform::Cuda).unwrap();
        runtime.init(Platform::Cuda).unwrap();
        assert_eq!(sim.init_calls(), 2);
        assert_eq!(runtime.device_get_count(Platform::Cuda).unwrap(), 2);
    }

    #[test]
    fn test_unregistered_platform_is_unavailable() {
        let runtime = Runtime::builder().build();
        let err = runtime.init(Platform::Rocm).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(err.platform(), Some(Platform::Rocm));
        assert!(!runtime.is_available(Platform::Rocm));
    }

    #[test]
    fn test_failing_vendor_init() {
        let sim = Arc::new(SimulatedDriver::builder(Platform::Rocm).unavailable().build());
        let runtime = Runtime::builder().driver(sim).build();

        let err = runtime.init(Platform::Rocm).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(err.status().map(|s| s.code), Some(35));
    }

    #[test]
    fn test_loader_runs_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let runtime = Runtime::builder()
            .loader(Platform::Cuda, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::backend_unavailable("libcuda.so.1 not found"))
            })
            .build();

        assert!(runtime.init(Platform::Cuda).is_err());
        assert!(runtime.device_get_count(Platform::Cuda).is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_platform_skips_loader() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let runtime = Runtime::builder()
            .config(RuntimeConfigBuilder::new().platforms([Platform::Rocm]).build())
            .loader(Platform::Cuda, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(SimulatedDriver::builder(Platform::Cuda).build()) as Arc<dyn Driver>)
            })
            .build();

        assert_eq!(
            runtime.init(Platform::Cuda).unwrap_err().kind(),
            ErrorKind::BackendUnavailable
        );
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_devices_and_availability() {
        let runtime = Runtime::builder()
            .driver(Arc::new(SimulatedDriver::builder(Platform::Cuda).devices(3).build()))
            .build();

        assert_eq!(runtime.available_platforms(), vec![Platform::Cuda]);
        let devices = runtime.devices(Platform::Cuda).unwrap();
        let ordinals: Vec<i32> = devices.iter().map(Device::ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(
            runtime.device_get(Platform::Cuda, 3).unwrap_err().kind(),
            ErrorKind::NoDevice
        );
    }
}
