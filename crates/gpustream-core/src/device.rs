//! Device enumeration.
//!
//! Devices are owned by the vendor runtime; a [`Device`] is only a record of
//! which ordinal on which driver it refers to. Records are read-only and can
//! be shared freely across threads.

use crate::driver::{Driver, RawDevice};
use crate::error::{Error, ErrorKind, Result};
use crate::platform::Platform;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A physical accelerator visible under one platform.
#[derive(Clone)]
pub struct Device {
    ordinal: i32,
    raw: RawDevice,
    driver: Arc<dyn Driver>,
}

impl Device {
    /// Platform this device belongs to.
    pub fn platform(&self) -> Platform {
        self.driver.platform()
    }

    /// Ordinal used to look the device up.
    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    /// Vendor device id.
    pub fn as_raw(&self) -> RawDevice {
        self.raw
    }

    /// Device name as reported by the vendor.
    pub fn name(&self) -> Result<String> {
        self.driver.device_name(self.raw).map_err(|status| {
            Error::from_status(status, ErrorKind::NoDevice, "failed to query device name")
                .on(self.platform())
        })
    }

    /// Total device memory in bytes.
    pub fn total_memory(&self) -> Result<usize> {
        self.driver.device_total_mem(self.raw).map_err(|status| {
            Error::from_status(status, ErrorKind::NoDevice, "failed to query device memory")
                .on(self.platform())
        })
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal
            && self.raw == other.raw
            && std::ptr::addr_eq(Arc::as_ptr(&self.driver), Arc::as_ptr(&other.driver))
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("platform", &self.platform())
            .field("ordinal", &self.ordinal)
            .field("raw", &self.raw.0)
            .finish()
    }
}

/// Number of devices visible to `driver`. Zero is not an error.
///
/// Vendors report a host without GPUs as a "no device" status
/// (`CUDA_ERROR_NO_DEVICE`, `hipErrorNoDevice`); that counts as zero.
pub(crate) fn device_count(driver: &Arc<dyn Driver>) -> Result<i32> {
    let count = match driver.device_count() {
        Ok(count) => count,
        Err(status) if status.kind == Some(ErrorKind::NoDevice) => {
            debug!(platform = %driver.platform(), %status, "no devices installed");
            0
        }
        Err(status) => {
            return Err(Error::from_status(
                status,
                ErrorKind::BackendUnavailable,
                "failed to query device count",
            )
            .on(driver.platform()))
        }
    };
    debug!(platform = %driver.platform(), count, "queried device count");
    Ok(count)
}

/// Looks up device `index`, rejecting negative and out-of-range ordinals
/// before the vendor sees them.
pub(crate) fn device_get(driver: &Arc<dyn Driver>, index: i32) -> Result<Device> {
    let count = device_count(driver)?;
    if index < 0 || index >= count {
        return Err(Error::no_device(format!(
            "device ordinal {index} out of range (device count {count})"
        ))
        .on(driver.platform()));
    }

    let raw = driver.device_get(index).map_err(|status| {
        Error::from_status(status, ErrorKind::NoDevice, format!("failed to get device {index}"))
            .on(driver.platform())
    })?;

    Ok(Device {
        ordinal: index,
        raw,
        driver: Arc::clone(driver),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::simulated::SimulatedDriver;

    fn driver(devices: i32) -> Arc<dyn Driver> {
        let driver = SimulatedDriver::builder(Platform::Cuda).devices(devices).build();
        driver.init().unwrap();
        Arc::new(driver)
    }

    #[test]
    fn test_device_get_in_range() {
        let driver = driver(2);
        let device = device_get(&driver, 1).unwrap();
        assert_eq!(device.ordinal(), 1);
        assert_eq!(device.platform(), Platform::Cuda);
        assert!(device.name().unwrap().contains('1'));
        assert!(device.total_memory().unwrap() > 0);
    }

    #[test]
    fn test_device_get_out_of_range() {
        let driver = driver(2);
        assert_eq!(device_get(&driver, 2).unwrap_err().kind(), ErrorKind::NoDevice);
        assert_eq!(device_get(&driver, -1).unwrap_err().kind(), ErrorKind::NoDevice);
    }

    #[test]
    fn test_zero_devices_is_not_an_error() {
        let driver = driver(0);
        assert_eq!(device_count(&driver).unwrap(), 0);
        assert_eq!(device_get(&driver, 0).unwrap_err().kind(), ErrorKind::NoDevice);
    }

    #[test]
    fn test_no_device_status_counts_as_zero() {
        for platform in Platform::ALL {
            let driver = SimulatedDriver::builder(platform)
                .devices(0)
                .no_device_status()
                .build();
            driver.init().unwrap();
            let driver: Arc<dyn Driver> = Arc::new(driver);

            assert_eq!(device_count(&driver).unwrap(), 0);
            let err = device_get(&driver, 0).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NoDevice);
            assert_eq!(err.platform(), Some(platform));
        }
    }

    #[test]
    fn test_count_failure_other_than_no_device_is_reported() {
        let driver: Arc<dyn Driver> = Arc::new(SimulatedDriver::builder(Platform::Rocm).build());
        let err = device_count(&driver).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(err.status().map(|s| s.name), Some("NOT_INITIALIZED"));
    }

    #[test]
    fn test_device_equality_is_per_driver() {
        let a = driver(1);
        let b = driver(1);
        assert_eq!(device_get(&a, 0).unwrap(), device_get(&a, 0).unwrap());
        assert_ne!(device_get(&a, 0).unwrap(), device_get(&b, 0).unwrap());
    }
}
