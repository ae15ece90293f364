//! Device configuration

use core::fmt;

use dynmap_api::{Error, Result};
use dynmap_mm::RangeConfig;

/// Name the device registers under
pub const DEVICE_NAME: &str = "dynmmapdev";

/// Major/minor pair identifying the device node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNumber {
    /// Major number
    pub major: u32,
    /// Minor number
    pub minor: u32,
}

impl DeviceNumber {
    /// Create a device number
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for DeviceNumber {
    /// First major of the range reserved for dynamic assignment
    fn default() -> Self {
        Self::new(240, 0)
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device node name
    pub name: &'static str,
    /// Device number
    pub number: DeviceNumber,
    /// Geometry of the range each open file maps
    pub range: RangeConfig,
}

impl DeviceConfig {
    /// Use a different range limit
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.range = RangeConfig::new(limit);
        self
    }

    /// Use a different device number
    pub const fn with_number(mut self, number: DeviceNumber) -> Self {
        self.number = number;
        self
    }

    /// Check the configuration before registering
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidArgument("device name must not be empty"));
        }
        self.range.validate()
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEVICE_NAME,
            number: DeviceNumber::default(),
            range: RangeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynmap_api::{DEVICE_SIZE, PAGE_SIZE};

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.name, "dynmmapdev");
        assert_eq!(config.range.limit, DEVICE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_limit_rejected() {
        let config = DeviceConfig::default().with_limit(PAGE_SIZE / 2);
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_number_display() {
        let config = DeviceConfig::default().with_number(DeviceNumber::new(251, 3));
        assert_eq!(alloc::format!("{}", config.number), "251:3");
    }
}
