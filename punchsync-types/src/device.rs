//! Device descriptor structures

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Standard port of networked punch-clock terminals
pub const DEFAULT_DEVICE_PORT: u16 = 4370;

/// Network location of one punch-clock terminal
///
/// Supplied by the device directory and read-only for the whole sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Unique device identifier
    pub id: String,

    /// Host name or IP address
    pub address: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_DEVICE_PORT
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
        }
    }

    /// Check that the descriptor can be dialed
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation("device id must not be empty".into()));
        }
        if self.address.trim().is_empty() {
            return Err(Error::Validation(format!(
                "device {} has an empty address",
                self.id
            )));
        }
        if self.port == 0 {
            return Err(Error::Validation(format!("device {} has port 0", self.id)));
        }
        Ok(())
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device[{} @ {}:{}]", self.id, self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(DeviceDescriptor::new("D1", "10.0.0.21", 4370).validate().is_ok());
        assert!(DeviceDescriptor::new(" ", "10.0.0.21", 4370).validate().is_err());
        assert!(DeviceDescriptor::new("D1", "", 4370).validate().is_err());
        assert!(DeviceDescriptor::new("D1", "10.0.0.21", 0).validate().is_err());
    }

    #[test]
    fn test_display() {
        let device = DeviceDescriptor::new("D1", "10.0.0.21", 4370);
        assert_eq!(device.to_string(), "Device[D1 @ 10.0.0.21:4370]");
    }
}
