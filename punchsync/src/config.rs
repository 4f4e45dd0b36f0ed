//! Configuration
//!
//! ```toml
//! [sync]
//! sweep_interval_secs = 300
//! connect_timeout_secs = 5
//! write_timeout_secs = 5
//! ingest_queue_capacity = 1024
//!
//! [[devices]]
//! id = "D1"
//! address = "10.0.0.21"
//! port = 4370
//!
//! [employees]
//! U7 = "emp-42"
//! ```
//!
//! Environment variables take precedence over the file:
//! `PUNCHSYNC_SWEEP_INTERVAL_SECS`, `PUNCHSYNC_CONNECT_TIMEOUT_SECS`,
//! `PUNCHSYNC_WRITE_TIMEOUT_SECS`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use punchsync_core::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_SWEEP_INTERVAL, DEFAULT_WRITE_TIMEOUT,
};
use punchsync_types::{DeviceDescriptor, Employee};

use crate::directory::{InMemoryEmployeeDirectory, StaticDeviceDirectory};
use crate::error::{Error, Result};

/// Default capacity of the ingestion queue
pub const DEFAULT_INGEST_QUEUE_CAPACITY: usize = 1024;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,

    /// Device user id -> employee id
    #[serde(default)]
    pub employees: BTreeMap<String, String>,
}

/// Engine timing and queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between fleet sweeps (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Connection timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Command write timeout (seconds)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Decoded punches buffered ahead of reconciliation
    #[serde(default = "default_ingest_queue_capacity")]
    pub ingest_queue_capacity: usize,
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT
}

fn default_ingest_queue_capacity() -> usize {
    DEFAULT_INGEST_QUEUE_CAPACITY
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            sweep_interval_secs: default_sweep_interval(),
            connect_timeout_secs: default_connect_timeout(),
            write_timeout_secs: default_write_timeout(),
            ingest_queue_capacity: default_ingest_queue_capacity(),
        }
    }
}

/// Runtime form of [`SyncSettings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub sweep_interval: Duration,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub ingest_queue_capacity: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        SyncSettings::default().options()
    }
}

impl SyncSettings {
    pub fn options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            ingest_queue_capacity: self.ingest_queue_capacity,
        }
    }
}

impl SyncConfig {
    /// Load from a TOML file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());

        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let settings = &mut self.sync;
        override_u64(&lookup, "PUNCHSYNC_SWEEP_INTERVAL_SECS", &mut settings.sweep_interval_secs);
        override_u64(&lookup, "PUNCHSYNC_CONNECT_TIMEOUT_SECS", &mut settings.connect_timeout_secs);
        override_u64(&lookup, "PUNCHSYNC_WRITE_TIMEOUT_SECS", &mut settings.write_timeout_secs);
    }

    pub fn validate(&self) -> Result<()> {
        let settings = &self.sync;
        if settings.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be greater than 0".into()));
        }
        if settings.connect_timeout_secs == 0 || settings.write_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be greater than 0".into()));
        }
        if settings.ingest_queue_capacity == 0 {
            return Err(Error::Config("ingest_queue_capacity must be greater than 0".into()));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !seen.insert(device.id.as_str()) {
                return Err(Error::Config(format!("duplicate device id {}", device.id)));
            }
        }

        Ok(())
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.sync.options()
    }

    pub fn device_directory(&self) -> StaticDeviceDirectory {
        StaticDeviceDirectory::new(self.devices.clone())
    }

    pub fn employee_directory(&self) -> InMemoryEmployeeDirectory {
        self.employees
            .iter()
            .map(|(device_user_id, employee_id)| {
                (device_user_id.clone(), Employee::new(employee_id.clone()))
            })
            .collect()
    }
}

fn override_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut u64) {
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse() {
        Ok(value) => {
            debug!("{} overrides config: {}", key, value);
            *target = value;
        }
        Err(_) => warn!("Ignoring {}: {:?} is not a number", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[sync]
sweep_interval_secs = 60

[[devices]]
id = "D1"
address = "10.0.0.21"

[[devices]]
id = "D2"
address = "10.0.0.22"
port = 5005

[employees]
U7 = "emp-42"
"#;

    #[test]
    fn test_parse_sample() {
        let config = SyncConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.sync.sweep_interval_secs, 60);
        assert_eq!(config.sync.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.devices[0], DeviceDescriptor::new("D1", "10.0.0.21", 4370));
        assert_eq!(config.devices[1].port, 5005);
        assert_eq!(config.employee_directory().len(), 1);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SyncConfig::from_toml_str("").unwrap();
        let options = config.options();

        assert_eq!(options.sweep_interval, Duration::from_secs(300));
        assert_eq!(options, CoordinatorOptions::default());
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let mut config = SyncConfig::from_toml_str(SAMPLE).unwrap();
        config.devices[1].id = "D1".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_device_rejected() {
        let mut config = SyncConfig::from_toml_str(SAMPLE).unwrap();
        config.devices[0].port = 0;
        assert!(matches!(config.validate(), Err(Error::Types(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = SyncConfig::default();
        config.sync.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = SyncConfig::from_toml_str(SAMPLE).unwrap();
        config.apply_overrides(|key| match key {
            "PUNCHSYNC_SWEEP_INTERVAL_SECS" => Some("15".to_string()),
            "PUNCHSYNC_CONNECT_TIMEOUT_SECS" => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(config.sync.sweep_interval_secs, 15);
        assert_eq!(config.sync.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(SyncConfig::from_toml_str("[sync"), Err(Error::Toml(_))));
    }
}
