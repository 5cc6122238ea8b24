//! blexfer CLI configuration
//!
//! A TOML file mirrors [`BleConfig`]; every key is optional:
//!
//! ```toml
//! [ble]
//! adapter_index = 0
//! notification_queue_depth = 8
//!
//! [ble.central.signal_window]
//! min = -35
//! max = -15
//!
//! [ble.peripheral]
//! local_name = "blexfer"
//! ```

use std::path::Path;

use blexfer_ble::BleConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Complete configuration for the CLI application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Adapter and session settings
    pub ble: BleConfig,
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        debug!("Read {} bytes of configuration", contents.len());
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.ble.central.validate()?;
        self.ble.peripheral.validate()?;
        Ok(())
    }
}
