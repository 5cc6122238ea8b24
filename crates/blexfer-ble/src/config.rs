//! BLE adapter configuration

use std::time::Duration;

use blexfer_core::{CentralConfig, PeripheralConfig};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE adapters
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Index of the local adapter to use, in the order the OS lists them
    pub adapter_index: usize,
    /// Maximum time to wait for a connection, in seconds
    pub connection_timeout_secs: u64,
    /// Notifications the peripheral buffers before refusing sends
    pub notification_queue_depth: usize,
    /// Consumer session settings
    pub central: CentralConfig,
    /// Producer session settings
    pub peripheral: PeripheralConfig,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            connection_timeout_secs: 10,
            notification_queue_depth: 8,
            central: CentralConfig::default(),
            peripheral: PeripheralConfig::default(),
        }
    }
}

impl BleConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the local adapter
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the notification queue depth
    pub fn with_notification_queue_depth(mut self, depth: usize) -> Self {
        self.notification_queue_depth = depth;
        self
    }

    /// Set consumer session settings
    pub fn with_central(mut self, central: CentralConfig) -> Self {
        self.central = central;
        self
    }

    /// Set producer session settings
    pub fn with_peripheral(mut self, peripheral: PeripheralConfig) -> Self {
        self.peripheral = peripheral;
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}
