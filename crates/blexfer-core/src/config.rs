//! Session configuration

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// ----------------------------------------------------------------------------
// Signal Strength Window
// ----------------------------------------------------------------------------

/// Accepted RSSI band for discovered peers, inclusive on both ends
///
/// Readings above `max` are treated as a saturation or self-detection artifact,
/// readings below `min` as a peer too far away to hold a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalStrengthWindow {
    pub min: i16,
    pub max: i16,
}

impl Default for SignalStrengthWindow {
    fn default() -> Self {
        Self { min: -35, max: -15 }
    }
}

impl SignalStrengthWindow {
    pub fn new(min: i16, max: i16) -> Self {
        Self { min, max }
    }

    pub fn accepts(&self, rssi: i16) -> bool {
        rssi >= self.min && rssi <= self.max
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvalidSignalWindow {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Central Configuration
// ----------------------------------------------------------------------------

/// Configuration for the consumer role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralConfig {
    /// RSSI band a peer must fall in before we connect
    pub signal_window: SignalStrengthWindow,
    /// Go back to scanning after a completed transfer
    pub rescan_on_complete: bool,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            signal_window: SignalStrengthWindow::default(),
            rescan_on_complete: true,
        }
    }
}

impl CentralConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the accepted RSSI band
    pub fn with_signal_window(mut self, min: i16, max: i16) -> Self {
        self.signal_window = SignalStrengthWindow::new(min, max);
        self
    }

    /// Enable or disable scanning again after a completed transfer
    pub fn with_rescan_on_complete(mut self, enabled: bool) -> Self {
        self.rescan_on_complete = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signal_window.validate()
    }
}

// ----------------------------------------------------------------------------
// Peripheral Configuration
// ----------------------------------------------------------------------------

/// Configuration for the producer role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Local name put in the advertisement where the stack supports it
    pub local_name: String,
    /// Start advertising as soon as the adapter is ready
    pub advertise_on_ready: bool,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            local_name: "blexfer".to_string(),
            advertise_on_ready: false,
        }
    }
}

impl PeripheralConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised local name
    pub fn with_local_name(mut self, name: String) -> Self {
        self.local_name = name;
        self
    }

    /// Enable or disable advertising on adapter readiness
    pub fn with_advertise_on_ready(mut self, enabled: bool) -> Self {
        self.advertise_on_ready = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_name.trim().is_empty() {
            return Err(ConfigError::EmptyLocalName);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_bounds_are_inclusive() {
        let window = SignalStrengthWindow::default();
        assert!(window.accepts(-35));
        assert!(window.accepts(-22));
        assert!(window.accepts(-15));
        assert!(!window.accepts(-14));
        assert!(!window.accepts(-36));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let config = CentralConfig::new().with_signal_window(-10, -40);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidSignalWindow { min: -10, max: -40 })
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CentralConfig = toml::from_str("rescan_on_complete = false").unwrap();
        assert!(!config.rescan_on_complete);
        assert_eq!(config.signal_window, SignalStrengthWindow::default());
    }

    #[test]
    fn test_blank_local_name_rejected() {
        let config = PeripheralConfig::new().with_local_name("  ".to_string());
        assert_eq!(config.validate(), Err(ConfigError::EmptyLocalName));
    }
}
