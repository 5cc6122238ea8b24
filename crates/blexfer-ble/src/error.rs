//! Error types for the BLE adapters

use blexfer_core::TransportFault;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE adapters
#[derive(Error, Debug)]
pub enum BleError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("No BLE adapter at index {index} ({available} available)")]
    AdapterIndexOutOfRange { index: usize, available: usize },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Peer not found: {peer}")]
    PeerNotFound { peer: String },

    #[error("Peer not connected")]
    PeerNotConnected,

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: String },

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("Failed to register GATT service: {0}")]
    GattRegistrationFailed(String),

    #[error("Failed to start advertising: {0}")]
    AdvertisingFailed(String),

    #[error("BLE peripheral role not supported on this platform")]
    PeripheralUnsupported,

    #[error("BLE error: {0}")]
    Btleplug(#[from] btleplug::Error),

    #[cfg(target_os = "linux")]
    #[error("BlueZ error: {0}")]
    Bluez(#[from] bluer::Error),
}

/// Result type for BLE adapter operations
pub type Result<T> = std::result::Result<T, BleError>;

impl From<BleError> for TransportFault {
    fn from(err: BleError) -> Self {
        TransportFault::new(err.to_string())
    }
}
