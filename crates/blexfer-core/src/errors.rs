//! Error types for the blexfer protocol
//!
//! [`TransferError`] is the failure taxonomy a session reports to its
//! observer. None of these are fatal: the owning session recovers locally and
//! the error is surfaced for logging and telemetry only.

use std::fmt;

use crate::transport::PeerHandle;

// ----------------------------------------------------------------------------
// Transfer Errors
// ----------------------------------------------------------------------------

/// Which discovery step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStage {
    Service,
    Characteristic,
}

impl fmt::Display for DiscoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryStage::Service => f.write_str("services"),
            DiscoveryStage::Characteristic => f.write_str("characteristics"),
        }
    }
}

/// Failures reported by a session while a transfer is in progress
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("Failed to connect to peer {peer}: {reason}")]
    ConnectFailure { peer: PeerHandle, reason: String },

    #[error("Failed to discover {stage} on peer {peer}: {reason}")]
    DiscoveryFailure {
        peer: PeerHandle,
        stage: DiscoveryStage,
        reason: String,
    },

    #[error("Subscription failure on peer {peer}: {reason}")]
    SubscriptionFailure { peer: PeerHandle, reason: String },

    #[error("Value update from peer {peer} failed: {reason}")]
    ValueUpdateFailure { peer: PeerHandle, reason: String },

    #[error("Peer {peer} disconnected unexpectedly: {reason}")]
    UnexpectedDisconnect { peer: PeerHandle, reason: String },
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid signal strength window: min {min} is above max {max}")]
    InvalidSignalWindow { min: i16, max: i16 },

    #[error("Advertised local name must not be empty")]
    EmptyLocalName,
}

// ----------------------------------------------------------------------------
// Crate Error
// ----------------------------------------------------------------------------

/// Top-level error for blexfer-core operations
#[derive(Debug, thiserror::Error)]
pub enum BlexferError {
    /// Session driver channel closed
    #[error("Channel error: {message}")]
    Channel { message: String },
}

impl BlexferError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        BlexferError::Channel {
            message: message.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, BlexferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_transfer_error_names_its_peer() {
        let peer = PeerHandle::new("AA:BB:CC:DD:EE:FF");
        let reason = "gatt error".to_string();
        let errors = [
            TransferError::ConnectFailure {
                peer: peer.clone(),
                reason: reason.clone(),
            },
            TransferError::DiscoveryFailure {
                peer: peer.clone(),
                stage: DiscoveryStage::Characteristic,
                reason: reason.clone(),
            },
            TransferError::SubscriptionFailure {
                peer: peer.clone(),
                reason: reason.clone(),
            },
            TransferError::ValueUpdateFailure {
                peer: peer.clone(),
                reason: reason.clone(),
            },
            TransferError::UnexpectedDisconnect { peer, reason },
        ];

        for error in errors {
            assert!(error.to_string().contains("AA:BB:CC:DD:EE:FF"), "{error}");
        }
    }

    #[test]
    fn test_channel_error_message() {
        let error = BlexferError::channel_error("central driver stopped");
        assert_eq!(error.to_string(), "Channel error: central driver stopped");
    }
}
