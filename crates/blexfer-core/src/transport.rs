//! Transport contract between the sessions and a BLE stack
//!
//! Sessions issue commands through [`CentralTransport`] / [`PeripheralTransport`]
//! and react to [`CentralEvent`] / [`PeripheralEvent`] values delivered later.
//! Commands must not block; an adapter that talks to real hardware queues the
//! work and reports the outcome as an event.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::protocol::{ServiceIdentity, TRANSFER_IDENTITY};

// ----------------------------------------------------------------------------
// Handles
// ----------------------------------------------------------------------------

/// Opaque, transport-assigned reference to a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(Arc<str>);

impl PeerHandle {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A service found on a connected peer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    pub uuid: Uuid,
}

/// A characteristic found on a connected peer, or served locally
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    pub service: Uuid,
    pub uuid: Uuid,
}

impl CharacteristicHandle {
    /// The transfer characteristic as described by the protocol identity
    pub fn transfer() -> Self {
        Self {
            service: TRANSFER_IDENTITY.service_id,
            uuid: TRANSFER_IDENTITY.characteristic_id,
        }
    }
}

/// Local GATT service definition a peripheral registers with its stack
///
/// The transfer characteristic is notify-only with read permission; there is
/// no initial value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<CharacteristicHandle>,
}

impl GattService {
    pub fn from_identity(identity: &ServiceIdentity) -> Self {
        Self {
            uuid: identity.service_id,
            primary: true,
            characteristics: vec![CharacteristicHandle {
                service: identity.service_id,
                uuid: identity.characteristic_id,
            }],
        }
    }
}

/// Error reported by the transport alongside an event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct TransportFault {
    pub reason: String,
}

impl TransportFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Commands available to the consumer role
pub trait CentralTransport {
    /// Start reporting peers that advertise `service_filter`
    fn scan(&mut self, service_filter: Uuid);

    fn stop_scan(&mut self);

    fn connect(&mut self, peer: &PeerHandle);

    /// Tear down a connection or cancel a pending attempt; safe on an
    /// already-disconnected peer
    fn disconnect(&mut self, peer: &PeerHandle);

    fn discover_services(&mut self, peer: &PeerHandle, service_filter: Uuid);

    fn discover_characteristics(
        &mut self,
        peer: &PeerHandle,
        service: &ServiceHandle,
        characteristic_filter: Uuid,
    );

    fn subscribe(&mut self, peer: &PeerHandle, characteristic: &CharacteristicHandle);

    fn unsubscribe(&mut self, peer: &PeerHandle, characteristic: &CharacteristicHandle);
}

/// Commands available to the producer role
pub trait PeripheralTransport {
    fn register_service(&mut self, service: &GattService);

    /// Broadcast `service_id` and nothing else
    fn advertise(&mut self, service_id: Uuid);

    fn stop_advertise(&mut self);

    /// Offer one notification value to subscribers
    ///
    /// Returns `false` when the transport cannot take it right now. A
    /// [`PeripheralEvent::ReadyToSendMore`] follows once it can.
    fn send(&mut self, characteristic: &CharacteristicHandle, value: &[u8]) -> bool;
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Events delivered to the consumer role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    AdapterReady,
    AdapterUnavailable,
    PeerDiscovered {
        peer: PeerHandle,
        rssi: i16,
    },
    Connected {
        peer: PeerHandle,
    },
    ConnectFailed {
        peer: PeerHandle,
        error: TransportFault,
    },
    Disconnected {
        peer: PeerHandle,
        error: Option<TransportFault>,
    },
    ServicesDiscovered {
        peer: PeerHandle,
        services: Vec<ServiceHandle>,
        error: Option<TransportFault>,
    },
    CharacteristicsDiscovered {
        peer: PeerHandle,
        service: ServiceHandle,
        characteristics: Vec<CharacteristicHandle>,
        error: Option<TransportFault>,
    },
    ValueUpdated {
        peer: PeerHandle,
        characteristic: CharacteristicHandle,
        value: Vec<u8>,
        error: Option<TransportFault>,
    },
    SubscriptionChanged {
        peer: PeerHandle,
        characteristic: CharacteristicHandle,
        is_active: bool,
        error: Option<TransportFault>,
    },
}

/// Events delivered to the producer role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    AdapterReady,
    AdapterUnavailable,
    Subscribed {
        peer: PeerHandle,
        characteristic: CharacteristicHandle,
    },
    Unsubscribed {
        peer: PeerHandle,
        characteristic: CharacteristicHandle,
    },
    ReadyToSendMore,
}

impl CentralEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            CentralEvent::AdapterReady => "AdapterReady",
            CentralEvent::AdapterUnavailable => "AdapterUnavailable",
            CentralEvent::PeerDiscovered { .. } => "PeerDiscovered",
            CentralEvent::Connected { .. } => "Connected",
            CentralEvent::ConnectFailed { .. } => "ConnectFailed",
            CentralEvent::Disconnected { .. } => "Disconnected",
            CentralEvent::ServicesDiscovered { .. } => "ServicesDiscovered",
            CentralEvent::CharacteristicsDiscovered { .. } => "CharacteristicsDiscovered",
            CentralEvent::ValueUpdated { .. } => "ValueUpdated",
            CentralEvent::SubscriptionChanged { .. } => "SubscriptionChanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gatt_service_from_identity() {
        let service = GattService::from_identity(&TRANSFER_IDENTITY);
        assert!(service.primary);
        assert_eq!(service.uuid, TRANSFER_IDENTITY.service_id);
        assert_eq!(service.characteristics, vec![CharacteristicHandle::transfer()]);
    }

    #[test]
    fn test_peer_handle_equality_is_by_id() {
        assert_eq!(PeerHandle::new("AA:BB"), PeerHandle::new(String::from("AA:BB")));
        assert_ne!(PeerHandle::new("AA:BB"), PeerHandle::new("AA:BC"));
        assert_eq!(PeerHandle::new("AA:BB").to_string(), "AA:BB");
    }
}
