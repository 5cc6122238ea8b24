//! In-memory transport pairing one central with one peripheral
//!
//! Commands are turned into the events a BLE stack would produce, delivered
//! over unbounded channels. Notifications go through a bounded
//! [`NotifyQueue`] drained by [`LoopbackRadio::run`], so a slow consumer
//! produces the same refused-send / ready-to-send-more cycle as real hardware.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::queue::NotifyQueue;
use crate::transport::{
    CentralEvent, CentralTransport, CharacteristicHandle, GattService, PeerHandle,
    PeripheralEvent, PeripheralTransport, ServiceHandle, TransportFault,
};

/// Signal strength reported for the loopback peer, inside the default window
pub const LOOPBACK_RSSI: i16 = -22;

const CENTRAL_ID: &str = "loopback:central";
const PERIPHERAL_ID: &str = "loopback:peripheral";

// ----------------------------------------------------------------------------
// Shared Link
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LinkState {
    registered: Option<GattService>,
    advertising: bool,
    scanning: bool,
    connected: bool,
    subscribed: Option<CharacteristicHandle>,
}

#[derive(Debug)]
struct Link {
    state: Mutex<LinkState>,
    queue: NotifyQueue,
    central_tx: mpsc::UnboundedSender<CentralEvent>,
    peripheral_tx: mpsc::UnboundedSender<PeripheralEvent>,
    central_id: PeerHandle,
    peripheral_id: PeerHandle,
}

impl Link {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn to_central(&self, event: CentralEvent) {
        trace!("loopback -> central: {}", event.name());
        // The receiving session may already be gone
        let _ = self.central_tx.send(event);
    }

    fn to_peripheral(&self, event: PeripheralEvent) {
        let _ = self.peripheral_tx.send(event);
    }

    /// Report the peripheral to a scanning, unconnected central
    fn announce(&self, state: &LinkState) {
        let visible = state.scanning
            && state.advertising
            && !state.connected
            && state.registered.is_some();
        if visible {
            self.to_central(CentralEvent::PeerDiscovered {
                peer: self.peripheral_id.clone(),
                rssi: LOOPBACK_RSSI,
            });
        }
    }

    /// Drop the subscription, if any, and tell both sides
    fn end_subscription(&self, state: &mut LinkState) {
        if let Some(characteristic) = state.subscribed.take() {
            self.queue.clear();
            self.to_central(CentralEvent::SubscriptionChanged {
                peer: self.peripheral_id.clone(),
                characteristic: characteristic.clone(),
                is_active: false,
                error: None,
            });
            self.to_peripheral(PeripheralEvent::Unsubscribed {
                peer: self.central_id.clone(),
                characteristic,
            });
        }
    }
}

// ----------------------------------------------------------------------------
// Central Side
// ----------------------------------------------------------------------------

/// Central half of a loopback pair
#[derive(Debug)]
pub struct LoopbackCentral {
    link: Arc<Link>,
}

impl LoopbackCentral {
    fn not_connected(&self) -> TransportFault {
        TransportFault::new("not connected")
    }
}

impl CentralTransport for LoopbackCentral {
    fn scan(&mut self, service_filter: Uuid) {
        let mut state = self.link.lock();
        state.scanning = true;
        let advertised = state
            .registered
            .as_ref()
            .is_some_and(|service| service.uuid == service_filter);
        if advertised {
            self.link.announce(&state);
        }
    }

    fn stop_scan(&mut self) {
        self.link.lock().scanning = false;
    }

    fn connect(&mut self, peer: &PeerHandle) {
        let mut state = self.link.lock();
        if *peer != self.link.peripheral_id || state.registered.is_none() {
            self.link.to_central(CentralEvent::ConnectFailed {
                peer: peer.clone(),
                error: TransportFault::new("unknown peer"),
            });
            return;
        }
        state.connected = true;
        debug!("loopback: connected");
        self.link.to_central(CentralEvent::Connected { peer: peer.clone() });
    }

    fn disconnect(&mut self, peer: &PeerHandle) {
        let mut state = self.link.lock();
        self.link.end_subscription(&mut state);
        state.connected = false;
        debug!("loopback: disconnected");
        self.link.to_central(CentralEvent::Disconnected {
            peer: peer.clone(),
            error: None,
        });
    }

    fn discover_services(&mut self, peer: &PeerHandle, service_filter: Uuid) {
        let state = self.link.lock();
        let (services, error) = if state.connected {
            let services = state
                .registered
                .iter()
                .filter(|service| service.uuid == service_filter)
                .map(|service| ServiceHandle { uuid: service.uuid })
                .collect();
            (services, None)
        } else {
            (Vec::new(), Some(self.not_connected()))
        };
        self.link.to_central(CentralEvent::ServicesDiscovered {
            peer: peer.clone(),
            services,
            error,
        });
    }

    fn discover_characteristics(
        &mut self,
        peer: &PeerHandle,
        service: &ServiceHandle,
        characteristic_filter: Uuid,
    ) {
        let state = self.link.lock();
        let (characteristics, error) = if state.connected {
            let characteristics = state
                .registered
                .iter()
                .filter(|registered| registered.uuid == service.uuid)
                .flat_map(|registered| registered.characteristics.iter())
                .filter(|characteristic| characteristic.uuid == characteristic_filter)
                .cloned()
                .collect();
            (characteristics, None)
        } else {
            (Vec::new(), Some(self.not_connected()))
        };
        self.link.to_central(CentralEvent::CharacteristicsDiscovered {
            peer: peer.clone(),
            service: service.clone(),
            characteristics,
            error,
        });
    }

    fn subscribe(&mut self, peer: &PeerHandle, characteristic: &CharacteristicHandle) {
        let mut state = self.link.lock();
        let served = state
            .registered
            .as_ref()
            .is_some_and(|service| service.characteristics.contains(characteristic));
        if !state.connected || !served {
            self.link.to_central(CentralEvent::SubscriptionChanged {
                peer: peer.clone(),
                characteristic: characteristic.clone(),
                is_active: false,
                error: Some(TransportFault::new("characteristic not available")),
            });
            return;
        }
        state.subscribed = Some(characteristic.clone());
        self.link.to_central(CentralEvent::SubscriptionChanged {
            peer: peer.clone(),
            characteristic: characteristic.clone(),
            is_active: true,
            error: None,
        });
        self.link.to_peripheral(PeripheralEvent::Subscribed {
            peer: self.link.central_id.clone(),
            characteristic: characteristic.clone(),
        });
    }

    fn unsubscribe(&mut self, _peer: &PeerHandle, _characteristic: &CharacteristicHandle) {
        let mut state = self.link.lock();
        self.link.end_subscription(&mut state);
    }
}

// ----------------------------------------------------------------------------
// Peripheral Side
// ----------------------------------------------------------------------------

/// Peripheral half of a loopback pair
#[derive(Debug)]
pub struct LoopbackPeripheral {
    link: Arc<Link>,
}

impl PeripheralTransport for LoopbackPeripheral {
    fn register_service(&mut self, service: &GattService) {
        self.link.lock().registered = Some(service.clone());
    }

    fn advertise(&mut self, _service_id: Uuid) {
        let mut state = self.link.lock();
        state.advertising = true;
        self.link.announce(&state);
    }

    fn stop_advertise(&mut self) {
        self.link.lock().advertising = false;
    }

    fn send(&mut self, characteristic: &CharacteristicHandle, value: &[u8]) -> bool {
        let state = self.link.lock();
        if state.subscribed.as_ref() != Some(characteristic) {
            // Nobody listening; the value is dropped like an unacknowledged notification
            return true;
        }
        self.link.queue.push(value.to_vec())
    }
}

impl Drop for LoopbackPeripheral {
    fn drop(&mut self) {
        self.link.queue.close();
    }
}

// ----------------------------------------------------------------------------
// Radio and Power
// ----------------------------------------------------------------------------

/// Delivers queued notifications to the central
#[derive(Debug)]
pub struct LoopbackRadio {
    link: Arc<Link>,
}

impl LoopbackRadio {
    /// Run until the peripheral half is dropped
    pub async fn run(self) {
        while let Some((value, ready)) = self.link.queue.pop().await {
            let subscribed = self.link.lock().subscribed.clone();
            if let Some(characteristic) = subscribed {
                self.link.to_central(CentralEvent::ValueUpdated {
                    peer: self.link.peripheral_id.clone(),
                    characteristic,
                    value,
                    error: None,
                });
            }
            if ready {
                self.link.to_peripheral(PeripheralEvent::ReadyToSendMore);
            }
        }
        debug!("loopback radio stopped");
    }
}

/// Adapter power switch for both halves
#[derive(Debug, Clone)]
pub struct LoopbackPower {
    link: Arc<Link>,
}

impl LoopbackPower {
    pub fn power_on(&self) {
        self.link.to_central(CentralEvent::AdapterReady);
        self.link.to_peripheral(PeripheralEvent::AdapterReady);
    }

    /// Drop every link and report the adapter gone on both sides
    pub fn power_off(&self) {
        {
            let mut state = self.link.lock();
            state.subscribed = None;
            state.connected = false;
            state.advertising = false;
            state.scanning = false;
            state.registered = None;
            self.link.queue.clear();
        }
        self.link.to_central(CentralEvent::AdapterUnavailable);
        self.link.to_peripheral(PeripheralEvent::AdapterUnavailable);
    }
}

/// Both halves of a loopback link plus their event streams
#[derive(Debug)]
pub struct LoopbackPair {
    pub central: LoopbackCentral,
    pub peripheral: LoopbackPeripheral,
    pub central_events: mpsc::UnboundedReceiver<CentralEvent>,
    pub peripheral_events: mpsc::UnboundedReceiver<PeripheralEvent>,
    pub radio: LoopbackRadio,
    pub power: LoopbackPower,
}

/// Create a linked central/peripheral pair whose notification queue holds
/// `queue_depth` values
pub fn pair(queue_depth: usize) -> LoopbackPair {
    let (central_tx, central_events) = mpsc::unbounded_channel();
    let (peripheral_tx, peripheral_events) = mpsc::unbounded_channel();
    let link = Arc::new(Link {
        state: Mutex::new(LinkState::default()),
        queue: NotifyQueue::new(queue_depth),
        central_tx,
        peripheral_tx,
        central_id: PeerHandle::new(CENTRAL_ID),
        peripheral_id: PeerHandle::new(PERIPHERAL_ID),
    });

    LoopbackPair {
        central: LoopbackCentral {
            link: Arc::clone(&link),
        },
        peripheral: LoopbackPeripheral {
            link: Arc::clone(&link),
        },
        central_events,
        peripheral_events,
        radio: LoopbackRadio {
            link: Arc::clone(&link),
        },
        power: LoopbackPower { link },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TRANSFER_IDENTITY;

    #[test]
    fn test_advertising_peer_is_discovered() {
        let mut pair = pair(4);
        pair.peripheral
            .register_service(&GattService::from_identity(&TRANSFER_IDENTITY));
        pair.peripheral.advertise(TRANSFER_IDENTITY.service_id);
        pair.central.scan(TRANSFER_IDENTITY.service_id);

        assert_eq!(
            pair.central_events.try_recv().ok(),
            Some(CentralEvent::PeerDiscovered {
                peer: PeerHandle::new(PERIPHERAL_ID),
                rssi: LOOPBACK_RSSI,
            })
        );
    }

    #[test]
    fn test_send_refused_when_queue_full() {
        let mut pair = pair(1);
        let characteristic = CharacteristicHandle::transfer();
        pair.peripheral
            .register_service(&GattService::from_identity(&TRANSFER_IDENTITY));
        let peer = PeerHandle::new(PERIPHERAL_ID);
        pair.central.connect(&peer);
        pair.central.subscribe(&peer, &characteristic);

        assert!(pair.peripheral.send(&characteristic, b"one"));
        assert!(!pair.peripheral.send(&characteristic, b"two"));
    }

    #[test]
    fn test_disconnect_unsubscribes_peripheral() {
        let mut pair = pair(4);
        let characteristic = CharacteristicHandle::transfer();
        pair.peripheral
            .register_service(&GattService::from_identity(&TRANSFER_IDENTITY));
        let peer = PeerHandle::new(PERIPHERAL_ID);
        pair.central.connect(&peer);
        pair.central.subscribe(&peer, &characteristic);
        pair.central.disconnect(&peer);

        let events: Vec<_> = std::iter::from_fn(|| pair.peripheral_events.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                PeripheralEvent::Subscribed {
                    peer: PeerHandle::new(CENTRAL_ID),
                    characteristic: characteristic.clone(),
                },
                PeripheralEvent::Unsubscribed {
                    peer: PeerHandle::new(CENTRAL_ID),
                    characteristic,
                },
            ]
        );
    }
}
