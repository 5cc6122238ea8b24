//! Connection management, GATT discovery and notification subscription
//!
//! Every operation resolves to the session event that reports its outcome,
//! error included, so the worker can forward results in issue order.

use std::time::Duration;

use blexfer_core::{
    CentralEvent as SessionEvent, CharacteristicHandle, PeerHandle, ServiceHandle, TransportFault,
};
use btleplug::api::{Characteristic, Peripheral as _};
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::BleError;
use crate::peer::BlePeer;

// ----------------------------------------------------------------------------
// Connection Management
// ----------------------------------------------------------------------------

/// Performs link-level operations on registry peers
pub(crate) struct BleConnection {
    connection_timeout: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl BleConnection {
    pub fn new(connection_timeout: Duration, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            connection_timeout,
            events,
        }
    }

    /// Connect to a peer, bounded by the configured timeout
    pub async fn connect(&self, peer: &mut BlePeer) -> SessionEvent {
        let handle = peer.handle.clone();
        if peer.is_connected() {
            return SessionEvent::Connected { peer: handle };
        }

        peer.mark_connecting();
        match timeout(self.connection_timeout, peer.peripheral.connect()).await {
            Ok(Ok(())) => {
                peer.mark_connected();
                info!("Connected to peer: {handle}");
                SessionEvent::Connected { peer: handle }
            }
            Ok(Err(e)) => {
                peer.mark_disconnected();
                error!("Failed to connect to peer {handle}: {e}");
                SessionEvent::ConnectFailed {
                    peer: handle,
                    error: BleError::from(e).into(),
                }
            }
            Err(_) => {
                peer.mark_disconnected();
                error!("Connection to peer {handle} timed out");
                // Abandon the pending attempt at the OS level too
                if let Err(e) = peer.peripheral.disconnect().await {
                    debug!("Cancelling connection to {handle}: {e}");
                }
                SessionEvent::ConnectFailed {
                    peer: handle,
                    error: BleError::ConnectionTimeout.into(),
                }
            }
        }
    }

    /// Disconnect from a peer; always confirmed with a `Disconnected` event
    pub async fn disconnect(&self, peer: &mut BlePeer) -> SessionEvent {
        let handle = peer.handle.clone();
        if peer.is_connected() {
            if let Err(e) = peer.peripheral.disconnect().await {
                error!("Failed to disconnect from peer {handle}: {e}");
            }
            info!("Disconnected from peer: {handle}");
        }
        peer.mark_disconnected();
        SessionEvent::Disconnected {
            peer: handle,
            error: None,
        }
    }

    pub async fn discover_services(&self, peer: &BlePeer, service_filter: Uuid) -> SessionEvent {
        let handle = peer.handle.clone();
        if !peer.is_connected() {
            return SessionEvent::ServicesDiscovered {
                peer: handle,
                services: Vec::new(),
                error: Some(BleError::PeerNotConnected.into()),
            };
        }

        if let Err(e) = peer.peripheral.discover_services().await {
            error!("Failed to discover services for peer {handle}: {e}");
            return SessionEvent::ServicesDiscovered {
                peer: handle,
                services: Vec::new(),
                error: Some(BleError::from(e).into()),
            };
        }

        let services = peer
            .peripheral
            .services()
            .into_iter()
            .filter(|service| service.uuid == service_filter)
            .map(|service| ServiceHandle { uuid: service.uuid })
            .collect();
        SessionEvent::ServicesDiscovered {
            peer: handle,
            services,
            error: None,
        }
    }

    /// Report the characteristics of an already discovered service
    pub fn discover_characteristics(
        &self,
        peer: &BlePeer,
        service: &ServiceHandle,
        characteristic_filter: Uuid,
    ) -> SessionEvent {
        let handle = peer.handle.clone();
        let found = peer
            .peripheral
            .services()
            .into_iter()
            .find(|candidate| candidate.uuid == service.uuid);

        let (characteristics, error) = match found {
            Some(gatt_service) => {
                let characteristics = gatt_service
                    .characteristics
                    .into_iter()
                    .filter(|characteristic| characteristic.uuid == characteristic_filter)
                    .map(|characteristic| CharacteristicHandle {
                        service: characteristic.service_uuid,
                        uuid: characteristic.uuid,
                    })
                    .collect();
                (characteristics, None)
            }
            None => (
                Vec::new(),
                Some(TransportFault::new(format!(
                    "service {} not discovered",
                    service.uuid
                ))),
            ),
        };
        SessionEvent::CharacteristicsDiscovered {
            peer: handle,
            service: service.clone(),
            characteristics,
            error,
        }
    }

    /// Enable notifications, forwarding every value as a `ValueUpdated` event
    pub async fn subscribe(
        &self,
        peer: &mut BlePeer,
        characteristic: &CharacteristicHandle,
    ) -> SessionEvent {
        let result = self.try_subscribe(peer, characteristic).await;
        subscription_event(&peer.handle, characteristic, result.is_ok(), result.err())
    }

    async fn try_subscribe(
        &self,
        peer: &mut BlePeer,
        characteristic: &CharacteristicHandle,
    ) -> Result<(), BleError> {
        if !peer.is_connected() {
            return Err(BleError::PeerNotConnected);
        }
        let gatt_characteristic = find_characteristic(peer, characteristic)?;

        // Stream must exist before the subscription so no value is missed
        if !peer.has_notification_pump() {
            let notifications = peer
                .peripheral
                .notifications()
                .await
                .map_err(|e| BleError::NotificationStreamFailed(e.to_string()))?;
            let pump = self.spawn_notification_pump(
                peer.handle.clone(),
                characteristic.clone(),
                notifications,
            );
            peer.set_notification_pump(pump);
        }

        peer.peripheral.subscribe(&gatt_characteristic).await?;
        info!("Subscribed to {} on {}", characteristic.uuid, peer.handle);
        Ok(())
    }

    pub async fn unsubscribe(
        &self,
        peer: &mut BlePeer,
        characteristic: &CharacteristicHandle,
    ) -> SessionEvent {
        let result = match find_characteristic(peer, characteristic) {
            Ok(gatt_characteristic) if peer.is_connected() => peer
                .peripheral
                .unsubscribe(&gatt_characteristic)
                .await
                .map_err(BleError::from),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        subscription_event(&peer.handle, characteristic, false, result.err())
    }

    fn spawn_notification_pump(
        &self,
        peer: PeerHandle,
        characteristic: CharacteristicHandle,
        mut notifications: std::pin::Pin<
            Box<dyn futures::Stream<Item = btleplug::api::ValueNotification> + Send>,
        >,
    ) -> tokio::task::JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic.uuid {
                    continue;
                }
                let event = SessionEvent::ValueUpdated {
                    peer: peer.clone(),
                    characteristic: characteristic.clone(),
                    value: notification.value,
                    error: None,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            debug!("Notification handler for peer {peer} ended");
        })
    }
}

fn find_characteristic(
    peer: &BlePeer,
    characteristic: &CharacteristicHandle,
) -> Result<Characteristic, BleError> {
    peer.peripheral
        .characteristics()
        .into_iter()
        .find(|candidate| {
            candidate.uuid == characteristic.uuid
                && candidate.service_uuid == characteristic.service
        })
        .ok_or_else(|| BleError::CharacteristicNotFound {
            characteristic: characteristic.uuid.to_string(),
        })
}

fn subscription_event(
    peer: &PeerHandle,
    characteristic: &CharacteristicHandle,
    is_active: bool,
    error: Option<BleError>,
) -> SessionEvent {
    SessionEvent::SubscriptionChanged {
        peer: peer.clone(),
        characteristic: characteristic.clone(),
        is_active,
        error: error.map(TransportFault::from),
    }
}
