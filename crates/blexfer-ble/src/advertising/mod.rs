//! Peripheral role: GATT server, advertising and notification delivery

pub mod fallback;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod manager;

pub use manager::BlePeripheral;

use std::sync::{Arc, Mutex, MutexGuard};

use blexfer_core::{CharacteristicHandle, GattService, NotifyQueue, PeerHandle, PeripheralEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

// ----------------------------------------------------------------------------
// Notification Link
// ----------------------------------------------------------------------------

/// State shared between the [`BlePeripheral`] handle and the GATT server
///
/// The handle pushes chunks into the queue; the server drains it towards the
/// subscriber and reports subscription changes on the event channel. Only one
/// subscriber is served at a time. The subscription flag is held while a
/// value is queued, so nothing pushed for one subscriber reaches the next.
#[derive(Debug, Clone)]
pub struct NotifyLink {
    queue: Arc<NotifyQueue>,
    subscribed: Arc<Mutex<bool>>,
    events: mpsc::UnboundedSender<PeripheralEvent>,
}

impl NotifyLink {
    pub fn new(queue_depth: usize, events: mpsc::UnboundedSender<PeripheralEvent>) -> Self {
        Self {
            queue: Arc::new(NotifyQueue::new(queue_depth)),
            subscribed: Arc::new(Mutex::new(false)),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.subscribed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_subscribed(&self) -> bool {
        *self.lock()
    }

    /// Queue a value for the current subscriber
    ///
    /// Without a subscriber the value is accepted and dropped. `false` when
    /// the queue is full and the value must be retried.
    pub fn offer(&self, value: &[u8]) -> bool {
        let subscribed = self.lock();
        if !*subscribed {
            debug!("No subscriber, dropping {} bytes", value.len());
            return true;
        }
        self.queue.push(value.to_vec())
    }

    /// Claim the link for `peer`
    ///
    /// Returns `false` when another subscriber already holds it.
    pub fn begin_subscription(&self, peer: &PeerHandle, characteristic: &CharacteristicHandle) -> bool {
        {
            let mut subscribed = self.lock();
            if *subscribed {
                warn!("Ignoring subscription from {peer}, already serving a subscriber");
                return false;
            }
            self.queue.clear();
            *subscribed = true;
        }
        debug!("Subscriber {peer} attached to {}", characteristic.uuid);
        self.emit(PeripheralEvent::Subscribed {
            peer: peer.clone(),
            characteristic: characteristic.clone(),
        });
        true
    }

    /// Wait for the next queued value
    ///
    /// Raises `ReadyToSendMore` when this pop frees room for a refused send.
    /// `None` once the handle is gone.
    pub async fn next_value(&self) -> Option<Vec<u8>> {
        let (value, ready) = self.queue.pop().await?;
        if ready {
            self.emit(PeripheralEvent::ReadyToSendMore);
        }
        Some(value)
    }

    /// Release the link and drop anything still queued
    pub fn end_subscription(&self, peer: &PeerHandle, characteristic: &CharacteristicHandle) {
        {
            let mut subscribed = self.lock();
            self.queue.clear();
            *subscribed = false;
        }
        debug!("Subscriber {peer} detached");
        self.emit(PeripheralEvent::Unsubscribed {
            peer: peer.clone(),
            characteristic: characteristic.clone(),
        });
    }

    pub(crate) fn emit(&self, event: PeripheralEvent) {
        // The session may already be gone
        let _ = self.events.send(event);
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }
}

// ----------------------------------------------------------------------------
// Cross-platform GATT Server Trait
// ----------------------------------------------------------------------------

/// Local GATT server and advertiser for the peripheral role
#[async_trait::async_trait]
pub trait GattServer: Send {
    /// Bring up the local adapter
    async fn power_on(&mut self) -> Result<()>;

    /// Publish `service`, delivering notifications through `link`
    async fn register(&mut self, service: &GattService, link: &NotifyLink) -> Result<()>;

    /// Advertise `service_id` under `local_name`
    async fn advertise(&mut self, service_id: Uuid, local_name: &str) -> Result<()>;

    async fn stop_advertising(&mut self) -> Result<()>;

    fn is_advertising(&self) -> bool;
}

// ----------------------------------------------------------------------------
// Platform Detection
// ----------------------------------------------------------------------------

/// GATT server for the current platform
pub enum PlatformGattServer {
    #[cfg(target_os = "linux")]
    Linux(linux::LinuxGattServer),
    #[allow(dead_code)]
    Fallback(fallback::FallbackGattServer),
}

impl PlatformGattServer {
    /// Create the server for the current platform on adapter `adapter_index`
    pub fn new(adapter_index: usize) -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::Linux(linux::LinuxGattServer::new(adapter_index))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = adapter_index;
            Self::Fallback(fallback::FallbackGattServer::new())
        }
    }
}

#[async_trait::async_trait]
impl GattServer for PlatformGattServer {
    async fn power_on(&mut self) -> Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(server) => server.power_on().await,
            Self::Fallback(server) => server.power_on().await,
        }
    }

    async fn register(&mut self, service: &GattService, link: &NotifyLink) -> Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(server) => server.register(service, link).await,
            Self::Fallback(server) => server.register(service, link).await,
        }
    }

    async fn advertise(&mut self, service_id: Uuid, local_name: &str) -> Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(server) => server.advertise(service_id, local_name).await,
            Self::Fallback(server) => server.advertise(service_id, local_name).await,
        }
    }

    async fn stop_advertising(&mut self) -> Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(server) => server.stop_advertising().await,
            Self::Fallback(server) => server.stop_advertising().await,
        }
    }

    fn is_advertising(&self) -> bool {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(server) => server.is_advertising(),
            Self::Fallback(server) => server.is_advertising(),
        }
    }
}
