//! Registry of remote devices seen by the central adapter

use std::collections::HashMap;

use blexfer_core::PeerHandle;
use btleplug::platform::Peripheral as PlatformPeripheral;
use tokio::task::JoinHandle;

// ----------------------------------------------------------------------------
// Peer State Management
// ----------------------------------------------------------------------------

/// Link state of a remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A discovered remote device
#[derive(Debug)]
pub struct BlePeer<P = PlatformPeripheral> {
    /// Handle the sessions know this device by
    pub handle: PeerHandle,
    /// BLE peripheral
    pub peripheral: P,
    /// Connection state
    pub connection_state: ConnectionState,
    /// Task forwarding notifications while subscribed
    notification_pump: Option<JoinHandle<()>>,
}

impl<P> BlePeer<P> {
    pub fn new(handle: PeerHandle, peripheral: P) -> Self {
        Self {
            handle,
            peripheral,
            connection_state: ConnectionState::Disconnected,
            notification_pump: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub fn mark_connecting(&mut self) {
        self.connection_state = ConnectionState::Connecting;
    }

    pub fn mark_connected(&mut self) {
        self.connection_state = ConnectionState::Connected;
    }

    /// Mark the link gone and stop forwarding its notifications
    pub fn mark_disconnected(&mut self) {
        self.connection_state = ConnectionState::Disconnected;
        if let Some(pump) = self.notification_pump.take() {
            pump.abort();
        }
    }

    pub fn has_notification_pump(&self) -> bool {
        self.notification_pump
            .as_ref()
            .is_some_and(|pump| !pump.is_finished())
    }

    pub fn set_notification_pump(&mut self, pump: JoinHandle<()>) {
        if let Some(previous) = self.notification_pump.replace(pump) {
            previous.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Peer Registry
// ----------------------------------------------------------------------------

/// Discovered devices keyed by the handle handed to the sessions
#[derive(Debug)]
pub struct PeerRegistry<P = PlatformPeripheral> {
    peers: HashMap<PeerHandle, BlePeer<P>>,
}

impl<P> Default for PeerRegistry<P> {
    fn default() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }
}

impl<P> PeerRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered device; an already known device keeps its state
    pub fn insert_discovered(&mut self, handle: PeerHandle, peripheral: P) -> &mut BlePeer<P> {
        self.peers
            .entry(handle.clone())
            .or_insert_with(|| BlePeer::new(handle, peripheral))
    }

    pub fn get(&self, handle: &PeerHandle) -> Option<&BlePeer<P>> {
        self.peers.get(handle)
    }

    pub fn get_mut(&mut self, handle: &PeerHandle) -> Option<&mut BlePeer<P>> {
        self.peers.get_mut(handle)
    }

    pub fn connected(&self) -> impl Iterator<Item = &BlePeer<P>> {
        self.peers.values().filter(|peer| peer.is_connected())
    }

    /// Mark every device disconnected, e.g. after the adapter went away
    pub fn disconnect_all(&mut self) {
        for peer in self.peers.values_mut() {
            peer.mark_disconnected();
        }
    }

    /// Forget devices with no link; returns how many were dropped
    pub fn prune_disconnected(&mut self) -> usize {
        let before = self.peers.len();
        self.peers
            .retain(|_, peer| peer.connection_state != ConnectionState::Disconnected);
        before - self.peers.len()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
