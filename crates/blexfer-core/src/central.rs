//! Central (consumer) session
//!
//! Scans for a peer advertising the transfer service, connects to the first
//! one inside the signal strength window, subscribes to the transfer
//! characteristic and reassembles notifications until the end-of-message
//! marker. One peer is tracked at a time; after completion or failure the
//! session tears the link down and goes back to scanning.

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::CentralConfig;
use crate::errors::{DiscoveryStage, TransferError};
use crate::framing::{Frame, InboundAccumulator};
use crate::protocol::{ServiceIdentity, TRANSFER_IDENTITY};
use crate::transport::{
    CentralEvent, CentralTransport, CharacteristicHandle, PeerHandle, ServiceHandle,
    TransportFault,
};

// ----------------------------------------------------------------------------
// State and Notices
// ----------------------------------------------------------------------------

/// Central session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CentralState {
    /// Adapter not ready, or session shut down
    Idle,
    Scanning,
    Connecting,
    DiscoveringService,
    DiscoveringCharacteristic,
    Subscribing,
    Receiving,
    /// Message delivered; waiting for the link teardown to land
    Completed,
    /// Transfer abandoned; waiting for the link teardown to land
    Failed,
}

impl CentralState {
    pub fn state_name(&self) -> &'static str {
        match self {
            CentralState::Idle => "Idle",
            CentralState::Scanning => "Scanning",
            CentralState::Connecting => "Connecting",
            CentralState::DiscoveringService => "DiscoveringService",
            CentralState::DiscoveringCharacteristic => "DiscoveringCharacteristic",
            CentralState::Subscribing => "Subscribing",
            CentralState::Receiving => "Receiving",
            CentralState::Completed => "Completed",
            CentralState::Failed => "Failed",
        }
    }
}

impl fmt::Display for CentralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

/// Application-facing output of the central session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralNotice {
    StateChanged {
        from: CentralState,
        to: CentralState,
    },
    /// A complete message, exactly as the producer sent it
    MessageReceived(Vec<u8>),
    Failure(TransferError),
}

// ----------------------------------------------------------------------------
// Central Session
// ----------------------------------------------------------------------------

/// Consumer-side state machine
///
/// Every handler issues its commands on the given transport and returns the
/// notices it produced. Events about a peer other than the tracked one are
/// stale and ignored.
#[derive(Debug)]
pub struct CentralSession {
    config: CentralConfig,
    identity: ServiceIdentity,
    state: CentralState,
    peer: Option<PeerHandle>,
    accumulator: InboundAccumulator,
    subscription: Option<CharacteristicHandle>,
    /// Characteristic discoveries still outstanding for the tracked peer
    pending_discoveries: usize,
    unsubscribe_requested: bool,
    disconnect_requested: bool,
    /// Set when we tear the link down because the peer misbehaved
    teardown_reason: Option<String>,
    active: bool,
}

impl CentralSession {
    pub fn new(config: CentralConfig) -> Self {
        Self {
            config,
            identity: TRANSFER_IDENTITY,
            state: CentralState::Idle,
            peer: None,
            accumulator: InboundAccumulator::new(),
            subscription: None,
            pending_discoveries: 0,
            unsubscribe_requested: false,
            disconnect_requested: false,
            teardown_reason: None,
            active: true,
        }
    }

    pub fn state(&self) -> CentralState {
        self.state
    }

    /// Peer currently being connected to or received from
    pub fn peer(&self) -> Option<&PeerHandle> {
        self.peer.as_ref()
    }

    /// Bytes of the in-flight message received so far
    pub fn buffered_len(&self) -> usize {
        self.accumulator.len()
    }

    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    /// Route a transport event to its handler
    pub fn handle_event(
        &mut self,
        transport: &mut impl CentralTransport,
        event: CentralEvent,
    ) -> Vec<CentralNotice> {
        match event {
            CentralEvent::AdapterReady => self.on_adapter_ready(transport),
            CentralEvent::AdapterUnavailable => self.on_adapter_unavailable(),
            CentralEvent::PeerDiscovered { peer, rssi } => {
                self.on_peer_discovered(transport, peer, rssi)
            }
            CentralEvent::Connected { peer } => self.on_connected(transport, &peer),
            CentralEvent::ConnectFailed { peer, error } => {
                self.on_connect_failed(transport, &peer, error)
            }
            CentralEvent::Disconnected { peer, error } => {
                self.on_disconnected(transport, &peer, error)
            }
            CentralEvent::ServicesDiscovered {
                peer,
                services,
                error,
            } => self.on_services_discovered(transport, &peer, services, error),
            CentralEvent::CharacteristicsDiscovered {
                peer,
                service,
                characteristics,
                error,
            } => self.on_characteristics_discovered(
                transport,
                &peer,
                &service,
                characteristics,
                error,
            ),
            CentralEvent::ValueUpdated {
                peer,
                characteristic,
                value,
                error,
            } => self.on_value_updated(transport, &peer, &characteristic, &value, error),
            CentralEvent::SubscriptionChanged {
                peer,
                characteristic,
                is_active,
                error,
            } => self.on_subscription_changed(transport, &peer, &characteristic, is_active, error),
        }
    }

    // ---- Adapter lifecycle ----

    pub fn on_adapter_ready(&mut self, transport: &mut impl CentralTransport) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if self.state != CentralState::Idle || !self.active {
            debug!("Adapter ready in state {}, nothing to do", self.state);
            return notices;
        }
        info!("Adapter ready, scanning for {}", self.identity.service_id);
        self.transition(CentralState::Scanning, &mut notices);
        transport.scan(self.identity.service_id);
        notices
    }

    /// Adapter powered off or lost; in-flight state is dropped without commands
    pub fn on_adapter_unavailable(&mut self) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if self.peer.is_some() {
            warn!(
                "Adapter unavailable, dropping transfer with {} ({} bytes buffered)",
                self.peer_label(),
                self.accumulator.len()
            );
        }
        self.release();
        self.transition(CentralState::Idle, &mut notices);
        notices
    }

    /// Stop scanning and tear down any link; the session stays idle afterwards
    pub fn shutdown(&mut self, transport: &mut impl CentralTransport) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        self.active = false;
        if matches!(self.state, CentralState::Scanning | CentralState::Connecting) {
            transport.stop_scan();
        }
        if self.peer.is_some() {
            info!("Shutting down, releasing {}", self.peer_label());
            self.cleanup(transport);
        } else {
            self.transition(CentralState::Idle, &mut notices);
        }
        notices
    }

    // ---- Discovery and connection ----

    pub fn on_peer_discovered(
        &mut self,
        transport: &mut impl CentralTransport,
        peer: PeerHandle,
        rssi: i16,
    ) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if !self.config.signal_window.accepts(rssi) {
            debug!(
                "Ignoring {peer} at {rssi} dBm, outside [{}, {}]",
                self.config.signal_window.min, self.config.signal_window.max
            );
            return notices;
        }
        if let Some(tracked) = &self.peer {
            debug!("Ignoring {peer}, already tracking {tracked}");
            return notices;
        }
        if self.state != CentralState::Scanning {
            debug!("Ignoring {peer} in state {}", self.state);
            return notices;
        }

        info!("Discovered {peer} at {rssi} dBm, connecting");
        self.peer = Some(peer.clone());
        self.transition(CentralState::Connecting, &mut notices);
        transport.connect(&peer);
        notices
    }

    pub fn on_connected(
        &mut self,
        transport: &mut impl CentralTransport,
        peer: &PeerHandle,
    ) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if !self.is_tracked(peer) || self.state != CentralState::Connecting {
            debug!("Ignoring connection to {peer} in state {}", self.state);
            return notices;
        }

        info!("Connected to {peer}");
        self.accumulator.clear();
        transport.stop_scan();
        self.transition(CentralState::DiscoveringService, &mut notices);
        transport.discover_services(peer, self.identity.service_id);
        notices
    }

    pub fn on_connect_failed(
        &mut self,
        transport: &mut impl CentralTransport,
        peer: &PeerHandle,
        error: TransportFault,
    ) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if !self.is_tracked(peer) {
            return notices;
        }

        self.report(
            TransferError::ConnectFailure {
                peer: peer.clone(),
                reason: error.reason,
            },
            &mut notices,
        );
        self.release();
        self.rearm(transport, false, &mut notices);
        notices
    }

    pub fn on_services_discovered(
        &mut self,
        transport: &mut impl CentralTransport,
        peer: &PeerHandle,
        services: Vec<ServiceHandle>,
        error: Option<TransportFault>,
    ) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if !self.is_tracked(peer) || self.state != CentralState::DiscoveringService {
            return notices;
        }

        let matching: Vec<ServiceHandle> = services
            .into_iter()
            .filter(|service| self.identity.matches_service(&service.uuid))
            .collect();
        let reason = match error {
            Some(fault) => Some(fault.reason),
            None if matching.is_empty() => Some("transfer service not found".to_string()),
            None => None,
        };
        if let Some(reason) = reason {
            self.fail(
                transport,
                TransferError::DiscoveryFailure {
                    peer: peer.clone(),
                    stage: DiscoveryStage::Service,
                    reason,
                },
                &mut notices,
            );
            return notices;
        }

        self.pending_discoveries = matching.len();
        self.transition(CentralState::DiscoveringCharacteristic, &mut notices);
        for service in &matching {
            transport.discover_characteristics(peer, service, self.identity.characteristic_id);
        }
        notices
    }

    pub fn on_characteristics_discovered(
        &mut self,
        transport: &mut impl CentralTransport,
        peer: &PeerHandle,
        service: &ServiceHandle,
        characteristics: Vec<CharacteristicHandle>,
        error: Option<TransportFault>,
    ) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if !self.is_tracked(peer) || self.state != CentralState::DiscoveringCharacteristic {
            return notices;
        }

        if let Some(fault) = error {
            self.fail(
                transport,
                TransferError::DiscoveryFailure {
                    peer: peer.clone(),
                    stage: DiscoveryStage::Characteristic,
                    reason: fault.reason,
                },
                &mut notices,
            );
            return notices;
        }

        self.pending_discoveries = self.pending_discoveries.saturating_sub(1);
        let found = characteristics
            .into_iter()
            .find(|characteristic| self.identity.matches_characteristic(&characteristic.uuid));
        match found {
            Some(characteristic) => {
                debug!("Subscribing to {} on {}", characteristic.uuid, service.uuid);
                self.transition(CentralState::Subscribing, &mut notices);
                transport.subscribe(peer, &characteristic);
            }
            None if self.pending_discoveries == 0 => {
                self.fail(
                    transport,
                    TransferError::DiscoveryFailure {
                        peer: peer.clone(),
                        stage: DiscoveryStage::Characteristic,
                        reason: "transfer characteristic not found".to_string(),
                    },
                    &mut notices,
                );
            }
            None => {}
        }
        notices
    }

    // ---- Subscription and data ----

    pub fn on_subscription_changed(
        &mut self,
        transport: &mut impl CentralTransport,
        peer: &PeerHandle,
        characteristic: &CharacteristicHandle,
        is_active: bool,
        error: Option<TransportFault>,
    ) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if !self.is_tracked(peer) {
            return notices;
        }
        let failed = error.is_some();
        if let Some(fault) = error {
            self.report(
                TransferError::SubscriptionFailure {
                    peer: peer.clone(),
                    reason: fault.reason,
                },
                &mut notices,
            );
            // A fault on a live subscription leaves it usable
            if is_active {
                return notices;
            }
        }
        if !self.identity.matches_characteristic(&characteristic.uuid) {
            return notices;
        }

        if is_active {
            info!("Notifications active on {peer}");
            self.subscription = Some(characteristic.clone());
            if self.state == CentralState::Subscribing {
                self.transition(CentralState::Receiving, &mut notices);
            }
            return notices;
        }

        self.subscription = None;
        if !self.unsubscribe_requested {
            // A failure was already reported; the disconnect that follows is ours
            if !failed {
                warn!("Subscription on {peer} ended by the peer");
                self.teardown_reason = Some("subscription ended by peer".to_string());
            }
            self.transition(CentralState::Failed, &mut notices);
        }
        if !self.disconnect_requested {
            transport.disconnect(peer);
            self.disconnect_requested = true;
        }
        notices
    }

    pub fn on_value_updated(
        &mut self,
        transport: &mut impl CentralTransport,
        peer: &PeerHandle,
        characteristic: &CharacteristicHandle,
        value: &[u8],
        error: Option<TransportFault>,
    ) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if !self.is_tracked(peer) {
            return notices;
        }
        if let Some(fault) = error {
            self.report(
                TransferError::ValueUpdateFailure {
                    peer: peer.clone(),
                    reason: fault.reason,
                },
                &mut notices,
            );
            return notices;
        }
        if !self.identity.matches_characteristic(&characteristic.uuid)
            || !matches!(
                self.state,
                CentralState::Subscribing | CentralState::Receiving
            )
        {
            debug!("Dropping {} byte value in state {}", value.len(), self.state);
            return notices;
        }

        match self.accumulator.push(value) {
            Frame::Partial { buffered } => {
                debug!("Received {} bytes from {peer}, {buffered} buffered", value.len());
            }
            Frame::Complete(message) => {
                info!("Received {} byte message from {peer}", message.len());
                notices.push(CentralNotice::MessageReceived(message));
                transport.unsubscribe(peer, characteristic);
                self.unsubscribe_requested = true;
                transport.disconnect(peer);
                self.disconnect_requested = true;
                self.transition(CentralState::Completed, &mut notices);
            }
        }
        notices
    }

    pub fn on_disconnected(
        &mut self,
        transport: &mut impl CentralTransport,
        peer: &PeerHandle,
        error: Option<TransportFault>,
    ) -> Vec<CentralNotice> {
        let mut notices = Vec::new();
        if !self.is_tracked(peer) {
            debug!("Ignoring disconnect of untracked {peer}");
            return notices;
        }

        let unexpected = !self.disconnect_requested || error.is_some();
        let reason = error
            .map(|fault| fault.reason)
            .or_else(|| self.teardown_reason.take());
        if unexpected || reason.is_some() {
            self.report(
                TransferError::UnexpectedDisconnect {
                    peer: peer.clone(),
                    reason: reason.unwrap_or_else(|| "link lost".to_string()),
                },
                &mut notices,
            );
        } else {
            info!("Disconnected from {peer}");
        }

        if !self.accumulator.is_empty() {
            debug!("Discarding {} partial bytes", self.accumulator.len());
        }
        let completed = self.state == CentralState::Completed;
        self.release();
        self.rearm(transport, completed, &mut notices);
        notices
    }

    /// Tear down the link to the tracked peer
    ///
    /// Idempotent: unsubscribes first when a subscription is active, otherwise
    /// disconnects. Once a teardown is in flight no further commands go out.
    pub fn cleanup(&mut self, transport: &mut impl CentralTransport) {
        let Some(peer) = self.peer.clone() else {
            return;
        };
        if self.disconnect_requested || self.unsubscribe_requested {
            return;
        }
        if let Some(characteristic) = self.subscription.clone() {
            debug!("Cleanup: unsubscribing from {peer}");
            transport.unsubscribe(&peer, &characteristic);
            self.unsubscribe_requested = true;
            return;
        }
        debug!("Cleanup: disconnecting from {peer}");
        transport.disconnect(&peer);
        self.disconnect_requested = true;
    }

    // ---- Helpers ----

    fn is_tracked(&self, peer: &PeerHandle) -> bool {
        self.peer.as_ref() == Some(peer)
    }

    fn peer_label(&self) -> String {
        self.peer
            .as_ref()
            .map(PeerHandle::to_string)
            .unwrap_or_else(|| "<none>".to_string())
    }

    fn report(&self, error: TransferError, notices: &mut Vec<CentralNotice>) {
        warn!("{error}");
        notices.push(CentralNotice::Failure(error));
    }

    fn fail(
        &mut self,
        transport: &mut impl CentralTransport,
        error: TransferError,
        notices: &mut Vec<CentralNotice>,
    ) {
        self.report(error, notices);
        self.transition(CentralState::Failed, notices);
        self.cleanup(transport);
    }

    /// Forget the tracked peer and everything tied to it
    fn release(&mut self) {
        self.peer = None;
        self.accumulator.clear();
        self.subscription = None;
        self.pending_discoveries = 0;
        self.unsubscribe_requested = false;
        self.disconnect_requested = false;
        self.teardown_reason = None;
    }

    fn rearm(
        &mut self,
        transport: &mut impl CentralTransport,
        after_completion: bool,
        notices: &mut Vec<CentralNotice>,
    ) {
        let rescan = self.active && (!after_completion || self.config.rescan_on_complete);
        if rescan {
            self.transition(CentralState::Scanning, notices);
            transport.scan(self.identity.service_id);
        } else {
            self.transition(CentralState::Idle, notices);
        }
    }

    fn transition(&mut self, to: CentralState, notices: &mut Vec<CentralNotice>) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!("Central state transition: {from} -> {to}");
        notices.push(CentralNotice::StateChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct NullTransport {
        commands: usize,
    }

    impl CentralTransport for NullTransport {
        fn scan(&mut self, _: uuid::Uuid) {
            self.commands += 1;
        }
        fn stop_scan(&mut self) {
            self.commands += 1;
        }
        fn connect(&mut self, _: &PeerHandle) {
            self.commands += 1;
        }
        fn disconnect(&mut self, _: &PeerHandle) {
            self.commands += 1;
        }
        fn discover_services(&mut self, _: &PeerHandle, _: uuid::Uuid) {
            self.commands += 1;
        }
        fn discover_characteristics(&mut self, _: &PeerHandle, _: &ServiceHandle, _: uuid::Uuid) {
            self.commands += 1;
        }
        fn subscribe(&mut self, _: &PeerHandle, _: &CharacteristicHandle) {
            self.commands += 1;
        }
        fn unsubscribe(&mut self, _: &PeerHandle, _: &CharacteristicHandle) {
            self.commands += 1;
        }
    }

    #[test]
    fn test_state_changes_are_reported() {
        let mut transport = NullTransport::default();
        let mut session = CentralSession::new(CentralConfig::default());
        let notices = session.on_adapter_ready(&mut transport);
        assert_eq!(
            notices,
            vec![CentralNotice::StateChanged {
                from: CentralState::Idle,
                to: CentralState::Scanning,
            }]
        );
        // Second readiness is a no-op
        assert!(session.on_adapter_ready(&mut transport).is_empty());
        assert_eq!(transport.commands, 1);
    }

    #[test]
    fn test_shutdown_while_scanning_goes_idle() {
        let mut transport = NullTransport::default();
        let mut session = CentralSession::new(CentralConfig::default());
        session.on_adapter_ready(&mut transport);
        session.shutdown(&mut transport);
        assert_eq!(session.state(), CentralState::Idle);
        // A late discovery is ignored
        session.on_peer_discovered(&mut transport, PeerHandle::new("late"), -20);
        assert!(session.peer().is_none());
    }
}
