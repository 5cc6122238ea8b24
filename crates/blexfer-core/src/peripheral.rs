//! Peripheral (producer) session
//!
//! Registers the transfer service, advertises it on request and, whenever a
//! central subscribes, streams the current message as chunks of at most
//! [`CHUNK_SIZE_LIMIT`](crate::CHUNK_SIZE_LIMIT) bytes followed by the
//! end-of-message marker. A refused send halts the loop until the transport
//! reports it is ready for more.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PeripheralConfig;
use crate::framing::{marker_collision, OutboundCursor};
use crate::protocol::{ServiceIdentity, END_OF_MESSAGE, TRANSFER_IDENTITY};
use crate::transport::{
    CharacteristicHandle, GattService, PeerHandle, PeripheralEvent, PeripheralTransport,
};

// ----------------------------------------------------------------------------
// State and Notices
// ----------------------------------------------------------------------------

/// Progress of the transfer to the current subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transmission {
    /// Chunks or the marker still to go
    Sending,
    /// Marker accepted, nothing left to send
    Idle,
}

/// Peripheral session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralState {
    PoweredOff,
    Idle,
    Advertising,
    Subscribed(Transmission),
}

impl PeripheralState {
    pub fn state_name(&self) -> &'static str {
        match self {
            PeripheralState::PoweredOff => "PoweredOff",
            PeripheralState::Idle => "Idle",
            PeripheralState::Advertising => "Advertising",
            PeripheralState::Subscribed(Transmission::Sending) => "Subscribed(sending)",
            PeripheralState::Subscribed(Transmission::Idle) => "Subscribed(idle)",
        }
    }
}

impl fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

/// Application-facing output of the peripheral session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralNotice {
    StateChanged {
        from: PeripheralState,
        to: PeripheralState,
    },
    /// Every chunk and the marker were accepted by the transport
    TransmissionComplete { bytes: usize },
    /// The chunk at `offset` is byte-identical to the marker and will end the
    /// message early on the receiving side
    MarkerCollision { offset: usize },
}

// ----------------------------------------------------------------------------
// Peripheral Session
// ----------------------------------------------------------------------------

/// Producer-side state machine
#[derive(Debug)]
pub struct PeripheralSession {
    config: PeripheralConfig,
    identity: ServiceIdentity,
    state: PeripheralState,
    message: Arc<[u8]>,
    characteristic: CharacteristicHandle,
    subscriber: Option<PeerHandle>,
    cursor: Option<OutboundCursor>,
    /// Advertising wanted; takes effect once the adapter is ready
    advertising: bool,
}

impl PeripheralSession {
    pub fn new(config: PeripheralConfig) -> Self {
        let identity = TRANSFER_IDENTITY;
        Self {
            advertising: config.advertise_on_ready,
            config,
            identity,
            state: PeripheralState::PoweredOff,
            message: Arc::from(Vec::new()),
            characteristic: CharacteristicHandle {
                service: identity.service_id,
                uuid: identity.characteristic_id,
            },
            subscriber: None,
            cursor: None,
        }
    }

    /// Set the initial message
    pub fn with_message(mut self, message: impl Into<Vec<u8>>) -> Self {
        self.message = Arc::from(message.into());
        self
    }

    pub fn state(&self) -> PeripheralState {
        self.state
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn subscriber(&self) -> Option<&PeerHandle> {
        self.subscriber.as_ref()
    }

    /// Bytes of the current message accepted by the transport so far
    pub fn offset(&self) -> Option<usize> {
        self.cursor.as_ref().map(OutboundCursor::offset)
    }

    pub fn marker_pending(&self) -> bool {
        self.cursor
            .as_ref()
            .is_some_and(OutboundCursor::marker_pending)
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    /// Route a transport event to its handler
    pub fn handle_event(
        &mut self,
        transport: &mut impl PeripheralTransport,
        event: PeripheralEvent,
    ) -> Vec<PeripheralNotice> {
        match event {
            PeripheralEvent::AdapterReady => self.on_adapter_ready(transport),
            PeripheralEvent::AdapterUnavailable => self.on_adapter_unavailable(),
            PeripheralEvent::Subscribed {
                peer,
                characteristic,
            } => self.on_subscribed(transport, peer, &characteristic),
            PeripheralEvent::Unsubscribed {
                peer,
                characteristic,
            } => self.on_unsubscribed(&peer, &characteristic),
            PeripheralEvent::ReadyToSendMore => self.on_ready_to_send_more(transport),
        }
    }

    // ---- Adapter lifecycle ----

    pub fn on_adapter_ready(
        &mut self,
        transport: &mut impl PeripheralTransport,
    ) -> Vec<PeripheralNotice> {
        let mut notices = Vec::new();
        if self.state != PeripheralState::PoweredOff {
            debug!("Adapter ready in state {}, nothing to do", self.state);
            return notices;
        }

        info!("Adapter ready, registering {}", self.identity);
        transport.register_service(&GattService::from_identity(&self.identity));
        self.transition(PeripheralState::Idle, &mut notices);
        if self.advertising {
            transport.advertise(self.identity.service_id);
            self.transition(PeripheralState::Advertising, &mut notices);
        }
        notices
    }

    pub fn on_adapter_unavailable(&mut self) -> Vec<PeripheralNotice> {
        let mut notices = Vec::new();
        if let Some(peer) = self.subscriber.take() {
            warn!("Adapter unavailable, abandoning transfer to {peer}");
        }
        self.cursor = None;
        self.transition(PeripheralState::PoweredOff, &mut notices);
        notices
    }

    /// Stop advertising and drop the current subscriber
    pub fn shutdown(&mut self, transport: &mut impl PeripheralTransport) -> Vec<PeripheralNotice> {
        let mut notices = self.stop_advertising(transport);
        self.subscriber = None;
        self.cursor = None;
        if self.state != PeripheralState::PoweredOff {
            self.transition(PeripheralState::Idle, &mut notices);
        }
        notices
    }

    // ---- Application commands ----

    /// Replace the message; the next subscription sends the new one
    ///
    /// Editing the message takes the peripheral off the air so a consumer
    /// never picks up a half-edited message.
    pub fn set_message(
        &mut self,
        transport: &mut impl PeripheralTransport,
        message: impl Into<Vec<u8>>,
    ) -> Vec<PeripheralNotice> {
        self.message = Arc::from(message.into());
        debug!("Message set ({} bytes)", self.message.len());
        self.stop_advertising(transport)
    }

    pub fn start_advertising(
        &mut self,
        transport: &mut impl PeripheralTransport,
    ) -> Vec<PeripheralNotice> {
        let mut notices = Vec::new();
        if self.advertising {
            return notices;
        }
        self.advertising = true;
        match self.state {
            PeripheralState::PoweredOff => debug!("Advertising deferred until adapter is ready"),
            PeripheralState::Idle => {
                info!("Advertising {}", self.identity.service_id);
                transport.advertise(self.identity.service_id);
                self.transition(PeripheralState::Advertising, &mut notices);
            }
            PeripheralState::Advertising | PeripheralState::Subscribed(_) => {
                transport.advertise(self.identity.service_id);
            }
        }
        notices
    }

    pub fn stop_advertising(
        &mut self,
        transport: &mut impl PeripheralTransport,
    ) -> Vec<PeripheralNotice> {
        let mut notices = Vec::new();
        if !self.advertising {
            return notices;
        }
        self.advertising = false;
        if self.state == PeripheralState::PoweredOff {
            return notices;
        }
        info!("Advertising stopped");
        transport.stop_advertise();
        if self.state == PeripheralState::Advertising {
            self.transition(PeripheralState::Idle, &mut notices);
        }
        notices
    }

    // ---- Subscription and streaming ----

    pub fn on_subscribed(
        &mut self,
        transport: &mut impl PeripheralTransport,
        peer: PeerHandle,
        characteristic: &CharacteristicHandle,
    ) -> Vec<PeripheralNotice> {
        let mut notices = Vec::new();
        if !self.identity.matches_characteristic(&characteristic.uuid)
            || self.state == PeripheralState::PoweredOff
        {
            return notices;
        }
        if let Some(current) = &self.subscriber {
            if *current != peer {
                debug!("Ignoring subscription from {peer}, serving {current}");
                return notices;
            }
        }

        info!(
            "{peer} subscribed, sending {} byte message",
            self.message.len()
        );
        if let Some(offset) = marker_collision(&self.message) {
            warn!("Chunk at offset {offset} equals the end-of-message marker");
            notices.push(PeripheralNotice::MarkerCollision { offset });
        }
        self.subscriber = Some(peer);
        self.cursor = Some(OutboundCursor::new(Arc::clone(&self.message)));
        self.transition(PeripheralState::Subscribed(Transmission::Sending), &mut notices);
        self.pump(transport, &mut notices);
        notices
    }

    pub fn on_unsubscribed(
        &mut self,
        peer: &PeerHandle,
        characteristic: &CharacteristicHandle,
    ) -> Vec<PeripheralNotice> {
        let mut notices = Vec::new();
        if !self.identity.matches_characteristic(&characteristic.uuid)
            || self.subscriber.as_ref() != Some(peer)
        {
            return notices;
        }

        info!("{peer} unsubscribed");
        self.subscriber = None;
        self.cursor = None;
        let next = if self.advertising {
            PeripheralState::Advertising
        } else {
            PeripheralState::Idle
        };
        self.transition(next, &mut notices);
        notices
    }

    pub fn on_ready_to_send_more(
        &mut self,
        transport: &mut impl PeripheralTransport,
    ) -> Vec<PeripheralNotice> {
        let mut notices = Vec::new();
        if self.state == PeripheralState::Subscribed(Transmission::Sending) {
            self.pump(transport, &mut notices);
        }
        notices
    }

    /// Offer chunks until the transport refuses one or the marker lands
    fn pump(&mut self, transport: &mut impl PeripheralTransport, notices: &mut Vec<PeripheralNotice>) {
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };

        while !cursor.is_drained() {
            let chunk = cursor.next_chunk();
            let len = chunk.len();
            if !transport.send(&self.characteristic, chunk) {
                debug!("Send refused at offset {}, waiting for readiness", cursor.offset());
                return;
            }
            debug!(
                "Sent chunk {} at offset {}",
                hex::encode(chunk),
                cursor.offset()
            );
            cursor.advance(len);
        }

        if !transport.send(&self.characteristic, END_OF_MESSAGE) {
            debug!("End-of-message refused, retrying on readiness");
            cursor.set_marker_pending(true);
            return;
        }
        cursor.set_marker_pending(false);
        let bytes = cursor.payload().len();

        info!("Transfer complete ({bytes} bytes)");
        notices.push(PeripheralNotice::TransmissionComplete { bytes });
        self.transition(PeripheralState::Subscribed(Transmission::Idle), notices);
    }

    fn transition(&mut self, to: PeripheralState, notices: &mut Vec<PeripheralNotice>) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!("Peripheral state transition: {from} -> {to}");
        notices.push(PeripheralNotice::StateChanged { from, to });
    }
}
