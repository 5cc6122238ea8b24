//! Test utilities for driving blexfer sessions without a radio
//!
//! [`RecordingTransport`] implements both transport traits, records every
//! command a session issues and lets a test script the verdict of each
//! `send` call.

#![allow(dead_code)]

use std::collections::VecDeque;

use blexfer_core::{
    CentralTransport, CharacteristicHandle, GattService, PeerHandle, PeripheralTransport,
    ServiceHandle, END_OF_MESSAGE, TRANSFER_IDENTITY,
};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Recorded Commands
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan(Uuid),
    StopScan,
    Connect(PeerHandle),
    Disconnect(PeerHandle),
    DiscoverServices(PeerHandle, Uuid),
    DiscoverCharacteristics(PeerHandle, Uuid, Uuid),
    Subscribe(PeerHandle, CharacteristicHandle),
    Unsubscribe(PeerHandle, CharacteristicHandle),
    RegisterService(GattService),
    Advertise(Uuid),
    StopAdvertise,
    Send(Vec<u8>),
}

// ----------------------------------------------------------------------------
// Recording Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub commands: Vec<Command>,
    /// Verdicts handed out by `send`, in order; `true` once exhausted
    verdicts: VecDeque<bool>,
    /// Values `send` accepted, in order
    pub accepted: Vec<Vec<u8>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue verdicts for the next `send` calls
    pub fn script_sends(&mut self, verdicts: &[bool]) {
        self.verdicts.extend(verdicts.iter().copied());
    }

    /// Take and forget everything recorded so far
    pub fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Every `send` attempt, accepted or not
    pub fn send_attempts(&self) -> Vec<Vec<u8>> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Send(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Accepted data chunks, marker excluded
    pub fn accepted_chunks(&self) -> Vec<Vec<u8>> {
        self.accepted
            .iter()
            .filter(|value| value.as_slice() != END_OF_MESSAGE)
            .cloned()
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }
}

impl CentralTransport for RecordingTransport {
    fn scan(&mut self, service_filter: Uuid) {
        self.commands.push(Command::Scan(service_filter));
    }

    fn stop_scan(&mut self) {
        self.commands.push(Command::StopScan);
    }

    fn connect(&mut self, peer: &PeerHandle) {
        self.commands.push(Command::Connect(peer.clone()));
    }

    fn disconnect(&mut self, peer: &PeerHandle) {
        self.commands.push(Command::Disconnect(peer.clone()));
    }

    fn discover_services(&mut self, peer: &PeerHandle, service_filter: Uuid) {
        self.commands
            .push(Command::DiscoverServices(peer.clone(), service_filter));
    }

    fn discover_characteristics(
        &mut self,
        peer: &PeerHandle,
        service: &ServiceHandle,
        characteristic_filter: Uuid,
    ) {
        self.commands.push(Command::DiscoverCharacteristics(
            peer.clone(),
            service.uuid,
            characteristic_filter,
        ));
    }

    fn subscribe(&mut self, peer: &PeerHandle, characteristic: &CharacteristicHandle) {
        self.commands
            .push(Command::Subscribe(peer.clone(), characteristic.clone()));
    }

    fn unsubscribe(&mut self, peer: &PeerHandle, characteristic: &CharacteristicHandle) {
        self.commands
            .push(Command::Unsubscribe(peer.clone(), characteristic.clone()));
    }
}

impl PeripheralTransport for RecordingTransport {
    fn register_service(&mut self, service: &GattService) {
        self.commands.push(Command::RegisterService(service.clone()));
    }

    fn advertise(&mut self, service_id: Uuid) {
        self.commands.push(Command::Advertise(service_id));
    }

    fn stop_advertise(&mut self) {
        self.commands.push(Command::StopAdvertise);
    }

    fn send(&mut self, _characteristic: &CharacteristicHandle, value: &[u8]) -> bool {
        self.commands.push(Command::Send(value.to_vec()));
        let verdict = self.verdicts.pop_front().unwrap_or(true);
        if verdict {
            self.accepted.push(value.to_vec());
        }
        verdict
    }
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

pub fn peer(id: &str) -> PeerHandle {
    PeerHandle::new(id)
}

pub fn transfer_service() -> ServiceHandle {
    ServiceHandle {
        uuid: TRANSFER_IDENTITY.service_id,
    }
}

pub fn transfer_characteristic() -> CharacteristicHandle {
    CharacteristicHandle::transfer()
}
