//! Protocol constants shared by both roles
//!
//! Both sides must agree on these out-of-band, so they live here as
//! process-wide constants rather than per-session configuration.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Transfer service UUID, the only thing a peripheral advertises
pub const TRANSFER_SERVICE_UUID: Uuid = Uuid::from_u128(0xE20A39F4_73F5_4BC4_A12F_17D1AD07A961);

/// Transfer characteristic UUID, carries the chunk stream as notifications
pub const TRANSFER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x08590F7E_DB05_467E_8757_72F6FAEB13D4);

/// The logical protocol endpoint both roles bind to
pub const TRANSFER_IDENTITY: ServiceIdentity = ServiceIdentity {
    service_id: TRANSFER_SERVICE_UUID,
    characteristic_id: TRANSFER_CHARACTERISTIC_UUID,
};

// ----------------------------------------------------------------------------
// Framing Constants
// ----------------------------------------------------------------------------

/// Maximum number of bytes in a single notification
pub const CHUNK_SIZE_LIMIT: usize = 20;

/// Notification value that terminates a message
///
/// This is in-band: a final chunk whose bytes are exactly `EOM` cannot be told
/// apart from the terminator. The peripheral detects that case and reports it
/// (see [`crate::framing::marker_collision`]).
pub const END_OF_MESSAGE: &[u8] = b"EOM";

// ----------------------------------------------------------------------------
// Service Identity
// ----------------------------------------------------------------------------

/// Service/characteristic pair naming the transfer endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub service_id: Uuid,
    pub characteristic_id: Uuid,
}

impl ServiceIdentity {
    /// Whether a discovered service is the transfer service
    pub fn matches_service(&self, uuid: &Uuid) -> bool {
        self.service_id == *uuid
    }

    /// Whether a discovered characteristic is the transfer characteristic
    pub fn matches_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristic_id == *uuid
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_id, self.characteristic_id)
    }
}
