//! blexfer core protocol implementation
//!
//! This crate contains everything about the blexfer transfer protocol that does
//! not touch a radio: the shared protocol constants, the chunk framing rule, the
//! transport contract, and the two session state machines that drive it.
//!
//! ## Architecture
//!
//! - [`protocol`] - service identity, chunk size limit, end-of-message marker
//! - [`framing`] - chunking, reassembly and the outbound cursor
//! - [`transport`] - commands a session issues and events it reacts to
//! - [`central`] - consumer state machine (scan, connect, subscribe, receive)
//! - [`peripheral`] - producer state machine (advertise, chunked send)
//! - [`driver`] - one tokio task per session, serializing its events
//! - [`loopback`] - in-memory transport pairing a central with a peripheral
//!
//! Sessions never block. Every command they issue is fire-and-forget and its
//! outcome comes back later as an event, except for
//! [`PeripheralTransport::send`] whose verdict drives backpressure.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blexfer_core::{loopback, CentralConfig, CentralDriver, CentralSession};
//! use blexfer_core::{PeripheralConfig, PeripheralDriver, PeripheralSession};
//!
//! # async fn example() -> blexfer_core::Result<()> {
//! let pair = loopback::pair(4);
//! tokio::spawn(pair.radio.run());
//!
//! let peripheral = PeripheralSession::new(PeripheralConfig::default()).with_message("hello");
//! let (producer, _notices, _task) =
//!     PeripheralDriver::spawn(peripheral, pair.peripheral, pair.peripheral_events);
//! let (_consumer, mut received, _task) = CentralDriver::spawn(
//!     CentralSession::new(CentralConfig::default()),
//!     pair.central,
//!     pair.central_events,
//! );
//!
//! pair.power.power_on();
//! producer.start_advertising().await?;
//! while let Some(notice) = received.recv().await {
//!     if let blexfer_core::CentralNotice::MessageReceived(message) = notice {
//!         println!("{}", String::from_utf8_lossy(&message));
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod central;
pub mod config;
pub mod driver;
pub mod errors;
pub mod framing;
pub mod loopback;
pub mod peripheral;
pub mod protocol;
pub mod queue;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use central::{CentralNotice, CentralSession, CentralState};
pub use config::{CentralConfig, PeripheralConfig, SignalStrengthWindow};
pub use driver::{
    CentralCommand, CentralDriver, CentralHandle, PeripheralCommand, PeripheralDriver,
    PeripheralHandle,
};
pub use errors::{BlexferError, ConfigError, DiscoveryStage, Result, TransferError};
pub use framing::{Frame, InboundAccumulator, OutboundCursor};
pub use peripheral::{PeripheralNotice, PeripheralSession, PeripheralState, Transmission};
pub use protocol::{
    ServiceIdentity, CHUNK_SIZE_LIMIT, END_OF_MESSAGE, TRANSFER_CHARACTERISTIC_UUID,
    TRANSFER_IDENTITY, TRANSFER_SERVICE_UUID,
};
pub use queue::NotifyQueue;
pub use transport::{
    CentralEvent, CentralTransport, CharacteristicHandle, GattService, PeerHandle,
    PeripheralEvent, PeripheralTransport, ServiceHandle, TransportFault,
};
