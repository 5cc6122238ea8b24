//! Bluetooth Low Energy transport adapters for blexfer
//!
//! This crate connects the sans-io sessions of `blexfer-core` to a real radio.
//! Each adapter exposes a synchronous handle implementing one of the core
//! transport traits, backed by a tokio worker that performs the actual BLE
//! calls and reports their outcome as events.
//!
//! ## Architecture
//!
//! - [`config`] - adapter selection, timeouts and queue depth
//! - [`error`] - error types specific to the BLE adapters
//! - [`peer`] - registry of discovered remote devices
//! - [`discovery`] - adapter initialization and scanning
//! - [`connection`] - connect, GATT discovery and notification subscription
//! - [`transport`] - the btleplug-backed central handle and its worker
//! - [`advertising`] - GATT server and advertising for the peripheral role
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blexfer_ble::{BleConfig, BtleplugCentral};
//! use blexfer_core::{CentralDriver, CentralNotice, CentralSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BleConfig::new().with_adapter_index(0);
//! let (central, events, _worker) = BtleplugCentral::start(&config).await?;
//!
//! let session = CentralSession::new(config.central.clone());
//! let (_handle, mut notices, _task) = CentralDriver::spawn(session, central, events);
//! while let Some(notice) = notices.recv().await {
//!     if let CentralNotice::MessageReceived(message) = notice {
//!         println!("{}", String::from_utf8_lossy(&message));
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! ### Central role
//! Every platform btleplug supports (Linux, macOS, Windows).
//!
//! ### Peripheral role
//! - **Linux**: GATT server and advertising via `bluer` and BlueZ
//! - **Other platforms**: not supported; the peripheral reports its adapter as
//!   unavailable so the session stays powered off

mod advertising;
mod config;
mod connection;
mod discovery;
mod error;
mod peer;
mod transport;

// Public API exports
pub use advertising::fallback::FallbackGattServer;
pub use advertising::{BlePeripheral, GattServer, NotifyLink, PlatformGattServer};
pub use config::BleConfig;
pub use error::{BleError, Result};
pub use peer::{BlePeer, ConnectionState, PeerRegistry};
pub use transport::BtleplugCentral;
