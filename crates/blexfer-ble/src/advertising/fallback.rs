//! Fallback GATT server for platforms without peripheral support

use blexfer_core::GattService;
use tracing::warn;
use uuid::Uuid;

use crate::error::{BleError, Result};

use super::{GattServer, NotifyLink};

// ----------------------------------------------------------------------------
// Fallback Implementation
// ----------------------------------------------------------------------------

/// Server that never powers on, leaving the peripheral session powered off
#[derive(Debug, Default)]
pub struct FallbackGattServer;

impl FallbackGattServer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl GattServer for FallbackGattServer {
    async fn power_on(&mut self) -> Result<()> {
        warn!(
            "BLE peripheral role not supported on this platform. \
            Use Linux with BlueZ to serve the transfer characteristic."
        );
        Err(BleError::PeripheralUnsupported)
    }

    async fn register(&mut self, service: &GattService, _link: &NotifyLink) -> Result<()> {
        warn!("Cannot register GATT service {} on this platform", service.uuid);
        Err(BleError::PeripheralUnsupported)
    }

    async fn advertise(&mut self, service_id: Uuid, local_name: &str) -> Result<()> {
        warn!("Cannot advertise {service_id} as '{local_name}' on this platform");
        Err(BleError::PeripheralUnsupported)
    }

    async fn stop_advertising(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        false
    }
}
