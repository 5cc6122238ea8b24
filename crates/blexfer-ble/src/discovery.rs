//! Adapter initialization, scanning and peer discovery

use blexfer_core::{CentralEvent as SessionEvent, PeerHandle};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BleConfig;
use crate::error::{BleError, Result};
use crate::peer::PeerRegistry;

/// Handle the sessions use for a btleplug device
pub(crate) fn handle_for(id: &PeripheralId) -> PeerHandle {
    PeerHandle::new(id.to_string())
}

/// Open the adapter selected by `config`
pub(crate) async fn initialize_adapter(config: &BleConfig) -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    if adapters.is_empty() {
        return Err(BleError::AdapterNotAvailable);
    }
    let available = adapters.len();
    let adapter = adapters
        .into_iter()
        .nth(config.adapter_index)
        .ok_or(BleError::AdapterIndexOutOfRange {
            index: config.adapter_index,
            available,
        })?;

    info!("BLE adapter {} initialized", config.adapter_index);
    Ok(adapter)
}

// ----------------------------------------------------------------------------
// Discovery Implementation
// ----------------------------------------------------------------------------

/// Scanning state of the central adapter
pub(crate) struct BleDiscovery {
    adapter: Adapter,
    /// Service being scanned for, `None` while not scanning
    scan_filter: Option<Uuid>,
}

impl BleDiscovery {
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            scan_filter: None,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_filter.is_some()
    }

    /// Start scanning for peripherals advertising `service`
    pub async fn start_scanning(&mut self, service: Uuid) -> Result<()> {
        let scan_filter = ScanFilter {
            services: vec![service],
        };
        self.adapter.start_scan(scan_filter).await?;
        self.scan_filter = Some(service);
        info!("Started BLE scanning for {service}");
        Ok(())
    }

    pub async fn stop_scanning(&mut self) -> Result<()> {
        if self.scan_filter.take().is_some() {
            self.adapter.stop_scan().await?;
            debug!("Stopped BLE scanning");
        }
        Ok(())
    }

    /// Translate an adapter event into a session event
    ///
    /// Discoveries are reported only while scanning, and only for devices
    /// whose advertisement carries the scanned service and an RSSI reading.
    /// A disconnect is reported only for a device the registry still
    /// considers connected, so a teardown we initiated is not reported twice.
    pub async fn process_discovery_event(
        &self,
        event: CentralEvent,
        peers: &mut PeerRegistry,
    ) -> Option<SessionEvent> {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let service = self.scan_filter?;
                let peripheral = self.adapter.peripheral(&id).await.ok()?;
                let properties = match peripheral.properties().await {
                    Ok(Some(properties)) => properties,
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("Failed to read properties of {id}: {e}");
                        return None;
                    }
                };
                if !properties.services.contains(&service) {
                    return None;
                }
                let rssi = properties.rssi?;

                let handle = handle_for(&id);
                peers.insert_discovered(handle.clone(), peripheral);
                Some(SessionEvent::PeerDiscovered { peer: handle, rssi })
            }
            CentralEvent::DeviceDisconnected(id) => {
                let handle = handle_for(&id);
                let peer = peers.get_mut(&handle)?;
                if !peer.is_connected() {
                    return None;
                }
                peer.mark_disconnected();
                debug!("Peer {handle} disconnected");
                Some(SessionEvent::Disconnected {
                    peer: handle,
                    error: None,
                })
            }
            _ => None,
        }
    }
}
