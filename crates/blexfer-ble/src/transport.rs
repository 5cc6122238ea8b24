//! btleplug-backed central transport
//!
//! [`BtleplugCentral`] is the synchronous command handle a `CentralSession`
//! drives. Commands are queued to a worker task that owns the adapter and the
//! peer registry; the worker performs each BLE call in issue order and
//! reports the outcome on the session's event channel.

use blexfer_core::{
    CentralEvent as SessionEvent, CentralTransport, CharacteristicHandle, PeerHandle,
    ServiceHandle, TransportFault,
};
use btleplug::api::Central;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BleConfig;
use crate::connection::BleConnection;
use crate::discovery::{initialize_adapter, BleDiscovery};
use crate::error::{BleError, Result};
use crate::peer::PeerRegistry;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum CentralOp {
    Scan(Uuid),
    StopScan,
    Connect(PeerHandle),
    Disconnect(PeerHandle),
    DiscoverServices(PeerHandle, Uuid),
    DiscoverCharacteristics(PeerHandle, ServiceHandle, Uuid),
    Subscribe(PeerHandle, CharacteristicHandle),
    Unsubscribe(PeerHandle, CharacteristicHandle),
}

// ----------------------------------------------------------------------------
// Central Handle
// ----------------------------------------------------------------------------

/// Central transport backed by btleplug
#[derive(Debug, Clone)]
pub struct BtleplugCentral {
    ops: mpsc::UnboundedSender<CentralOp>,
}

impl BtleplugCentral {
    /// Open the configured adapter and start the worker
    ///
    /// Returns the transport handle, the event stream to feed the session
    /// and the worker task. `AdapterReady` is the first event on the stream.
    pub async fn start(
        config: &BleConfig,
    ) -> Result<(
        Self,
        mpsc::UnboundedReceiver<SessionEvent>,
        JoinHandle<()>,
    )> {
        let adapter = initialize_adapter(config).await?;
        let adapter_events = adapter
            .events()
            .await
            .map_err(|e| BleError::EventStreamFailed(e.to_string()))?;

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let worker = CentralWorker {
            discovery: BleDiscovery::new(adapter),
            connection: BleConnection::new(config.connection_timeout(), events_tx.clone()),
            peers: PeerRegistry::new(),
            events: events_tx,
        };
        let task = tokio::spawn(worker.run(ops_rx, adapter_events));

        Ok((Self { ops: ops_tx }, events_rx, task))
    }

    fn submit(&self, op: CentralOp) {
        if self.ops.send(op).is_err() {
            warn!("BLE central worker stopped, dropping command");
        }
    }
}

impl CentralTransport for BtleplugCentral {
    fn scan(&mut self, service_filter: Uuid) {
        self.submit(CentralOp::Scan(service_filter));
    }

    fn stop_scan(&mut self) {
        self.submit(CentralOp::StopScan);
    }

    fn connect(&mut self, peer: &PeerHandle) {
        self.submit(CentralOp::Connect(peer.clone()));
    }

    fn disconnect(&mut self, peer: &PeerHandle) {
        self.submit(CentralOp::Disconnect(peer.clone()));
    }

    fn discover_services(&mut self, peer: &PeerHandle, service_filter: Uuid) {
        self.submit(CentralOp::DiscoverServices(peer.clone(), service_filter));
    }

    fn discover_characteristics(
        &mut self,
        peer: &PeerHandle,
        service: &ServiceHandle,
        characteristic_filter: Uuid,
    ) {
        self.submit(CentralOp::DiscoverCharacteristics(
            peer.clone(),
            service.clone(),
            characteristic_filter,
        ));
    }

    fn subscribe(&mut self, peer: &PeerHandle, characteristic: &CharacteristicHandle) {
        self.submit(CentralOp::Subscribe(peer.clone(), characteristic.clone()));
    }

    fn unsubscribe(&mut self, peer: &PeerHandle, characteristic: &CharacteristicHandle) {
        self.submit(CentralOp::Unsubscribe(peer.clone(), characteristic.clone()));
    }
}

// ----------------------------------------------------------------------------
// Central Worker
// ----------------------------------------------------------------------------

struct CentralWorker {
    discovery: BleDiscovery,
    connection: BleConnection,
    peers: PeerRegistry,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl CentralWorker {
    async fn run(
        mut self,
        mut ops: mpsc::UnboundedReceiver<CentralOp>,
        mut adapter_events: std::pin::Pin<
            Box<dyn futures::Stream<Item = btleplug::api::CentralEvent> + Send>,
        >,
    ) {
        info!("BLE central worker starting");
        self.emit(SessionEvent::AdapterReady);

        loop {
            tokio::select! {
                op = ops.recv() => {
                    match op {
                        Some(op) => self.process_op(op).await,
                        None => {
                            info!("Central transport dropped, shutting down");
                            break;
                        }
                    }
                }

                event = adapter_events.next() => {
                    match event {
                        Some(event) => {
                            if let Some(event) = self
                                .discovery
                                .process_discovery_event(event, &mut self.peers)
                                .await
                            {
                                self.emit(event);
                            }
                        }
                        None => {
                            error!("BLE adapter event stream ended");
                            self.peers.disconnect_all();
                            self.emit(SessionEvent::AdapterUnavailable);
                            break;
                        }
                    }
                }
            }
        }

        if self.discovery.is_scanning() {
            if let Err(e) = self.discovery.stop_scanning().await {
                debug!("Stopping scan on shutdown: {e}");
            }
        }
        info!("BLE central worker stopped");
    }

    async fn process_op(&mut self, op: CentralOp) {
        debug!("Central op: {op:?}");
        let event = match op {
            CentralOp::Scan(service) => {
                let pruned = self.peers.prune_disconnected();
                if pruned > 0 {
                    debug!("Forgot {pruned} disconnected peers before scanning");
                }
                scan_outcome(self.discovery.start_scanning(service).await)
            }
            CentralOp::StopScan => {
                if let Err(e) = self.discovery.stop_scanning().await {
                    error!("Failed to stop BLE scan: {e}");
                }
                None
            }
            CentralOp::Connect(handle) => Some(match self.peers.get_mut(&handle) {
                Some(peer) => self.connection.connect(peer).await,
                None => SessionEvent::ConnectFailed {
                    error: not_found(&handle),
                    peer: handle,
                },
            }),
            CentralOp::Disconnect(handle) => Some(match self.peers.get_mut(&handle) {
                Some(peer) => self.connection.disconnect(peer).await,
                None => SessionEvent::Disconnected {
                    peer: handle,
                    error: None,
                },
            }),
            CentralOp::DiscoverServices(handle, filter) => Some(match self.peers.get(&handle) {
                Some(peer) => self.connection.discover_services(peer, filter).await,
                None => SessionEvent::ServicesDiscovered {
                    services: Vec::new(),
                    error: Some(not_found(&handle)),
                    peer: handle,
                },
            }),
            CentralOp::DiscoverCharacteristics(handle, service, filter) => {
                Some(match self.peers.get(&handle) {
                    Some(peer) => self
                        .connection
                        .discover_characteristics(peer, &service, filter),
                    None => SessionEvent::CharacteristicsDiscovered {
                        service,
                        characteristics: Vec::new(),
                        error: Some(not_found(&handle)),
                        peer: handle,
                    },
                })
            }
            CentralOp::Subscribe(handle, characteristic) => Some(match self.peers.get_mut(&handle) {
                Some(peer) => self.connection.subscribe(peer, &characteristic).await,
                None => SessionEvent::SubscriptionChanged {
                    characteristic,
                    is_active: false,
                    error: Some(not_found(&handle)),
                    peer: handle,
                },
            }),
            CentralOp::Unsubscribe(handle, characteristic) => {
                Some(match self.peers.get_mut(&handle) {
                    Some(peer) => self.connection.unsubscribe(peer, &characteristic).await,
                    None => SessionEvent::SubscriptionChanged {
                        characteristic,
                        is_active: false,
                        error: None,
                        peer: handle,
                    },
                })
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The session may already be gone
        let _ = self.events.send(event);
    }
}

/// A scan that cannot start leaves the central with nothing to discover
fn scan_outcome(result: Result<()>) -> Option<SessionEvent> {
    match result {
        Ok(()) => None,
        Err(e) => {
            error!("Failed to start BLE scan: {e}");
            Some(SessionEvent::AdapterUnavailable)
        }
    }
}

fn not_found(handle: &PeerHandle) -> TransportFault {
    BleError::PeerNotFound {
        peer: handle.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_failure_reports_adapter_unavailable() {
        assert_eq!(
            scan_outcome(Err(BleError::AdapterNotAvailable)),
            Some(SessionEvent::AdapterUnavailable)
        );
        assert_eq!(scan_outcome(Ok(())), None);
    }
}
