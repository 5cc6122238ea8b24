//! Peripheral transport handle and its worker

use blexfer_core::{
    CharacteristicHandle, GattService, PeripheralEvent, PeripheralTransport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::BleConfig;

use super::{GattServer, NotifyLink, PlatformGattServer};

#[derive(Debug)]
enum PeripheralOp {
    Register(GattService),
    Advertise(Uuid),
    StopAdvertise,
}

// ----------------------------------------------------------------------------
// Peripheral Handle
// ----------------------------------------------------------------------------

/// Peripheral transport backed by a [`GattServer`]
///
/// `send` is answered synchronously from the notification queue; the other
/// commands are carried out by the worker. Dropping the handle stops the
/// worker, which stops advertising.
#[derive(Debug)]
pub struct BlePeripheral {
    ops: mpsc::UnboundedSender<PeripheralOp>,
    link: NotifyLink,
}

impl BlePeripheral {
    /// Start the peripheral on the platform GATT server
    ///
    /// Must be called within a tokio runtime. The first event is
    /// `AdapterReady`, or `AdapterUnavailable` when the platform cannot act as
    /// a peripheral.
    pub fn start(
        config: &BleConfig,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<PeripheralEvent>,
        JoinHandle<()>,
    ) {
        Self::with_server(PlatformGattServer::new(config.adapter_index), config)
    }

    /// Start the peripheral on a caller-provided server
    pub fn with_server<S>(
        server: S,
        config: &BleConfig,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<PeripheralEvent>,
        JoinHandle<()>,
    )
    where
        S: GattServer + 'static,
    {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = NotifyLink::new(config.notification_queue_depth, events_tx);

        let worker = PeripheralWorker {
            server,
            link: link.clone(),
            local_name: config.peripheral.local_name.clone(),
        };
        let task = tokio::spawn(worker.run(ops_rx));

        (Self { ops: ops_tx, link }, events_rx, task)
    }

    fn submit(&self, op: PeripheralOp) {
        if self.ops.send(op).is_err() {
            warn!("BLE peripheral worker stopped, dropping command");
        }
    }
}

impl PeripheralTransport for BlePeripheral {
    fn register_service(&mut self, service: &GattService) {
        self.submit(PeripheralOp::Register(service.clone()));
    }

    fn advertise(&mut self, service_id: Uuid) {
        self.submit(PeripheralOp::Advertise(service_id));
    }

    fn stop_advertise(&mut self) {
        self.submit(PeripheralOp::StopAdvertise);
    }

    fn send(&mut self, characteristic: &CharacteristicHandle, value: &[u8]) -> bool {
        trace!("Offering {} bytes on {}", value.len(), characteristic.uuid);
        self.link.offer(value)
    }
}

impl Drop for BlePeripheral {
    fn drop(&mut self) {
        self.link.close();
    }
}

// ----------------------------------------------------------------------------
// Peripheral Worker
// ----------------------------------------------------------------------------

struct PeripheralWorker<S> {
    server: S,
    link: NotifyLink,
    local_name: String,
}

impl<S: GattServer> PeripheralWorker<S> {
    async fn run(mut self, mut ops: mpsc::UnboundedReceiver<PeripheralOp>) {
        info!("BLE peripheral worker starting");
        match self.server.power_on().await {
            Ok(()) => self.link.emit(PeripheralEvent::AdapterReady),
            Err(e) => {
                warn!("BLE peripheral adapter unavailable: {e}");
                self.link.emit(PeripheralEvent::AdapterUnavailable);
            }
        }

        while let Some(op) = ops.recv().await {
            self.process_op(op).await;
        }

        if self.server.is_advertising() {
            if let Err(e) = self.server.stop_advertising().await {
                error!("Failed to stop advertising on shutdown: {e}");
            }
        }
        info!("BLE peripheral worker stopped");
    }

    async fn process_op(&mut self, op: PeripheralOp) {
        debug!("Peripheral op: {op:?}");
        let result = match op {
            PeripheralOp::Register(service) => self.server.register(&service, &self.link).await,
            PeripheralOp::Advertise(service_id) => {
                self.server.advertise(service_id, &self.local_name).await
            }
            PeripheralOp::StopAdvertise => self.server.stop_advertising().await,
        };
        if let Err(e) = result {
            error!("BLE peripheral operation failed: {e}");
        }
    }
}
