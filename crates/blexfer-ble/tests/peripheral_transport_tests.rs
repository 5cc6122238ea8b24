//! BlePeripheral against a scripted GATT server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use blexfer_ble::{BleConfig, BlePeripheral, FallbackGattServer, GattServer, NotifyLink, Result};
use blexfer_core::{
    CharacteristicHandle, GattService, PeerHandle, PeripheralConfig, PeripheralEvent,
    PeripheralTransport, TRANSFER_IDENTITY,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum ServerCall {
    PowerOn,
    Register(Uuid),
    Advertise(Uuid, String),
    StopAdvertising,
}

/// Records calls and hands out the notification link on registration
struct ScriptedServer {
    calls: Arc<Mutex<Vec<ServerCall>>>,
    links: mpsc::UnboundedSender<NotifyLink>,
    advertising: bool,
}

impl ScriptedServer {
    fn new() -> (Self, Arc<Mutex<Vec<ServerCall>>>, mpsc::UnboundedReceiver<NotifyLink>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let server = Self {
            calls: calls.clone(),
            links: links_tx,
            advertising: false,
        };
        (server, calls, links_rx)
    }

    fn record(&self, call: ServerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl GattServer for ScriptedServer {
    async fn power_on(&mut self) -> Result<()> {
        self.record(ServerCall::PowerOn);
        Ok(())
    }

    async fn register(&mut self, service: &GattService, link: &NotifyLink) -> Result<()> {
        self.record(ServerCall::Register(service.uuid));
        self.links.send(link.clone()).unwrap();
        Ok(())
    }

    async fn advertise(&mut self, service_id: Uuid, local_name: &str) -> Result<()> {
        self.record(ServerCall::Advertise(service_id, local_name.to_string()));
        self.advertising = true;
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<()> {
        self.record(ServerCall::StopAdvertising);
        self.advertising = false;
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.advertising
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<PeripheralEvent>) -> PeripheralEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn config(queue_depth: usize) -> BleConfig {
    BleConfig::new()
        .with_notification_queue_depth(queue_depth)
        .with_peripheral(PeripheralConfig::default().with_local_name("bench".to_string()))
}

/// Start a peripheral and register the transfer service
async fn registered(
    queue_depth: usize,
) -> (
    BlePeripheral,
    mpsc::UnboundedReceiver<PeripheralEvent>,
    NotifyLink,
    Arc<Mutex<Vec<ServerCall>>>,
) {
    let (server, calls, mut links) = ScriptedServer::new();
    let (mut peripheral, mut events, _task) = BlePeripheral::with_server(server, &config(queue_depth));
    assert_eq!(next_event(&mut events).await, PeripheralEvent::AdapterReady);

    peripheral.register_service(&GattService::from_identity(&TRANSFER_IDENTITY));
    let link = timeout(WAIT, links.recv())
        .await
        .expect("timed out waiting for registration")
        .expect("server dropped");
    (peripheral, events, link, calls)
}

#[tokio::test]
async fn test_unsupported_platform_reports_adapter_unavailable() {
    let (_peripheral, mut events, _task) =
        BlePeripheral::with_server(FallbackGattServer::new(), &BleConfig::default());

    assert_eq!(next_event(&mut events).await, PeripheralEvent::AdapterUnavailable);
}

#[tokio::test]
async fn test_commands_reach_server_in_order() {
    let (server, calls, _links) = ScriptedServer::new();
    let (mut peripheral, mut events, task) = BlePeripheral::with_server(server, &config(4));
    assert_eq!(next_event(&mut events).await, PeripheralEvent::AdapterReady);

    peripheral.register_service(&GattService::from_identity(&TRANSFER_IDENTITY));
    peripheral.advertise(TRANSFER_IDENTITY.service_id);
    peripheral.stop_advertise();
    peripheral.advertise(TRANSFER_IDENTITY.service_id);
    drop(peripheral);
    timeout(WAIT, task).await.unwrap().unwrap();

    let service = TRANSFER_IDENTITY.service_id;
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            ServerCall::PowerOn,
            ServerCall::Register(service),
            ServerCall::Advertise(service, "bench".to_string()),
            ServerCall::StopAdvertising,
            ServerCall::Advertise(service, "bench".to_string()),
            // Still advertising when the handle went away
            ServerCall::StopAdvertising,
        ]
    );
}

#[tokio::test]
async fn test_send_without_subscriber_is_accepted_and_dropped() {
    let (mut peripheral, _events, link, _calls) = registered(2).await;
    let characteristic = CharacteristicHandle::transfer();

    for _ in 0..5 {
        assert!(peripheral.send(&characteristic, b"chunk"));
    }
    assert!(!link.is_subscribed());
}

#[tokio::test]
async fn test_full_queue_refuses_until_subscriber_drains() {
    let (mut peripheral, mut events, link, _calls) = registered(2).await;
    let characteristic = CharacteristicHandle::transfer();
    let subscriber = PeerHandle::new("bluez-subscriber-0");

    assert!(link.begin_subscription(&subscriber, &characteristic));
    assert_eq!(
        next_event(&mut events).await,
        PeripheralEvent::Subscribed {
            peer: subscriber.clone(),
            characteristic: characteristic.clone(),
        }
    );

    assert!(peripheral.send(&characteristic, b"one"));
    assert!(peripheral.send(&characteristic, b"two"));
    assert!(!peripheral.send(&characteristic, b"three"));

    assert_eq!(link.next_value().await, Some(b"one".to_vec()));
    assert_eq!(next_event(&mut events).await, PeripheralEvent::ReadyToSendMore);
    assert!(peripheral.send(&characteristic, b"three"));
    assert_eq!(link.next_value().await, Some(b"two".to_vec()));
    assert_eq!(link.next_value().await, Some(b"three".to_vec()));
}

#[tokio::test]
async fn test_second_subscriber_is_rejected() {
    let (_peripheral, mut events, link, _calls) = registered(2).await;
    let characteristic = CharacteristicHandle::transfer();
    let first = PeerHandle::new("bluez-subscriber-0");
    let second = PeerHandle::new("bluez-subscriber-1");

    assert!(link.begin_subscription(&first, &characteristic));
    assert!(!link.begin_subscription(&second, &characteristic));

    assert!(matches!(
        next_event(&mut events).await,
        PeripheralEvent::Subscribed { peer, .. } if peer == first
    ));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribe_drops_queued_values() {
    let (mut peripheral, mut events, link, _calls) = registered(4).await;
    let characteristic = CharacteristicHandle::transfer();
    let subscriber = PeerHandle::new("bluez-subscriber-0");

    link.begin_subscription(&subscriber, &characteristic);
    next_event(&mut events).await;
    assert!(peripheral.send(&characteristic, b"stale"));

    link.end_subscription(&subscriber, &characteristic);
    assert_eq!(
        next_event(&mut events).await,
        PeripheralEvent::Unsubscribed {
            peer: subscriber,
            characteristic,
        }
    );
    assert!(!link.is_subscribed());

    drop(peripheral);
    assert_eq!(link.next_value().await, None);
}

#[tokio::test]
async fn test_next_subscriber_starts_from_an_empty_queue() {
    let (mut peripheral, mut events, link, _calls) = registered(4).await;
    let characteristic = CharacteristicHandle::transfer();
    let first = PeerHandle::new("bluez-subscriber-0");
    let second = PeerHandle::new("bluez-subscriber-1");

    assert!(link.begin_subscription(&first, &characteristic));
    assert!(peripheral.send(&characteristic, b"old-1"));
    link.end_subscription(&first, &characteristic);

    // Sent after the first subscriber left: accepted, never delivered
    assert!(peripheral.send(&characteristic, b"old-2"));

    assert!(link.begin_subscription(&second, &characteristic));
    assert!(peripheral.send(&characteristic, b"new"));
    assert_eq!(link.next_value().await, Some(b"new".to_vec()));

    let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|event| !matches!(event, PeripheralEvent::ReadyToSendMore))
        .collect();
    assert_eq!(kinds.len(), 3);
    assert!(matches!(&kinds[2], PeripheralEvent::Subscribed { peer, .. } if *peer == second));
}
