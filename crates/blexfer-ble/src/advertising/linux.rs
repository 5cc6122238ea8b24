//! Linux GATT server and advertising using bluer (BlueZ)

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use blexfer_core::{CharacteristicHandle, GattService, PeerHandle};
use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotifier,
    CharacteristicNotify, CharacteristicNotifyMethod, CharacteristicRead, ReqError, Service,
};
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BleError, Result};

use super::{GattServer, NotifyLink};

// ----------------------------------------------------------------------------
// Linux Implementation
// ----------------------------------------------------------------------------

pub struct LinuxGattServer {
    adapter_index: usize,
    _session: Option<bluer::Session>,
    adapter: Option<bluer::Adapter>,
    _application: Option<ApplicationHandle>,
    advertisement: Option<AdvertisementHandle>,
    /// Numbers the synthetic handles given to subscribers
    subscribers: Arc<AtomicUsize>,
}

impl LinuxGattServer {
    pub fn new(adapter_index: usize) -> Self {
        Self {
            adapter_index,
            _session: None,
            adapter: None,
            _application: None,
            advertisement: None,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn adapter(&self) -> Result<&bluer::Adapter> {
        self.adapter.as_ref().ok_or(BleError::AdapterNotAvailable)
    }

    fn transfer_characteristic(&self, handle: &CharacteristicHandle, link: &NotifyLink) -> Characteristic {
        let link = link.clone();
        let handle_for_notify = handle.clone();
        let subscribers = self.subscribers.clone();

        Characteristic {
            uuid: handle.uuid,
            read: Some(CharacteristicRead {
                read: true,
                fun: Box::new(|_request| async { Ok::<_, ReqError>(Vec::new()) }.boxed()),
                ..Default::default()
            }),
            notify: Some(CharacteristicNotify {
                notify: true,
                method: CharacteristicNotifyMethod::Fun(Box::new(move |notifier| {
                    let number = subscribers.fetch_add(1, Ordering::Relaxed);
                    let peer = PeerHandle::new(format!("bluez-subscriber-{number}"));
                    serve_subscriber(link.clone(), peer, handle_for_notify.clone(), notifier)
                        .boxed()
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Forward queued values to one subscriber until it stops listening
async fn serve_subscriber(
    link: NotifyLink,
    peer: PeerHandle,
    characteristic: CharacteristicHandle,
    mut notifier: CharacteristicNotifier,
) {
    if !link.begin_subscription(&peer, &characteristic) {
        return;
    }
    info!("Subscriber {peer} enabled notifications");

    loop {
        let next = tokio::select! {
            _ = notifier.stopped() => None,
            next = link.next_value() => next,
        };
        let Some(value) = next else {
            break;
        };
        if let Err(e) = notifier.notify(value).await {
            warn!("Failed to notify {peer}: {e}");
            break;
        }
    }

    info!("Subscriber {peer} stopped notifications");
    link.end_subscription(&peer, &characteristic);
}

#[async_trait::async_trait]
impl GattServer for LinuxGattServer {
    async fn power_on(&mut self) -> Result<()> {
        if self.adapter.is_some() {
            return Ok(());
        }

        let session = bluer::Session::new().await?;
        let names = session.adapter_names().await?;
        let name = names
            .get(self.adapter_index)
            .ok_or(BleError::AdapterIndexOutOfRange {
                index: self.adapter_index,
                available: names.len(),
            })?;
        let adapter = session.adapter(name)?;

        // Enable adapter if needed
        if !adapter.is_powered().await? {
            adapter.set_powered(true).await?;
        }

        info!("Linux BLE adapter {name} initialized for the peripheral role");
        self._session = Some(session);
        self.adapter = Some(adapter);
        Ok(())
    }

    async fn register(&mut self, service: &GattService, link: &NotifyLink) -> Result<()> {
        let characteristics = service
            .characteristics
            .iter()
            .map(|handle| self.transfer_characteristic(handle, link))
            .collect();
        let application = Application {
            services: vec![Service {
                uuid: service.uuid,
                primary: service.primary,
                characteristics,
                ..Default::default()
            }],
            ..Default::default()
        };

        let handle = self
            .adapter()?
            .serve_gatt_application(application)
            .await
            .map_err(|e| BleError::GattRegistrationFailed(e.to_string()))?;

        // Replacing the handle unregisters any previous application
        self._application = Some(handle);
        info!("Registered GATT service {}", service.uuid);
        Ok(())
    }

    async fn advertise(&mut self, service_id: Uuid, local_name: &str) -> Result<()> {
        if self.advertisement.is_some() {
            debug!("Already advertising {service_id}");
            return Ok(());
        }

        let advertisement = Advertisement {
            advertisement_type: bluer::adv::Type::Peripheral,
            service_uuids: BTreeSet::from([service_id]),
            local_name: Some(local_name.to_string()),
            discoverable: Some(true),
            ..Default::default()
        };

        let handle = self
            .adapter()?
            .advertise(advertisement)
            .await
            .map_err(|e| BleError::AdvertisingFailed(e.to_string()))?;

        self.advertisement = Some(handle);
        info!("Started BLE advertising {service_id} as '{local_name}'");
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<()> {
        if let Some(handle) = self.advertisement.take() {
            drop(handle); // Dropping the handle stops advertising
            info!("Stopped BLE advertising");
        }
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.advertisement.is_some()
    }
}
