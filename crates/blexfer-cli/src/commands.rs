//! Command handlers for the blexfer CLI

use blexfer_ble::{BlePeripheral, BtleplugCentral};
use blexfer_core::{
    loopback, CentralDriver, CentralNotice, CentralSession, PeripheralDriver, PeripheralNotice,
    PeripheralSession,
};
use tracing::{info, warn};

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Central { once } => Self::handle_central_command(config, once).await,
            Commands::Peripheral { message, name } => {
                Self::handle_peripheral_command(config, message, name).await
            }
            Commands::Loopback {
                message,
                queue_depth,
            } => {
                let received = run_loopback(&config, message.into_bytes(), queue_depth).await?;
                println!("{}", String::from_utf8_lossy(&received));
                Ok(())
            }
        }
    }

    /// Receive messages from nearby peripherals until interrupted
    async fn handle_central_command(config: AppConfig, once: bool) -> Result<()> {
        let mut central_config = config.ble.central.clone();
        if once {
            central_config = central_config.with_rescan_on_complete(false);
        }

        let (central, events, worker) = BtleplugCentral::start(&config.ble).await?;
        let (handle, mut notices, task) =
            CentralDriver::spawn(CentralSession::new(central_config), central, events);
        info!("Scanning for peripherals... Press Ctrl+C to stop");

        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Some(CentralNotice::MessageReceived(message)) => {
                        println!("{}", String::from_utf8_lossy(&message));
                        if once {
                            break;
                        }
                    }
                    Some(CentralNotice::Failure(error)) => warn!("Transfer failed: {error}"),
                    Some(CentralNotice::StateChanged { .. }) => {}
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        // The driver may already be gone if the adapter disappeared
        if let Err(e) = handle.shutdown().await {
            warn!("Central driver already stopped: {e}");
        }
        task.await?;
        worker.await?;
        Ok(())
    }

    /// Serve `message` to every subscriber until interrupted
    async fn handle_peripheral_command(
        config: AppConfig,
        message: String,
        name: Option<String>,
    ) -> Result<()> {
        let mut ble_config = config.ble;
        if let Some(name) = name {
            ble_config.peripheral = ble_config.peripheral.with_local_name(name);
        }
        ble_config.peripheral.validate()?;

        let (peripheral, events, worker) = BlePeripheral::start(&ble_config);
        let session = PeripheralSession::new(ble_config.peripheral.clone()).with_message(message);
        let (handle, mut notices, task) = PeripheralDriver::spawn(session, peripheral, events);
        handle.start_advertising().await?;
        info!("Advertising as '{}'... Press Ctrl+C to stop", ble_config.peripheral.local_name);

        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Some(PeripheralNotice::TransmissionComplete { bytes }) => {
                        info!("Sent {bytes} bytes to subscriber");
                    }
                    Some(PeripheralNotice::MarkerCollision { offset }) => {
                        warn!("Message chunk at offset {offset} reads as the end marker; the receiver will stop early");
                    }
                    Some(PeripheralNotice::StateChanged { .. }) => {}
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        if let Err(e) = handle.shutdown().await {
            warn!("Peripheral driver already stopped: {e}");
        }
        task.await?;
        worker.await?;
        Ok(())
    }
}

/// Transfer `message` between an in-memory central and peripheral
///
/// Returns the message as reassembled by the central.
pub async fn run_loopback(config: &AppConfig, message: Vec<u8>, queue_depth: usize) -> Result<Vec<u8>> {
    let pair = loopback::pair(queue_depth);
    let radio = tokio::spawn(pair.radio.run());

    let peripheral = PeripheralSession::new(config.ble.peripheral.clone()).with_message(message);
    let (producer, _produced, producer_task) =
        PeripheralDriver::spawn(peripheral, pair.peripheral, pair.peripheral_events);

    let central = CentralSession::new(config.ble.central.clone().with_rescan_on_complete(false));
    let (consumer, mut received, consumer_task) =
        CentralDriver::spawn(central, pair.central, pair.central_events);

    pair.power.power_on();
    producer.start_advertising().await?;

    let mut message = None;
    while let Some(notice) = received.recv().await {
        match notice {
            CentralNotice::MessageReceived(bytes) => {
                message = Some(bytes);
                break;
            }
            CentralNotice::Failure(error) => warn!("Loopback transfer failed: {error}"),
            CentralNotice::StateChanged { .. } => {}
        }
    }

    consumer.shutdown().await?;
    consumer_task.await?;
    producer.shutdown().await?;
    producer_task.await?;
    radio.abort();

    message.ok_or(CliError::NoMessage)
}
