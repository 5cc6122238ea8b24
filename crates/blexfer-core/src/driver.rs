//! Session drivers
//!
//! Each session is owned by a single tokio task that takes transport events
//! and application commands from channels and handles them one at a time, so
//! handlers never run concurrently and no lock is held across events.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::central::{CentralNotice, CentralSession, CentralState};
use crate::errors::{BlexferError, Result};
use crate::peripheral::{PeripheralNotice, PeripheralSession};
use crate::transport::{CentralEvent, CentralTransport, PeripheralEvent, PeripheralTransport};

const COMMAND_CHANNEL_DEPTH: usize = 32;

// ----------------------------------------------------------------------------
// Commands and Handles
// ----------------------------------------------------------------------------

/// Commands accepted by a running central session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralCommand {
    /// Stop scanning, release the peer, then stop the driver
    Shutdown,
}

/// Commands accepted by a running peripheral session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralCommand {
    SetMessage(Vec<u8>),
    StartAdvertising,
    StopAdvertising,
    Shutdown,
}

/// Cloneable handle for sending commands to a [`CentralDriver`]
#[derive(Debug, Clone)]
pub struct CentralHandle {
    commands: mpsc::Sender<CentralCommand>,
}

impl CentralHandle {
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(CentralCommand::Shutdown)
            .await
            .map_err(|_| BlexferError::channel_error("central driver stopped"))
    }
}

/// Cloneable handle for sending commands to a [`PeripheralDriver`]
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    commands: mpsc::Sender<PeripheralCommand>,
}

impl PeripheralHandle {
    async fn send(&self, command: PeripheralCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BlexferError::channel_error("peripheral driver stopped"))
    }

    pub async fn set_message(&self, message: impl Into<Vec<u8>>) -> Result<()> {
        self.send(PeripheralCommand::SetMessage(message.into()))
            .await
    }

    pub async fn start_advertising(&self) -> Result<()> {
        self.send(PeripheralCommand::StartAdvertising).await
    }

    pub async fn stop_advertising(&self) -> Result<()> {
        self.send(PeripheralCommand::StopAdvertising).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(PeripheralCommand::Shutdown).await
    }
}

// ----------------------------------------------------------------------------
// Central Driver
// ----------------------------------------------------------------------------

/// Task owning a [`CentralSession`] and its transport
pub struct CentralDriver<T> {
    session: CentralSession,
    transport: T,
    events: mpsc::UnboundedReceiver<CentralEvent>,
    commands: mpsc::Receiver<CentralCommand>,
    notices: mpsc::UnboundedSender<CentralNotice>,
    stopping: bool,
}

impl<T> CentralDriver<T>
where
    T: CentralTransport + Send + 'static,
{
    pub fn new(
        session: CentralSession,
        transport: T,
        events: mpsc::UnboundedReceiver<CentralEvent>,
    ) -> (
        Self,
        CentralHandle,
        mpsc::UnboundedReceiver<CentralNotice>,
    ) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_DEPTH);
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let driver = Self {
            session,
            transport,
            events,
            commands,
            notices,
            stopping: false,
        };
        (
            driver,
            CentralHandle {
                commands: command_tx,
            },
            notice_rx,
        )
    }

    /// Spawn the driver on the current tokio runtime
    pub fn spawn(
        session: CentralSession,
        transport: T,
        events: mpsc::UnboundedReceiver<CentralEvent>,
    ) -> (
        CentralHandle,
        mpsc::UnboundedReceiver<CentralNotice>,
        JoinHandle<()>,
    ) {
        let (driver, handle, notices) = Self::new(session, transport, events);
        let task = tokio::spawn(driver.run());
        (handle, notices, task)
    }

    /// Process events and commands until shut down or the event stream ends
    pub async fn run(mut self) {
        info!("Central driver starting");
        let mut commands_open = true;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            debug!("Central event: {}", event.name());
                            let notices = self.session.handle_event(&mut self.transport, event);
                            self.publish(notices);
                        }
                        None => {
                            info!("Central event stream closed, shutting down");
                            break;
                        }
                    }
                }

                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(CentralCommand::Shutdown) => {
                            info!("Central shutdown requested");
                            self.stopping = true;
                            let notices = self.session.shutdown(&mut self.transport);
                            self.publish(notices);
                        }
                        None => commands_open = false,
                    }
                }
            }

            // Stay around until the teardown we asked for has landed
            if self.stopping && self.session.state() == CentralState::Idle {
                break;
            }
        }

        info!("Central driver stopped");
    }

    fn publish(&self, notices: Vec<CentralNotice>) {
        for notice in notices {
            // Nobody listening is fine
            let _ = self.notices.send(notice);
        }
    }
}

// ----------------------------------------------------------------------------
// Peripheral Driver
// ----------------------------------------------------------------------------

/// Task owning a [`PeripheralSession`] and its transport
pub struct PeripheralDriver<T> {
    session: PeripheralSession,
    transport: T,
    events: mpsc::UnboundedReceiver<PeripheralEvent>,
    commands: mpsc::Receiver<PeripheralCommand>,
    notices: mpsc::UnboundedSender<PeripheralNotice>,
}

impl<T> PeripheralDriver<T>
where
    T: PeripheralTransport + Send + 'static,
{
    pub fn new(
        session: PeripheralSession,
        transport: T,
        events: mpsc::UnboundedReceiver<PeripheralEvent>,
    ) -> (
        Self,
        PeripheralHandle,
        mpsc::UnboundedReceiver<PeripheralNotice>,
    ) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_DEPTH);
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let driver = Self {
            session,
            transport,
            events,
            commands,
            notices,
        };
        (
            driver,
            PeripheralHandle {
                commands: command_tx,
            },
            notice_rx,
        )
    }

    /// Spawn the driver on the current tokio runtime
    pub fn spawn(
        session: PeripheralSession,
        transport: T,
        events: mpsc::UnboundedReceiver<PeripheralEvent>,
    ) -> (
        PeripheralHandle,
        mpsc::UnboundedReceiver<PeripheralNotice>,
        JoinHandle<()>,
    ) {
        let (driver, handle, notices) = Self::new(session, transport, events);
        let task = tokio::spawn(driver.run());
        (handle, notices, task)
    }

    pub async fn run(mut self) {
        info!("Peripheral driver starting");
        let mut commands_open = true;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            let notices = self.session.handle_event(&mut self.transport, event);
                            self.publish(notices);
                        }
                        None => {
                            info!("Peripheral event stream closed, shutting down");
                            break;
                        }
                    }
                }

                command = self.commands.recv(), if commands_open => {
                    let notices = match command {
                        Some(PeripheralCommand::SetMessage(message)) => {
                            self.session.set_message(&mut self.transport, message)
                        }
                        Some(PeripheralCommand::StartAdvertising) => {
                            self.session.start_advertising(&mut self.transport)
                        }
                        Some(PeripheralCommand::StopAdvertising) => {
                            self.session.stop_advertising(&mut self.transport)
                        }
                        Some(PeripheralCommand::Shutdown) => {
                            info!("Peripheral shutdown requested");
                            let notices = self.session.shutdown(&mut self.transport);
                            self.publish(notices);
                            break;
                        }
                        None => {
                            commands_open = false;
                            Vec::new()
                        }
                    };
                    self.publish(notices);
                }
            }
        }

        info!("Peripheral driver stopped");
    }

    fn publish(&self, notices: Vec<PeripheralNotice>) {
        for notice in notices {
            let _ = self.notices.send(notice);
        }
    }
}
