//! Single-owner run loop for a [`ConnectionManager`].
//!
//! The service task is the only place the manager is touched. Transport
//! events and host commands both arrive over channels and are handled one
//! at a time, so the manager needs no locking.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::ConnectionError;
use crate::manager::ConnectionManager;
use crate::store::CredentialStore;
use crate::transport::{TRANSPORT_EVENT_CAPACITY, Transport, TransportEvent};
use crate::types::{ConnectionStatus, ManagerSettings};

/// Capacity of the host command channel.
const COMMAND_CAPACITY: usize = 16;

/// Host commands accepted by the service.
enum Command {
    SetConnectionString {
        raw: Zeroizing<Vec<u8>>,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Connect(oneshot::Sender<Result<(), ConnectionError>>),
    Disconnect(oneshot::Sender<()>),
    HubName(oneshot::Sender<Option<String>>),
    DeviceId(oneshot::Sender<Option<String>>),
    Status(oneshot::Sender<ConnectionStatus>),
}

/// Cloneable handle for sending host commands to a running service.
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<Command>,
}

impl ServiceHandle {
    /// Sets and persists a connection string. An empty string clears it.
    pub async fn set_connection_string(&self, raw: &[u8]) -> Result<(), ConnectionError> {
        let raw = Zeroizing::new(raw.to_vec());
        self.request(|reply| Command::SetConnectionString { raw, reply })
            .await?
    }

    /// Connects (or reconnects) with the current credentials.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.request(Command::Connect).await?
    }

    /// Requests a disconnect.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.request(Command::Disconnect).await
    }

    pub async fn hub_name(&self) -> Result<Option<String>, ConnectionError> {
        self.request(Command::HubName).await
    }

    pub async fn device_id(&self) -> Result<Option<String>, ConnectionError> {
        self.request(Command::DeviceId).await
    }

    pub async fn status(&self) -> Result<ConnectionStatus, ConnectionError> {
        self.request(Command::Status).await
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| ConnectionError::ServiceStopped)?;
        rx.await.map_err(|_| ConnectionError::ServiceStopped)
    }
}

/// Owns a [`ConnectionManager`] and the channels feeding it.
pub struct ConnectionService<T: Transport> {
    manager: ConnectionManager<T>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: mpsc::Receiver<Command>,
}

impl<T: Transport> ConnectionService<T> {
    /// Creates the service and its manager.
    pub fn new(
        transport: T,
        store: Option<Box<dyn CredentialStore>>,
        settings: ManagerSettings,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        Self {
            manager: ConnectionManager::new(transport, store, settings, transport_tx),
            transport_rx,
            commands_tx,
            commands_rx,
        }
    }

    /// Returns a handle for issuing host commands.
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Access to the manager before the loop starts (startup load,
    /// taking the status receiver).
    pub fn manager_mut(&mut self) -> &mut ConnectionManager<T> {
        &mut self.manager
    }

    /// Runs until `cancel` fires, then disconnects.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            mut manager,
            mut transport_rx,
            commands_tx,
            mut commands_rx,
        } = self;
        // Handles only clone the sender; keep ours alive so the loop ends
        // solely on cancellation.
        let _commands_tx = commands_tx;

        info!("connection service started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(event) = transport_rx.recv() => manager.on_transport_event(event),
                Some(command) = commands_rx.recv() => dispatch(&mut manager, command),
                else => break,
            }
        }

        manager.disconnect();
        info!("connection service stopped");
    }
}

/// Applies one host command and sends its reply.
fn dispatch<T: Transport>(manager: &mut ConnectionManager<T>, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::SetConnectionString { raw, reply } => {
            debug!(len = raw.len(), "set connection string");
            let _ = reply.send(manager.set_credentials(&raw, true));
        }
        Command::Connect(reply) => {
            let _ = reply.send(manager.connect());
        }
        Command::Disconnect(reply) => {
            manager.disconnect();
            let _ = reply.send(());
        }
        Command::HubName(reply) => {
            let _ = reply.send(manager.hub_name().map(str::to_string));
        }
        Command::DeviceId(reply) => {
            let _ = reply.send(manager.device_id().map(str::to_string));
        }
        Command::Status(reply) => {
            let _ = reply.send(manager.status());
        }
    }
}
