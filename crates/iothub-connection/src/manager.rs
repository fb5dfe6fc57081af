//! Connection state machine.
//!
//! [`ConnectionManager`] owns the hub identity, the connection status and
//! the transport session. Every method takes `&mut self`: the manager is
//! driven from a single task (see [`ConnectionService`](crate::ConnectionService))
//! and transport callbacks reach it only through [`on_transport_event`].
//!
//! [`on_transport_event`]: ConnectionManager::on_transport_event

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use zeroize::Zeroizing;

use crate::error::ConnectionError;
use crate::store::CredentialStore;
use crate::transport::{
    Transport, TransportErrorKind, TransportEvent, TransportEventSender, TransportSession,
};
use crate::types::{CONNECTION_STRING_KEY, ConnectionStatus, Identity, ManagerSettings};

/// Drives one hub connection.
pub struct ConnectionManager<T: Transport> {
    settings: ManagerSettings,
    identity: Option<Identity>,
    status: ConnectionStatus,
    transport: T,
    session: Option<T::Session>,
    store: Option<Box<dyn CredentialStore>>,
    transport_tx: TransportEventSender,
    events_tx: mpsc::UnboundedSender<ConnectionStatus>,
    events_rx: Option<mpsc::UnboundedReceiver<ConnectionStatus>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates a manager in the `Disconnected` state with no identity.
    ///
    /// `transport_tx` is handed to the transport on `init`; its receiving
    /// half must be drained into [`on_transport_event`](Self::on_transport_event).
    pub fn new(
        transport: T,
        store: Option<Box<dyn CredentialStore>>,
        settings: ManagerSettings,
        transport_tx: TransportEventSender,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            identity: None,
            status: ConnectionStatus::Disconnected,
            transport,
            session: None,
            store,
            transport_tx,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the status-change receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ConnectionStatus>> {
        self.events_rx.take()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn hub_name(&self) -> Option<&str> {
        self.identity.as_ref().map(Identity::hub_name)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.identity.as_ref().map(Identity::device_id)
    }

    /// Returns true once a transport session has been created.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Applies the connection string saved in the credential store, if any.
    ///
    /// The stored bytes are not written back.
    pub fn load_persisted(&mut self) -> Result<(), ConnectionError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        let raw = match store.load(CONNECTION_STRING_KEY) {
            Ok(Some(raw)) => Zeroizing::new(raw),
            Ok(None) => {
                debug!("no stored connection string");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "failed loading stored connection string");
                return Err(e.into());
            }
        };
        self.set_credentials(&raw, false)
    }

    /// Installs a new connection string, or clears the identity when `raw`
    /// is empty, then reconnects.
    ///
    /// Nothing changes on a parse or signing error, nor when the transport
    /// rejects the derived configuration: the previous identity, status and
    /// stored string are left alone. The store is only written once the
    /// transport accepted the change; a persistence error is returned with
    /// the new identity already in place.
    pub fn set_credentials(&mut self, raw: &[u8], persist: bool) -> Result<(), ConnectionError> {
        let identity = if raw.is_empty() {
            None
        } else {
            match Identity::from_connection_string(raw, self.settings.sas_expiry) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!(error = %e, "rejected connection string");
                    return Err(e.into());
                }
            }
        };

        let previous = std::mem::replace(&mut self.identity, identity);
        if let Err(e) = self.connect() {
            self.identity = previous;
            return Err(e);
        }

        match self.identity.as_ref() {
            Some(identity) => info!(
                hub = %identity.hub_name(),
                device = %identity.device_id(),
                "connection string installed"
            ),
            None => info!("connection string cleared"),
        }

        if !persist {
            return Ok(());
        }
        self.persist((!raw.is_empty()).then_some(raw))
    }

    /// Connects with the current identity, or disconnects when there is none.
    ///
    /// The first call creates and starts a transport session; later calls
    /// reconfigure it and force a reconnect. Status becomes `Connecting`
    /// once the transport accepted the request.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        let Some(identity) = self.identity.as_ref() else {
            self.disconnect();
            return Ok(());
        };
        let config = identity.transport_config(&self.settings.trust_anchors);
        info!(uri = %config.uri, device = %config.client_id, "connecting to hub");

        let result = if let Some(session) = self.session.as_mut() {
            session
                .reconfigure(&config)
                .and_then(|()| session.force_reconnect())
        } else {
            match self.transport.init(&config, self.transport_tx.clone()) {
                Ok(mut session) => {
                    session.start();
                    self.session = Some(session);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "transport rejected configuration");
            return Err(e.into());
        }

        self.set_status(ConnectionStatus::Connecting);
        Ok(())
    }

    /// Asks the transport to disconnect. No-op without a session.
    pub fn disconnect(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.set_status(ConnectionStatus::Disconnecting);
        if let Some(session) = self.session.as_mut() {
            session.disconnect();
        }
    }

    /// Handles an event posted by the transport.
    ///
    /// Only `Connected` and `Disconnected` change the status; everything
    /// else is logged.
    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.set_status(ConnectionStatus::Connected),
            TransportEvent::Disconnected => self.set_status(ConnectionStatus::Disconnected),
            TransportEvent::BeforeConnect => trace!("transport connecting"),
            TransportEvent::Subscribed { msg_id } => trace!(msg_id, "subscribed"),
            TransportEvent::Unsubscribed { msg_id } => trace!(msg_id, "unsubscribed"),
            TransportEvent::Published { msg_id } => trace!(msg_id, "published"),
            TransportEvent::Data {
                topic_len,
                data_len,
            } => debug!(topic_len, data_len, "data received"),
            TransportEvent::MessageDropped { msg_id } => debug!(msg_id, "mqtt msg dropped"),
            TransportEvent::Error(failure) => match failure.kind {
                TransportErrorKind::Unknown => {
                    warn!(reason = %failure.reason, "unknown transport error")
                }
                kind => warn!(
                    kind = ?kind,
                    code = ?failure.code,
                    reason = %failure.reason,
                    "transport error"
                ),
            },
        }
    }

    /// Writes (`Some`) or erases (`None`) the stored connection string.
    fn persist(&mut self, raw: Option<&[u8]>) -> Result<(), ConnectionError> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        let result = match raw {
            Some(raw) => store.save(CONNECTION_STRING_KEY, raw),
            None => store.erase(CONNECTION_STRING_KEY),
        }
        .and_then(|()| store.commit());

        result.map_err(|e| {
            warn!(error = %e, "failed persisting connection string");
            ConnectionError::Persistence(e)
        })
    }

    /// Updates the status, notifying only on an actual change.
    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        debug!(from = %self.status, to = %status, code = status.as_u16(), "status changed");
        self.status = status;
        if self.events_tx.send(status).is_err() {
            trace!("status listener gone");
        }
    }
}
