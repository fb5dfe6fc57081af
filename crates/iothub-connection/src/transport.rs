//! Transport collaborator interface.
//!
//! The manager never talks MQTT itself. It hands an [`MqttConfig`] to a
//! [`Transport`] and receives [`TransportEvent`]s back through a channel,
//! so callbacks raised on the transport's own task are marshaled into the
//! manager's context instead of mutating it directly.

use std::fmt;

use tokio::sync::mpsc;
use zeroize::Zeroizing;

/// Sending half of the channel transports post their events on.
pub type TransportEventSender = mpsc::Sender<TransportEvent>;

/// Capacity of the transport event channel.
pub const TRANSPORT_EVENT_CAPACITY: usize = 64;

/// Events reported by a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    BeforeConnect,
    Connected,
    Disconnected,
    Subscribed { msg_id: u16 },
    Unsubscribed { msg_id: u16 },
    Published { msg_id: u16 },
    Data { topic_len: usize, data_len: usize },
    MessageDropped { msg_id: u16 },
    Error(TransportFailure),
}

/// Category of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Socket or TLS failure.
    TcpTransport,
    /// The broker rejected the CONNECT.
    ConnectionRefused,
    Unknown,
}

/// Details of a transport failure, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    /// Platform error code (errno, CONNACK return code), if any.
    pub code: Option<i32>,
    pub reason: String,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{:?} (code {code:#x}): {}", self.kind, self.reason),
            None => write!(f, "{:?}: {}", self.kind, self.reason),
        }
    }
}

/// Root certificates used to validate the hub.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustAnchors {
    /// The platform's bundled root store.
    #[default]
    Platform,
    /// A PEM bundle supplied by the caller.
    Pem(Vec<u8>),
}

/// Session configuration handed to the transport.
#[derive(Clone)]
pub struct MqttConfig {
    /// Broker URI, e.g. `mqtts://myhub.azure-devices.net`.
    pub uri: String,
    pub client_id: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub trust_anchors: TrustAnchors,
}

impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("uri", &self.uri)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("trust_anchors", &self.trust_anchors)
            .finish()
    }
}

/// Errors from transport configuration calls.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid broker URI: {0}")]
    InvalidUri(String),

    #[error("invalid client id: {0:?}")]
    InvalidClientId(String),

    #[error("no async runtime available")]
    NoRuntime,
}

/// Factory for transport sessions.
pub trait Transport: Send {
    type Session: TransportSession + Send;

    /// Creates a session. Events for its whole lifetime go to `events`.
    fn init(
        &mut self,
        config: &MqttConfig,
        events: TransportEventSender,
    ) -> Result<Self::Session, TransportError>;
}

/// A live transport session.
///
/// All calls are fire-and-forget; completion is reported asynchronously
/// as [`TransportEvent::Connected`] / [`TransportEvent::Disconnected`].
pub trait TransportSession {
    /// Starts connecting with the configuration given to `init`.
    fn start(&mut self);

    /// Replaces the configuration used by the next connection attempt.
    fn reconfigure(&mut self, config: &MqttConfig) -> Result<(), TransportError>;

    /// Drops the current connection and connects again.
    fn force_reconnect(&mut self) -> Result<(), TransportError>;

    /// Requests a clean disconnect.
    fn disconnect(&mut self);
}
