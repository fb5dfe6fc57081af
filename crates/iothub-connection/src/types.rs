//! Public types for the connection manager.

use std::fmt;
use std::time::Duration;

use iothub_auth::{AuthError, ConnectionString, DEFAULT_EXPIRY};
use rand::Rng;
use zeroize::Zeroizing;

use crate::transport::{MqttConfig, TrustAnchors};

/// API version sent in the MQTT username.
pub const API_VERSION: &str = "2018-06-30";

/// Credential store key holding the raw connection string.
pub const CONNECTION_STRING_KEY: &str = "conn_str";

/// Connection status reported to the host.
///
/// Discriminants are the 16-bit values of the status register and of the
/// status-change event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum ConnectionStatus {
    Connected = 1,
    #[default]
    Disconnected = 2,
    Connecting = 3,
    Disconnecting = 4,
}

impl ConnectionStatus {
    /// Returns the wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Parses a wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Connected),
            2 => Some(Self::Disconnected),
            3 => Some(Self::Connecting),
            4 => Some(Self::Disconnecting),
            _ => None,
        }
    }
}

impl From<ConnectionStatus> for u16 {
    fn from(status: ConnectionStatus) -> Self {
        status.as_u16()
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// The configured hub credentials.
///
/// Hub name, device id and token only ever exist together; the manager
/// holds an `Option<Identity>` and replaces or clears it as a whole.
pub struct Identity {
    hub_name: String,
    device_id: String,
    auth_token: Zeroizing<String>,
}

impl Identity {
    /// Parses a connection string and derives its SAS token.
    pub fn from_connection_string(raw: &[u8], sas_expiry: u64) -> Result<Self, AuthError> {
        let parsed = ConnectionString::parse(raw)?;
        let auth_token = parsed.sas_token(sas_expiry)?;
        Ok(Self {
            hub_name: parsed.host_name,
            device_id: parsed.device_id,
            auth_token,
        })
    }

    pub fn hub_name(&self) -> &str {
        &self.hub_name
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The `SharedAccessSignature ...` header value.
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Builds the MQTT session configuration for this identity.
    pub fn transport_config(&self, trust_anchors: &TrustAnchors) -> MqttConfig {
        MqttConfig {
            uri: format!("mqtts://{}", self.hub_name),
            client_id: self.device_id.clone(),
            username: format!(
                "{}/{}/?api-version={API_VERSION}",
                self.hub_name, self.device_id
            ),
            password: self.auth_token.clone(),
            trust_anchors: trust_anchors.clone(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("hub_name", &self.hub_name)
            .field("device_id", &self.device_id)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Settings for [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Unix seconds written into the token's `se=` field.
    pub sas_expiry: u64,
    /// Trust roots handed to the transport for the TLS handshake.
    pub trust_anchors: TrustAnchors,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            sas_expiry: DEFAULT_EXPIRY,
            trust_anchors: TrustAnchors::Platform,
        }
    }
}

/// Backoff schedule used by the transport between reconnection attempts.
///
/// Attempt `n` waits `initial_delay * backoff_factor^(n-1)`, capped at
/// `max_delay`, then moved up or down by at most `jitter` of itself.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Fraction in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
            jitter: 0.25,
        }
    }
}

impl ReconnectConfig {
    /// Capped delay before attempt `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    /// Delay before attempt `attempt`, with jitter drawn from `rng`.
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        let spread = self.jitter.clamp(0.0, 1.0);
        if spread == 0.0 || spread.is_nan() {
            return base;
        }
        base.mul_f64(1.0 + rng.gen_range(-spread..=spread))
    }
}
