//! Azure IoT Hub connection manager.
//!
//! Owns the device identity derived from a connection string, drives an
//! external MQTT transport through connect/reconnect/disconnect, and
//! reports connection status changes.

pub mod error;
pub mod manager;
pub mod mqtt;
pub mod service;
pub mod store;
pub mod transport;
pub mod types;

pub use error::ConnectionError;
pub use manager::ConnectionManager;
pub use mqtt::{MqttTransport, MqttTransportSettings};
pub use service::{ConnectionService, ServiceHandle};
pub use store::{CredentialStore, FileCredentialStore, StoreError};
pub use transport::{
    MqttConfig, Transport, TransportError, TransportEvent, TransportSession, TrustAnchors,
};
pub use types::{ConnectionStatus, Identity, ManagerSettings, ReconnectConfig};
