//! Azure IoT Hub device credentials.
//!
//! Parses `HostName=...;DeviceId=...;SharedAccessKey=...` connection
//! strings and derives the Shared Access Signature used as the MQTT
//! password when talking to the hub.

pub mod connection_string;
pub mod encode;
pub mod error;
pub mod sas;

pub use connection_string::{ConnectionString, extract_property};
pub use encode::url_encode;
pub use error::AuthError;
pub use sas::{DEFAULT_EXPIRY, generate_sas_token};
