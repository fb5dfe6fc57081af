//! Connection string parsing.
//!
//! A device connection string is a `;`-separated list of `Key=Value`
//! pairs, e.g. `HostName=h.azure-devices.net;DeviceId=d;SharedAccessKey=k`.
//! The buffer comes straight from the host and is not guaranteed to be
//! UTF-8 or NUL-terminated, so parsing works on raw bytes.

use std::fmt;

use zeroize::Zeroizing;

use crate::error::AuthError;
use crate::sas::generate_sas_token;

/// Key holding the hub host name.
pub const HOST_NAME: &str = "HostName";
/// Key holding the device identifier.
pub const DEVICE_ID: &str = "DeviceId";
/// Key holding the base64 device secret.
pub const SHARED_ACCESS_KEY: &str = "SharedAccessKey";

/// Returns the value that follows the first literal `<key>=` in `buf`.
///
/// The value ends at the next `;` or at the end of the buffer. `Key=;`
/// yields an empty slice, which is distinct from `None`.
///
/// Known limitation: this is a plain substring search, so a key name
/// followed by `=` inside an earlier value (e.g. a secret containing
/// `DeviceId=`) is matched before the real field.
pub fn extract_property<'a>(buf: &'a [u8], key: &str) -> Option<&'a [u8]> {
    let mut needle = Vec::with_capacity(key.len() + 1);
    needle.extend_from_slice(key.as_bytes());
    needle.push(b'=');

    let start = buf
        .windows(needle.len())
        .position(|window| window == needle.as_slice())?
        + needle.len();
    let rest = &buf[start..];
    let end = rest.iter().position(|&b| b == b';').unwrap_or(rest.len());
    Some(&rest[..end])
}

/// The three fields of a device connection string.
pub struct ConnectionString {
    pub host_name: String,
    pub device_id: String,
    shared_access_key: Zeroizing<Vec<u8>>,
}

impl ConnectionString {
    /// Parses a raw connection string.
    ///
    /// Fails with [`AuthError::MissingField`] naming the first of
    /// `HostName`, `DeviceId`, `SharedAccessKey` that is absent, and with
    /// [`AuthError::InvalidFieldEncoding`] when the host name or device id
    /// is not UTF-8. Both end up in the MQTT session as text, so they are
    /// kept exactly as given or not at all. The key stays raw bytes until
    /// base64 decoding.
    pub fn parse(raw: &[u8]) -> Result<Self, AuthError> {
        let text = |key: &'static str| {
            let value = extract_property(raw, key).ok_or(AuthError::MissingField(key))?;
            std::str::from_utf8(value)
                .map(str::to_string)
                .map_err(|_| AuthError::InvalidFieldEncoding(key))
        };

        let host_name = text(HOST_NAME)?;
        let device_id = text(DEVICE_ID)?;
        let shared_access_key = extract_property(raw, SHARED_ACCESS_KEY)
            .map(|v| Zeroizing::new(v.to_vec()))
            .ok_or(AuthError::MissingField(SHARED_ACCESS_KEY))?;

        Ok(Self {
            host_name,
            device_id,
            shared_access_key,
        })
    }

    /// Returns the base64 shared access key as given.
    pub fn shared_access_key(&self) -> &[u8] {
        &self.shared_access_key
    }

    /// Derives the `SharedAccessSignature ...` header value for this device.
    pub fn sas_token(&self, expiry: u64) -> Result<Zeroizing<String>, AuthError> {
        generate_sas_token(
            &self.host_name,
            &self.device_id,
            &self.shared_access_key,
            expiry,
        )
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("shared_access_key", &"<redacted>")
            .finish()
    }
}
