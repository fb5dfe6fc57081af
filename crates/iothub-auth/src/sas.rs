//! Shared Access Signature token derivation.
//!
//! The token has the shape
//! `SharedAccessSignature sr=<hub>%2Fdevices%2F<device>&se=<expiry>&sig=<sig>`
//! where `sig` is the percent-encoded base64 HMAC-SHA256 of
//! `<resource>\n<expiry>` keyed with the decoded shared access key.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::encode::url_encode;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Default `se=` value (year 2255). Expiry is not enforced by the device.
pub const DEFAULT_EXPIRY: u64 = 9_000_000_000;

/// Encoded `/devices/` between the hub and device parts of the resource URI.
const DEVICES_SEGMENT: &str = "%2Fdevices%2F";

const TOKEN_PREFIX: &str = "SharedAccessSignature sr=";

/// Returns the encoded resource URI `<hub>%2Fdevices%2F<device>`.
pub fn resource_uri(hub_name: &str, device_id: &str) -> String {
    format!(
        "{}{DEVICES_SEGMENT}{}",
        url_encode(hub_name),
        url_encode(device_id)
    )
}

/// Returns the canonical string-to-sign for a resource and expiry.
pub fn string_to_sign(resource: &str, expiry: u64) -> String {
    format!("{resource}\n{expiry}")
}

/// Signs `message` with the base64 `key` and returns the base64 digest.
///
/// The decoded key and the raw digest are wiped before returning.
pub fn sign(key: &[u8], message: &str) -> Result<Zeroizing<String>, AuthError> {
    let key_bytes = Zeroizing::new(STANDARD.decode(key)?);
    let mut mac = HmacSha256::new_from_slice(&key_bytes)
        .map_err(|e| AuthError::SignatureFailure(e.to_string()))?;
    mac.update(message.as_bytes());

    let mut digest = mac.finalize().into_bytes();
    let signature = Zeroizing::new(STANDARD.encode(&digest));
    digest.as_mut_slice().zeroize();
    Ok(signature)
}

/// Builds the SAS header value used as the MQTT password.
pub fn generate_sas_token(
    hub_name: &str,
    device_id: &str,
    shared_access_key: &[u8],
    expiry: u64,
) -> Result<Zeroizing<String>, AuthError> {
    let resource = resource_uri(hub_name, device_id);
    let signature = sign(shared_access_key, &string_to_sign(&resource, expiry))?;
    let signature = Zeroizing::new(url_encode(&signature));

    Ok(Zeroizing::new(format!(
        "{TOKEN_PREFIX}{resource}&se={expiry}&sig={}",
        signature.as_str()
    )))
}
