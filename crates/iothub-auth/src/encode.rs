//! Percent-encoding for SAS resource URIs and signatures.
//!
//! Everything outside `A-Z a-z 0-9 - _ . ~` becomes `%XX` with uppercase
//! hex. `%` itself is always escaped, so the mapping is injective and a
//! field can never forge the `%2F` separators placed between fields.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_encode};

/// Bytes left as-is by [`url_encode`].
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes a string.
pub fn url_encode(input: &str) -> String {
    url_encode_bytes(input.as_bytes())
}

/// Percent-encodes arbitrary bytes.
pub fn url_encode_bytes(input: &[u8]) -> String {
    percent_encode(input, UNRESERVED).to_string()
}
