//! Error types for credential parsing and token derivation.

/// Errors produced while turning a connection string into a SAS token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("connection string is missing {0}")]
    MissingField(&'static str),

    #[error("{0} is not valid UTF-8")]
    InvalidFieldEncoding(&'static str),

    #[error("shared access key is not valid base64: {0}")]
    InvalidSecretEncoding(#[from] base64::DecodeError),

    #[error("failed computing SAS signature: {0}")]
    SignatureFailure(String),
}
