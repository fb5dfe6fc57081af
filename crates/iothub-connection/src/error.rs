//! Error type for connection management operations.

use iothub_auth::AuthError;

use crate::store::StoreError;
use crate::transport::TransportError;

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connection string could not be parsed or signed. Nothing changed.
    #[error(transparent)]
    Credentials(#[from] AuthError),

    /// The credential store failed. The in-memory identity change stands.
    #[error("credential store error: {0}")]
    Persistence(#[from] StoreError),

    #[error("transport configuration failed: {0}")]
    TransportConfig(#[from] TransportError),

    #[error("connection service stopped")]
    ServiceStopped,
}
