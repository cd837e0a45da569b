//! Unified error handling for the sync client.

use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::storage::StorageError;

/// Sync client error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Engine error: {0}")]
    Engine(#[from] stocksync_engine::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot reach the server while offline")]
    Offline,

    /// The server moved on since the conflict was recorded; it has been
    /// refreshed and must be reviewed again.
    #[error("Conflict for {0} is stale; review the refreshed server version")]
    StaleConflict(String),
}

impl SyncError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Offline | SyncError::Remote(RemoteError::Unavailable(_))
        )
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;
