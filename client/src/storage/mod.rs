//! Local durable key-value area.
//!
//! The ledger, conflict set, last-sync marker and record cache are persisted
//! as JSON strings under fixed keys. Any backend offering string get/set can
//! hold them; [`SqliteKv`] is the durable one and [`MemoryKv`] backs tests.

mod kv;
mod local;
mod sqlite;

pub use kv::*;
pub use local::*;
pub use sqlite::*;

/// Local storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused the write (quota exhausted, read-only, ...)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
