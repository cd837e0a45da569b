//! # StockSync Client
//!
//! Async runtime around `stocksync-engine`: local durable storage, the remote
//! document store, the conflict resolution workflow and the background tasks
//! that keep them in step.
//!
//! A process builds one [`SyncService`] at startup and shares it (behind an
//! `Arc`) with the UI layer, a [`ConflictPoller`] and optionally a
//! [`FeedListener`].

pub mod config;
pub mod error;
pub mod feed;
pub mod poller;
pub mod remote;
pub mod service;
pub mod signal;
pub mod storage;

pub use config::{Config, ConfigError};
pub use error::{Result, SyncError};
pub use feed::FeedListener;
pub use poller::ConflictPoller;
pub use remote::{
    ChangeFeed, DocumentStore, HttpDocumentStore, MemoryDocumentStore, RemoteError,
};
pub use service::{BatchOutcome, ReconcileReport, ResolveOutcome, SyncOptions, SyncService};
pub use signal::{SyncSignal, SyncStatus};
pub use storage::{KeyValueStore, LocalStore, MemoryKv, SqliteKv, StorageError};
