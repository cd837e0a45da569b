//! Persisted namespaces of the client state.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use stocksync_engine::{ConflictSet, InventoryRecord, Ledger, Store};

use super::{KeyValueStore, StorageError};

pub const PENDING_CHANGES_KEY: &str = "stocktrack_pending_changes";
pub const CONFLICTS_KEY: &str = "stocktrack_conflicts";
pub const LAST_SYNC_KEY: &str = "stocktrack_last_sync";
pub const INVENTORY_CACHE_KEY: &str = "stocktrack_inventory_cache";

/// Reads and writes the client state namespaces as JSON.
#[derive(Debug, Clone)]
pub struct LocalStore<K> {
    kv: K,
}

impl<K: KeyValueStore> LocalStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Rebuild the client state from storage.
    ///
    /// A missing or undecodable namespace loads as empty; the last-sync
    /// marker then falls back to the Unix epoch. Only backend failures are
    /// returned as errors.
    pub async fn load(&self) -> Result<Store, StorageError> {
        let records: Vec<InventoryRecord> = self.load_json(INVENTORY_CACHE_KEY).await?;
        let ledger: Ledger = self.load_json(PENDING_CHANGES_KEY).await?;
        let conflicts: ConflictSet = self.load_json(CONFLICTS_KEY).await?;
        let last_sync = self.load_last_sync().await?;

        tracing::debug!(
            records = records.len(),
            pending = ledger.unsynced_count(),
            conflicts = conflicts.len(),
            last_sync = %last_sync,
            "Loaded local state"
        );

        Ok(Store::from_parts(records, ledger, conflicts, last_sync))
    }

    pub async fn save_ledger(&self, ledger: &Ledger) -> Result<(), StorageError> {
        self.save_json(PENDING_CHANGES_KEY, ledger).await
    }

    pub async fn save_conflicts(&self, conflicts: &ConflictSet) -> Result<(), StorageError> {
        self.save_json(CONFLICTS_KEY, conflicts).await
    }

    pub async fn save_cache(&self, store: &Store) -> Result<(), StorageError> {
        let records: Vec<&InventoryRecord> = store.records().collect();
        self.save_json(INVENTORY_CACHE_KEY, &records).await
    }

    pub async fn save_last_sync(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.kv.set(LAST_SYNC_KEY, at.to_rfc3339()).await
    }

    /// Persist every namespace.
    pub async fn save_all(&self, store: &Store) -> Result<(), StorageError> {
        self.save_cache(store).await?;
        self.save_ledger(store.ledger()).await?;
        self.save_conflicts(store.conflicts()).await?;
        self.save_last_sync(store.last_sync()).await
    }

    /// Remove every namespace.
    pub async fn clear(&self) -> Result<(), StorageError> {
        for key in [
            INVENTORY_CACHE_KEY,
            PENDING_CHANGES_KEY,
            CONFLICTS_KEY,
            LAST_SYNC_KEY,
        ] {
            self.kv.remove(key).await?;
        }
        Ok(())
    }

    async fn load_json<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StorageError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding corrupt local namespace");
                Ok(T::default())
            }
        }
    }

    async fn load_last_sync(&self) -> Result<DateTime<Utc>, StorageError> {
        let Some(raw) = self.kv.get(LAST_SYNC_KEY).await? else {
            return Ok(DateTime::<Utc>::default());
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(at) => Ok(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(raw = %raw, error = %e, "Unreadable last-sync marker, assuming never synced");
                Ok(DateTime::<Utc>::default())
            }
        }
    }

    async fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, raw).await
    }
}
