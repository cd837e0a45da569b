//! The key-value contract and its in-memory backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::StorageError;

/// String key-value storage that survives a reload.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>>;

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;
}

/// In-memory key-value store.
///
/// Clones share the same entries. Writes can be switched off to simulate an
/// exhausted storage quota.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: Arc<DashMap<String, String>>,
    reject_writes: Arc<AtomicBool>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail (or succeed again).
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Raw value under a key.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    /// Overwrite a key directly, bypassing the write switch.
    pub fn put_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

impl KeyValueStore for MemoryKv {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        let value = self.raw(key);
        async move { Ok(value) }.boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            if self.reject_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable(format!(
                    "quota exceeded writing {key}"
                )));
            }
            self.entries.insert(key.to_string(), value);
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        self.entries.remove(key);
        async { Ok(()) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").await.unwrap(), None);

        kv.set("a", "1".into()).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));

        kv.remove("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_writes_keep_old_value() {
        let kv = MemoryKv::new();
        kv.set("a", "1".into()).await.unwrap();

        kv.reject_writes(true);
        assert!(matches!(
            kv.set("a", "2".into()).await,
            Err(StorageError::Unavailable(_))
        ));
        assert_eq!(kv.raw("a").as_deref(), Some("1"));

        kv.reject_writes(false);
        kv.set("a", "2".into()).await.unwrap();
        assert_eq!(kv.raw("a").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let kv = MemoryKv::new();
        let other = kv.clone();
        kv.set("k", "v".into()).await.unwrap();
        assert_eq!(other.raw("k").as_deref(), Some("v"));
    }
}
