//! In-process document store with a change feed.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use stocksync_engine::{InventoryRecord, ServerTimestamp};
use tokio::sync::broadcast;

use super::{decode_document, record_fields, ChangeFeed, DocumentStore, Fields, RemoteError};

const FEED_CAPACITY: usize = 256;

#[derive(Debug)]
struct Inner {
    documents: DashMap<String, Fields>,
    /// Last assigned server time, in microseconds
    clock: AtomicI64,
    available: AtomicBool,
    writes: AtomicUsize,
    feed: broadcast::Sender<InventoryRecord>,
}

/// Document store kept in memory.
///
/// Every write gets a server timestamp strictly later than both the previous
/// one and the wall clock at the time of the write. Clones share state, so a
/// test can act as a second client writing through another handle.
#[derive(Debug, Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                documents: DashMap::new(),
                clock: AtomicI64::new(0),
                available: AtomicBool::new(true),
                writes: AtomicUsize::new(0),
                feed,
            }),
        }
    }

    /// Simulate the backend going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Create or replace a document, regardless of availability.
    pub fn insert(&self, record: &InventoryRecord) -> Result<InventoryRecord, RemoteError> {
        self.store(&record.id, record_fields(record), true)
    }

    /// Raw stored document.
    pub fn document(&self, id: &str) -> Option<Fields> {
        self.inner.documents.get(id).map(|d| d.value().clone())
    }

    /// Number of accepted `write_one` calls.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let previous = match self.inner.clock.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(last.max(now) + 1)
        }) {
            Ok(previous) | Err(previous) => previous,
        };
        let assigned = previous.max(now) + 1;
        DateTime::from_timestamp_micros(assigned).unwrap_or_else(Utc::now)
    }

    fn store(&self, id: &str, fields: Fields, replace: bool) -> Result<InventoryRecord, RemoteError> {
        let stamp = ServerTimestamp::epoch(self.next_timestamp());
        let stamp = serde_json::to_value(stamp).unwrap_or(Value::Null);

        let mut entry = self.inner.documents.entry(id.to_string()).or_default();
        if replace {
            entry.clear();
        }
        entry.extend(fields);
        entry.insert("lastUpdated".to_string(), stamp);
        let document = Value::Object(entry.value().clone());
        drop(entry);

        let record = decode_document(id, document)?;
        // No subscribers is fine
        let _ = self.inner.feed.send(record.clone());
        Ok(record)
    }

    fn ensure_available(&self) -> Result<(), RemoteError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("document store offline".to_string()))
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn read_one<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<InventoryRecord, RemoteError>> {
        async move {
            self.ensure_available()?;
            let document = self
                .document(id)
                .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
            decode_document(id, Value::Object(document))
        }
        .boxed()
    }

    fn write_one<'a>(
        &'a self,
        id: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, Result<InventoryRecord, RemoteError>> {
        async move {
            self.ensure_available()?;
            if !self.inner.documents.contains_key(id) {
                return Err(RemoteError::NotFound(id.to_string()));
            }
            if let Some(Value::Number(quantity)) = fields.get("quantity") {
                if quantity.as_u64().map_or(true, |q| q > u64::from(u32::MAX)) {
                    return Err(RemoteError::Rejected(format!(
                        "quantity must be a non-negative integer, got {quantity}"
                    )));
                }
            }
            let record = self.store(id, fields, false)?;
            self.inner.writes.fetch_add(1, Ordering::SeqCst);
            Ok(record)
        }
        .boxed()
    }
}

impl ChangeFeed for MemoryDocumentStore {
    fn subscribe(&self) -> BoxStream<'static, InventoryRecord> {
        let receiver = self.inner.feed.subscribe();
        futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(record) => return Some((record, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Change feed lagged, records skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
