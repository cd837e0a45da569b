//! The remote document store contract.
//!
//! The backend keeps one JSON document per inventory record. Reads return the
//! whole document with its server-assigned `lastUpdated`; writes are partial
//! updates that return the stored result.

mod http;
mod memory;

pub use http::HttpDocumentStore;
pub use memory::MemoryDocumentStore;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use stocksync_engine::{InventoryRecord, ServerTimestamp};

/// Document fields of a partial update.
pub type Fields = Map<String, Value>;

/// Marker fields stamped on every resolution write.
pub const RESOLVED_MARKER: &str = "_conflictResolved";
pub const RESOLVED_AT_MARKER: &str = "_resolvedAt";

/// Remote store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Network down, timeout, server offline
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },
}

/// Read and partially update documents of one collection.
pub trait DocumentStore: Send + Sync {
    fn read_one<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<InventoryRecord, RemoteError>>;

    fn write_one<'a>(
        &'a self,
        id: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, Result<InventoryRecord, RemoteError>>;
}

/// Subscription to document changes of one collection.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> BoxStream<'static, InventoryRecord>;
}

/// The writable fields of a record.
///
/// `id` names the document and `lastUpdated` is assigned by the server, so
/// neither is sent.
pub fn record_fields(record: &InventoryRecord) -> Fields {
    let mut fields = match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    fields.remove("id");
    fields.remove("lastUpdated");
    fields
}

/// Record fields plus the resolution markers.
pub fn resolution_fields(record: &InventoryRecord, resolved_at: DateTime<Utc>) -> Fields {
    let mut fields = record_fields(record);
    fields.insert(RESOLVED_MARKER.to_string(), Value::Bool(true));
    if let Ok(at) = serde_json::to_value(ServerTimestamp::from_datetime(resolved_at)) {
        fields.insert(RESOLVED_AT_MARKER.to_string(), at);
    }
    fields
}

/// Decode a stored document into a record, taking the id from its key.
pub fn decode_document(id: &str, document: Value) -> Result<InventoryRecord, RemoteError> {
    let Value::Object(mut fields) = document else {
        return Err(RemoteError::Malformed {
            id: id.to_string(),
            reason: "document is not an object".to_string(),
        });
    };
    fields.insert("id".to_string(), Value::String(id.to_string()));
    serde_json::from_value(Value::Object(fields)).map_err(|e| RemoteError::Malformed {
        id: id.to_string(),
        reason: e.to_string(),
    })
}
