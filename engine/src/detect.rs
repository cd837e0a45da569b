//! Conflict detection.
//!
//! Pure comparison of a freshly observed server record against the local
//! copy and the last-sync marker. No I/O; the detection instant is an input.

use crate::{ConflictInfo, ConflictKind, InventoryRecord};
use chrono::{DateTime, Utc};

/// Decide whether the server copy truly conflicts with the local one.
///
/// Returns `None` when:
/// - the server timestamp is missing or cannot be interpreted,
/// - the server has not changed since `last_sync` (timestamp not strictly later),
/// - no compared field differs.
pub fn detect_conflict(
    local: &InventoryRecord,
    server: &InventoryRecord,
    last_sync: DateTime<Utc>,
    detected_at: DateTime<Utc>,
) -> Option<ConflictInfo> {
    let server_updated = server.last_updated.as_ref()?.to_datetime()?;
    if server_updated <= last_sync {
        return None;
    }

    let conflict_type = classify(local, server)?;
    Some(ConflictInfo {
        item_id: local.id.clone(),
        item_name: local.name.clone(),
        local_version: local.clone(),
        server_version: server.clone(),
        conflict_type,
        detected_at,
    })
}

/// Field-by-field divergence, ignoring timestamps.
pub fn classify(local: &InventoryRecord, server: &InventoryRecord) -> Option<ConflictKind> {
    ConflictKind::from_flags(local.quantity_differs(server), local.metadata_differs(server))
}
