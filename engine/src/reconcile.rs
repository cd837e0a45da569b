//! Delta reconciliation and resolution planning.
//!
//! The numeric dimension of a conflict is never settled by picking a winner.
//! Instead the unsynced local deltas are replayed on top of whatever quantity
//! the server holds now:
//!
//! ```text
//! merged = max(0, server_quantity + sum(unsynced quantity deltas))
//! ```
//!
//! Summation is commutative, so two clients that each dispatched or received
//! goods offline both see their transactions land. Metadata conflicts are not
//! merged automatically; they follow the user's [`Resolution`] choice.

use crate::record::clamp_quantity;
use crate::{ChangeId, ConflictInfo, InventoryRecord, PendingChange, RecordId};
use serde::{Deserialize, Serialize};

/// How the user chose to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Local version wins in its entirety, quantity included
    KeepLocal,
    /// Server version wins in its entirety
    KeepServer,
    /// Local metadata, server quantity plus unsynced local deltas
    Merge,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::KeepLocal => write!(f, "keep_local"),
            Resolution::KeepServer => write!(f, "keep_server"),
            Resolution::Merge => write!(f, "merge"),
        }
    }
}

/// Replay unsynced quantity deltas on top of the server quantity.
///
/// Metadata changes and already-synced entries are ignored. The result is
/// clamped to zero; intermediate sums are exact, so order never matters.
pub fn merge_quantity<'a>(
    server_quantity: u32,
    changes: impl IntoIterator<Item = &'a PendingChange>,
) -> u32 {
    let total: i128 = changes
        .into_iter()
        .filter(|c| !c.synced)
        .filter_map(PendingChange::delta)
        .map(i128::from)
        .sum();
    clamp_quantity(i128::from(server_quantity) + total)
}

/// The outcome a resolution will produce once the server accepts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionPlan {
    pub item_id: RecordId,
    /// `None` for a plain push of pending changes
    pub resolution: Option<Resolution>,
    /// The record to write to the server
    pub record: InventoryRecord,
    /// Ledger entries the write absorbs
    pub consumed: Vec<ChangeId>,
}

/// Compute the record a resolution writes back.
///
/// `unsynced` are the ledger's unsynced changes for the conflicted record.
/// Every one of them is consumed by every resolution: `keep_local` already
/// carries their effect, `keep_server` discards it and `merge` replays it.
pub fn plan_resolution(
    conflict: &ConflictInfo,
    resolution: Resolution,
    unsynced: &[&PendingChange],
) -> ResolutionPlan {
    let record = match resolution {
        Resolution::KeepLocal => conflict.local_version.clone(),
        Resolution::KeepServer => conflict.server_version.clone(),
        Resolution::Merge => {
            let mut merged = conflict.local_version.clone();
            merged.quantity = merge_quantity(
                conflict.server_version.quantity,
                unsynced.iter().copied(),
            );
            merged
        }
    };

    ResolutionPlan {
        item_id: conflict.item_id.clone(),
        resolution: Some(resolution),
        record,
        consumed: unsynced.iter().map(|c| c.id.clone()).collect(),
    }
}

/// Plan a push of pending changes when no conflict exists.
///
/// Local metadata is kept and the quantity is merged against the server's.
pub fn plan_push(
    local: &InventoryRecord,
    server: &InventoryRecord,
    unsynced: &[&PendingChange],
) -> ResolutionPlan {
    let mut record = local.clone();
    record.quantity = merge_quantity(server.quantity, unsynced.iter().copied());

    ResolutionPlan {
        item_id: local.id.clone(),
        resolution: None,
        record,
        consumed: unsynced.iter().map(|c| c.id.clone()).collect(),
    }
}
