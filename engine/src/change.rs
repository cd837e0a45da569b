//! Pending changes: unconfirmed local mutations.
//!
//! Every optimistic mutation is described by a [`PendingChange`] before it is
//! appended to the ledger. Quantity moves are recorded as signed deltas, never
//! as absolute values, so they can be replayed on top of whatever the server
//! holds when connectivity returns.

use crate::{ChangeId, Error, MetadataPatch, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a stock transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Goods in
    Receive,
    /// Goods out
    Dispatch,
}

impl TransactionKind {
    /// Convert a positive amount into the signed delta of this transaction.
    pub fn signed_delta(self, amount: u32) -> crate::error::Result<i64> {
        if amount == 0 {
            return Err(Error::InvalidQuantity(0));
        }
        let amount = i64::from(amount);
        Ok(match self {
            TransactionKind::Receive => amount,
            TransactionKind::Dispatch => -amount,
        })
    }
}

/// Who made a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// What a pending change does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    /// Net signed effect of one transaction
    #[serde(rename_all = "camelCase")]
    QuantityDelta {
        delta: i64,
        /// Cached quantity just before the transaction
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_quantity: Option<u32>,
    },
    /// Snapshot of an edit to non-numeric fields
    MetadataUpdate { metadata: MetadataPatch },
}

/// One unconfirmed local mutation.
///
/// Immutable after creation except for the `synced` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Unique change ID
    pub id: ChangeId,
    /// Record this change targets
    pub item_id: RecordId,
    #[serde(flatten)]
    pub kind: ChangeKind,
    /// When the change was made locally
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_name: String,
    /// Whether the change is reflected in (or absorbed into) the server record
    #[serde(default)]
    pub synced: bool,
}

impl PendingChange {
    /// Create a quantity change.
    pub fn quantity_delta(
        id: impl Into<ChangeId>,
        item_id: impl Into<RecordId>,
        delta: i64,
        previous_quantity: Option<u32>,
        actor: &Actor,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            item_id: item_id.into(),
            kind: ChangeKind::QuantityDelta {
                delta,
                previous_quantity,
            },
            timestamp,
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            synced: false,
        }
    }

    /// Create a metadata change.
    pub fn metadata_update(
        id: impl Into<ChangeId>,
        item_id: impl Into<RecordId>,
        metadata: MetadataPatch,
        actor: &Actor,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            item_id: item_id.into(),
            kind: ChangeKind::MetadataUpdate { metadata },
            timestamp,
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            synced: false,
        }
    }

    /// The signed delta, if this is a quantity change.
    pub fn delta(&self) -> Option<i64> {
        match &self.kind {
            ChangeKind::QuantityDelta { delta, .. } => Some(*delta),
            ChangeKind::MetadataUpdate { .. } => None,
        }
    }

    /// The metadata snapshot, if this is a metadata change.
    pub fn metadata(&self) -> Option<&MetadataPatch> {
        match &self.kind {
            ChangeKind::MetadataUpdate { metadata } => Some(metadata),
            ChangeKind::QuantityDelta { .. } => None,
        }
    }

    /// Check well-formedness. Nothing beyond shape is validated.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidChange("change id is empty".into()));
        }
        if self.item_id.trim().is_empty() {
            return Err(Error::InvalidChange(format!(
                "change '{}' has no target record",
                self.id
            )));
        }
        if let ChangeKind::MetadataUpdate { metadata } = &self.kind {
            if metadata.is_empty() {
                return Err(Error::InvalidChange(format!(
                    "metadata change '{}' sets no fields",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()
    }

    fn actor() -> Actor {
        Actor::new("u-1", "Alice")
    }

    #[test]
    fn signed_deltas() {
        assert_eq!(TransactionKind::Receive.signed_delta(5), Ok(5));
        assert_eq!(TransactionKind::Dispatch.signed_delta(20), Ok(-20));
        assert_eq!(
            TransactionKind::Dispatch.signed_delta(0),
            Err(Error::InvalidQuantity(0))
        );
    }

    #[test]
    fn accessors() {
        let change = PendingChange::quantity_delta("c-1", "item-1", -3, Some(10), &actor(), at());
        assert_eq!(change.delta(), Some(-3));
        assert!(change.metadata().is_none());
        assert!(!change.synced);

        let edit = PendingChange::metadata_update(
            "c-2",
            "item-1",
            MetadataPatch::new().notes("x"),
            &actor(),
            at(),
        );
        assert_eq!(edit.delta(), None);
        assert_eq!(edit.metadata().unwrap().notes.as_deref(), Some("x"));
    }

    #[test]
    fn validate_rejects_malformed() {
        let empty_id = PendingChange::quantity_delta("", "item-1", 1, None, &actor(), at());
        assert!(matches!(empty_id.validate(), Err(Error::InvalidChange(_))));

        let no_target = PendingChange::quantity_delta("c-1", " ", 1, None, &actor(), at());
        assert!(matches!(no_target.validate(), Err(Error::InvalidChange(_))));

        let empty_patch =
            PendingChange::metadata_update("c-1", "item-1", MetadataPatch::new(), &actor(), at());
        assert!(matches!(empty_patch.validate(), Err(Error::InvalidChange(_))));
    }

    #[test]
    fn persisted_layout() {
        let change = PendingChange::quantity_delta("c-1", "item-1", 5, None, &actor(), at());
        let value = serde_json::to_value(&change).unwrap();

        assert_eq!(value["type"], json!("quantity_delta"));
        assert_eq!(value["delta"], json!(5));
        assert_eq!(value["itemId"], json!("item-1"));
        assert_eq!(value["userName"], json!("Alice"));
        assert_eq!(value["synced"], json!(false));
        assert!(value.get("previousQuantity").is_none());
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn decodes_persisted_metadata_change() {
        let change: PendingChange = serde_json::from_value(json!({
            "id": "change_1706745600000_abc",
            "itemId": "item-1",
            "type": "metadata_update",
            "metadata": {"location": "B2"},
            "timestamp": "2024-02-01T10:00:00.000Z",
            "userId": "u-1",
            "userName": "Alice",
            "synced": true
        }))
        .unwrap();

        assert!(change.synced);
        assert_eq!(
            change.metadata().unwrap().location.as_deref(),
            Some("B2")
        );
        assert_eq!(change.timestamp, at());
    }
}
