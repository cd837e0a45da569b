//! The pending-change ledger.
//!
//! An append-only, insertion-ordered list of [`PendingChange`] entries. The
//! only mutation an entry ever sees after being recorded is its `synced` flag
//! flipping to true; synced entries are later dropped by
//! [`Ledger::purge_synced`].

use crate::{error::Result, ChangeId, Error, PendingChange};
use serde::{Deserialize, Serialize};

/// Durable record of unconfirmed local mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    changes: Vec<PendingChange>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Rebuild a ledger from persisted entries, keeping their order.
    pub fn from_changes(changes: Vec<PendingChange>) -> Self {
        Self { changes }
    }

    /// Append a change.
    ///
    /// Only well-formedness is checked: a non-empty id and target, a
    /// non-empty metadata snapshot, and an id not already in the ledger.
    pub fn record(&mut self, change: PendingChange) -> Result<()> {
        change.validate()?;
        if self.changes.iter().any(|c| c.id == change.id) {
            return Err(Error::DuplicateChange(change.id));
        }
        self.changes.push(change);
        Ok(())
    }

    /// Unsynced changes in insertion order, optionally for one record.
    pub fn list_unsynced(&self, record_id: Option<&str>) -> Vec<&PendingChange> {
        self.changes
            .iter()
            .filter(|c| !c.synced)
            .filter(|c| record_id.map_or(true, |id| c.item_id == id))
            .collect()
    }

    /// Flip a change to synced.
    ///
    /// Returns false when the change does not exist or was already synced.
    pub fn mark_synced(&mut self, change_id: &str) -> bool {
        match self
            .changes
            .iter_mut()
            .find(|c| c.id == change_id && !c.synced)
        {
            Some(change) => {
                change.synced = true;
                true
            }
            None => false,
        }
    }

    /// Mark a batch of changes synced, returning how many flipped.
    pub fn mark_all_synced<'a>(&mut self, change_ids: impl IntoIterator<Item = &'a ChangeId>) -> usize {
        change_ids
            .into_iter()
            .filter(|id| self.mark_synced(id))
            .count()
    }

    /// Drop every synced entry. Unsynced entries are never touched.
    ///
    /// Returns the number of entries removed.
    pub fn purge_synced(&mut self) -> usize {
        let before = self.changes.len();
        self.changes.retain(|c| !c.synced);
        before - self.changes.len()
    }

    /// Whether the record has unconfirmed local changes.
    pub fn has_unsynced(&self, record_id: &str) -> bool {
        self.changes
            .iter()
            .any(|c| !c.synced && c.item_id == record_id)
    }

    /// Distinct record IDs with unsynced changes, in first-seen order.
    pub fn unsynced_records(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for change in self.changes.iter().filter(|c| !c.synced) {
            if !ids.contains(&change.item_id.as_str()) {
                ids.push(&change.item_id);
            }
        }
        ids
    }

    /// Count of unsynced changes across all records.
    pub fn unsynced_count(&self) -> usize {
        self.changes.iter().filter(|c| !c.synced).count()
    }

    /// All entries, synced or not.
    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Actor, MetadataPatch};
    use chrono::{TimeZone, Utc};

    fn delta(id: &str, item: &str, delta: i64) -> PendingChange {
        PendingChange::quantity_delta(
            id,
            item,
            delta,
            None,
            &Actor::new("u-1", "Alice"),
            Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn record_keeps_insertion_order() {
        let mut ledger = Ledger::new();
        ledger.record(delta("c-1", "item-1", 5)).unwrap();
        ledger.record(delta("c-2", "item-2", 1)).unwrap();
        ledger.record(delta("c-3", "item-1", -20)).unwrap();

        let ids: Vec<_> = ledger
            .list_unsynced(Some("item-1"))
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c-1", "c-3"]);
        assert_eq!(ledger.list_unsynced(None).len(), 3);
        assert_eq!(ledger.unsynced_records(), vec!["item-1", "item-2"]);
    }

    #[test]
    fn record_rejects_duplicates_and_malformed() {
        let mut ledger = Ledger::new();
        ledger.record(delta("c-1", "item-1", 5)).unwrap();

        assert_eq!(
            ledger.record(delta("c-1", "item-1", 7)),
            Err(Error::DuplicateChange("c-1".into()))
        );

        let bad = PendingChange::metadata_update(
            "c-2",
            "item-1",
            MetadataPatch::new(),
            &Actor::new("u-1", "Alice"),
            Utc::now(),
        );
        assert!(ledger.record(bad).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn mark_synced_is_idempotent() {
        let mut ledger = Ledger::new();
        ledger.record(delta("c-1", "item-1", 5)).unwrap();

        assert!(ledger.mark_synced("c-1"));
        assert!(!ledger.mark_synced("c-1"));
        assert!(!ledger.mark_synced("missing"));
        assert_eq!(ledger.unsynced_count(), 0);
        assert!(!ledger.has_unsynced("item-1"));
    }

    #[test]
    fn purge_only_removes_synced() {
        let mut ledger = Ledger::new();
        ledger.record(delta("c-1", "item-1", 5)).unwrap();
        ledger.record(delta("c-2", "item-1", -2)).unwrap();
        ledger.record(delta("c-3", "item-2", 1)).unwrap();
        ledger.mark_synced("c-2");

        assert_eq!(ledger.purge_synced(), 1);
        let remaining: Vec<_> = ledger.changes().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(remaining, vec!["c-1", "c-3"]);

        // Nothing left to purge
        assert_eq!(ledger.purge_synced(), 0);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn mark_all_synced_counts_flips() {
        let mut ledger = Ledger::new();
        ledger.record(delta("c-1", "item-1", 5)).unwrap();
        ledger.record(delta("c-2", "item-1", -2)).unwrap();
        ledger.mark_synced("c-1");

        let ids = vec!["c-1".to_string(), "c-2".to_string(), "c-9".to_string()];
        assert_eq!(ledger.mark_all_synced(&ids), 1);
        assert_eq!(ledger.unsynced_count(), 0);
    }

    #[test]
    fn serializes_as_plain_list() {
        let mut ledger = Ledger::new();
        ledger.record(delta("c-1", "item-1", 5)).unwrap();

        let json = serde_json::to_string(&ledger).unwrap();
        assert!(json.starts_with('['));
        let parsed: Ledger = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ledger);
    }
}
