//! Detected conflicts and the set of open ones.

use crate::{InventoryRecord, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which dimension of a record diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Quantity,
    Metadata,
    Both,
}

impl ConflictKind {
    /// Classify from the two divergence flags. `None` when nothing differs.
    pub fn from_flags(quantity: bool, metadata: bool) -> Option<Self> {
        match (quantity, metadata) {
            (true, true) => Some(ConflictKind::Both),
            (true, false) => Some(ConflictKind::Quantity),
            (false, true) => Some(ConflictKind::Metadata),
            (false, false) => None,
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::Quantity => write!(f, "quantity"),
            ConflictKind::Metadata => write!(f, "metadata"),
            ConflictKind::Both => write!(f, "both"),
        }
    }
}

/// A divergence between the local and server copies of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub item_id: RecordId,
    /// Display name, taken from the local version
    pub item_name: String,
    pub local_version: InventoryRecord,
    pub server_version: InventoryRecord,
    pub conflict_type: ConflictKind,
    pub detected_at: DateTime<Utc>,
}

/// Open conflicts, at most one per record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictSet {
    entries: Vec<ConflictInfo>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Rebuild from persisted entries.
    ///
    /// Later duplicates for the same record replace earlier ones.
    pub fn from_entries(entries: Vec<ConflictInfo>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.upsert(entry);
        }
        set
    }

    /// Insert a conflict, replacing any open entry for the same record in place.
    ///
    /// Returns the replaced entry.
    pub fn upsert(&mut self, conflict: ConflictInfo) -> Option<ConflictInfo> {
        match self
            .entries
            .iter_mut()
            .find(|c| c.item_id == conflict.item_id)
        {
            Some(existing) => Some(std::mem::replace(existing, conflict)),
            None => {
                self.entries.push(conflict);
                None
            }
        }
    }

    pub fn get(&self, item_id: &str) -> Option<&ConflictInfo> {
        self.entries.iter().find(|c| c.item_id == item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.get(item_id).is_some()
    }

    /// Remove the open conflict for a record.
    pub fn remove(&mut self, item_id: &str) -> Option<ConflictInfo> {
        let index = self.entries.iter().position(|c| c.item_id == item_id)?;
        Some(self.entries.remove(index))
    }

    /// Drop every open conflict, returning them.
    pub fn clear(&mut self) -> Vec<ConflictInfo> {
        std::mem::take(&mut self.entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConflictInfo> {
        self.entries.iter()
    }

    /// Owned copy of the open conflicts in detection order.
    pub fn to_vec(&self) -> Vec<ConflictInfo> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn conflict(item: &str, kind: ConflictKind, minute: u32) -> ConflictInfo {
        let record = InventoryRecord::new(item, "Widget", "Parts", 10, 2, "A1");
        ConflictInfo {
            item_id: item.into(),
            item_name: "Widget".into(),
            local_version: record.clone(),
            server_version: record,
            conflict_type: kind,
            detected_at: Utc.with_ymd_and_hms(2024, 2, 1, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn classify_flags() {
        assert_eq!(ConflictKind::from_flags(true, true), Some(ConflictKind::Both));
        assert_eq!(
            ConflictKind::from_flags(true, false),
            Some(ConflictKind::Quantity)
        );
        assert_eq!(
            ConflictKind::from_flags(false, true),
            Some(ConflictKind::Metadata)
        );
        assert_eq!(ConflictKind::from_flags(false, false), None);
    }

    #[test]
    fn upsert_replaces_same_record() {
        let mut set = ConflictSet::new();
        assert!(set.upsert(conflict("item-1", ConflictKind::Quantity, 0)).is_none());
        set.upsert(conflict("item-2", ConflictKind::Metadata, 1));

        let replaced = set.upsert(conflict("item-1", ConflictKind::Both, 2));
        assert_eq!(replaced.unwrap().conflict_type, ConflictKind::Quantity);
        assert_eq!(set.len(), 2);

        let current = set.get("item-1").unwrap();
        assert_eq!(current.conflict_type, ConflictKind::Both);
        // Replacement keeps the original position
        assert_eq!(set.iter().next().unwrap().item_id, "item-1");
    }

    #[test]
    fn from_entries_collapses_duplicates() {
        let set = ConflictSet::from_entries(vec![
            conflict("item-1", ConflictKind::Quantity, 0),
            conflict("item-1", ConflictKind::Metadata, 5),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("item-1").unwrap().conflict_type, ConflictKind::Metadata);
    }

    #[test]
    fn remove_and_clear() {
        let mut set = ConflictSet::new();
        set.upsert(conflict("item-1", ConflictKind::Quantity, 0));
        set.upsert(conflict("item-2", ConflictKind::Quantity, 0));

        assert!(set.remove("item-1").is_some());
        assert!(set.remove("item-1").is_none());
        assert!(!set.contains("item-1"));

        assert_eq!(set.clear().len(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn persisted_layout() {
        let value = serde_json::to_value(conflict("item-1", ConflictKind::Both, 0)).unwrap();
        assert_eq!(value["conflictType"], "both");
        assert_eq!(value["itemName"], "Widget");
        assert!(value["localVersion"].is_object());
        assert!(value["serverVersion"].is_object());
    }
}
