//! Store - the client-side state container.
//!
//! The Store holds the optimistic record cache, the pending-change ledger, the
//! open conflicts and the last-sync marker. It decides what an observed server
//! record means and what a resolution writes, but never talks to the network
//! or to disk: callers persist its parts and perform the remote writes.
//!
//! A resolution is a three-step exchange:
//! 1. [`Store::begin_resolution`] claims the conflict (second claims are refused)
//! 2. the caller writes the [`ResolutionClaim::plan`] record to the server
//! 3. [`Store::commit`] on success, [`Store::abort_resolution`] on failure
//!
//! A claim fixes the local side and the ledger entries it absorbs in one
//! step. Changes recorded after the claim are not consumed by the write;
//! [`Store::commit`] replays them on top of the confirmed record.

use crate::reconcile::{self, Resolution, ResolutionPlan};
use crate::{
    detect, error::Result, ConflictInfo, ConflictKind, ConflictSet, Error, InventoryRecord,
    Ledger, PendingChange, RecordId, ServerTimestamp,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// What observing a server record did to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Record was unknown locally and has been cached
    Inserted,
    /// No local changes pending; cache now mirrors the server
    Refreshed,
    /// A conflict was opened, or replaced the open one
    Conflict(ConflictKind),
    /// Local changes are pending and nothing diverged; ready to push
    Pending { unsynced: usize },
    /// A resolution is in flight for this record; observation ignored
    Deferred,
}

/// What a fresh server read did to a claimed conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The server moved again; the conflict now holds the new version
    Diverged(ConflictKind),
    /// The server now matches the local record; the conflict is closed
    Converged { purged: usize },
}

/// An open conflict claimed for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionClaim {
    /// The conflict, its local side being the cache at claim time
    pub conflict: ConflictInfo,
    /// Unsynced changes already folded into that local side
    pub changes: Vec<PendingChange>,
}

impl ResolutionClaim {
    pub fn item_id(&self) -> &str {
        &self.conflict.item_id
    }

    /// Compute what a resolution will write.
    ///
    /// Only the claimed changes are consumed.
    pub fn plan(&self, resolution: Resolution) -> ResolutionPlan {
        let unsynced: Vec<&PendingChange> = self.changes.iter().collect();
        reconcile::plan_resolution(&self.conflict, resolution, &unsynced)
    }
}

/// The client state container.
#[derive(Debug, Clone)]
pub struct Store {
    /// Optimistic local cache
    records: BTreeMap<RecordId, InventoryRecord>,
    ledger: Ledger,
    conflicts: ConflictSet,
    /// When the cache was last known consistent with the server
    last_sync: DateTime<Utc>,
    /// Records with a resolution in flight (never persisted)
    resolving: BTreeSet<RecordId>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an empty store that has never synced.
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            ledger: Ledger::new(),
            conflicts: ConflictSet::new(),
            last_sync: DateTime::<Utc>::default(),
            resolving: BTreeSet::new(),
        }
    }

    /// Reassemble a store from its persisted parts.
    pub fn from_parts(
        records: Vec<InventoryRecord>,
        ledger: Ledger,
        conflicts: ConflictSet,
        last_sync: DateTime<Utc>,
    ) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            ledger,
            conflicts,
            last_sync,
            resolving: BTreeSet::new(),
        }
    }

    /// Get a cached record.
    pub fn record(&self, id: &str) -> Option<&InventoryRecord> {
        self.records.get(id)
    }

    /// All cached records ordered by ID.
    pub fn records(&self) -> impl Iterator<Item = &InventoryRecord> {
        self.records.values()
    }

    /// Insert or replace a cached record without touching the ledger.
    pub fn upsert_record(&mut self, record: InventoryRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn conflicts(&self) -> &ConflictSet {
        &self.conflicts
    }

    pub fn last_sync(&self) -> DateTime<Utc> {
        self.last_sync
    }

    /// Move the last-sync marker forward. It never moves back.
    pub fn advance_last_sync(&mut self, at: DateTime<Utc>) {
        if at > self.last_sync {
            self.last_sync = at;
        }
    }

    pub fn unsynced_count(&self) -> usize {
        self.ledger.unsynced_count()
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_resolving(&self, item_id: &str) -> bool {
        self.resolving.contains(item_id)
    }

    /// Step one of a local mutation: apply it to the cache.
    ///
    /// Returns the updated record. The ledger is not touched; follow up with
    /// [`Store::record_change`].
    pub fn apply_optimistic(&mut self, change: &PendingChange) -> Result<&InventoryRecord> {
        let record = self
            .records
            .get_mut(&change.item_id)
            .ok_or_else(|| Error::RecordNotFound(change.item_id.clone()))?;
        apply_change(record, change);
        record.last_updated = Some(ServerTimestamp::from_datetime(change.timestamp));
        Ok(record)
    }

    /// Step two of a local mutation: append it to the ledger.
    pub fn record_change(&mut self, change: PendingChange) -> Result<()> {
        self.ledger.record(change)
    }

    /// Interpret a server record that was just read or pushed to us.
    pub fn observe(&mut self, server: InventoryRecord, now: DateTime<Utc>) -> Observation {
        if self.resolving.contains(&server.id) {
            return Observation::Deferred;
        }

        let Some(local) = self.records.get(&server.id) else {
            self.records.insert(server.id.clone(), server);
            return Observation::Inserted;
        };

        let unsynced = self.ledger.list_unsynced(Some(&server.id)).len();
        let conflicted = self.conflicts.contains(&server.id);
        if unsynced == 0 && !conflicted {
            self.records.insert(server.id.clone(), server);
            return Observation::Refreshed;
        }
        if conflicted && detect::classify(local, &server).is_none() {
            self.absorb(server, now);
            return Observation::Refreshed;
        }

        match detect::detect_conflict(local, &server, self.last_sync, now) {
            Some(conflict) => {
                let kind = conflict.conflict_type;
                self.conflicts.upsert(conflict);
                Observation::Conflict(kind)
            }
            None => Observation::Pending { unsynced },
        }
    }

    /// Record IDs with unsynced changes that are free to push.
    ///
    /// Records with an open or in-flight conflict are left out.
    pub fn pending_items(&self) -> Vec<RecordId> {
        self.ledger
            .unsynced_records()
            .into_iter()
            .filter(|id| !self.conflicts.contains(id) && !self.resolving.contains(*id))
            .map(str::to_string)
            .collect()
    }

    /// Claim an open conflict for resolution.
    ///
    /// Returns `None` when there is no open conflict for the record or a
    /// resolution is already in flight; the caller then has nothing to do.
    /// The claim's local side is the cache as of now, so changes recorded
    /// after detection are part of it, together with their ledger entries.
    pub fn begin_resolution(&mut self, item_id: &str) -> Option<ResolutionClaim> {
        if self.resolving.contains(item_id) {
            return None;
        }
        let mut conflict = self.conflicts.get(item_id)?.clone();
        if let Some(local) = self.records.get(item_id) {
            conflict.local_version = local.clone();
        }
        let changes = self
            .ledger
            .list_unsynced(Some(item_id))
            .into_iter()
            .cloned()
            .collect();
        self.resolving.insert(item_id.to_string());
        Some(ResolutionClaim { conflict, changes })
    }

    /// Claim a conflict-free record for a push of its pending changes.
    ///
    /// Observations of the record are deferred until [`Store::commit`] or
    /// [`Store::abort_resolution`].
    pub fn begin_push(&mut self, item_id: &str) -> bool {
        if self.resolving.contains(item_id) || self.conflicts.contains(item_id) {
            return false;
        }
        self.resolving.insert(item_id.to_string())
    }

    /// Release a claimed record after a failed write. A conflict stays open.
    pub fn abort_resolution(&mut self, item_id: &str) {
        self.resolving.remove(item_id);
    }

    /// Re-check an open conflict against a fresh server read.
    ///
    /// The local side is re-read from the cache. When the server still
    /// differs the conflict takes the new server version. When it now
    /// matches the local record, the unsynced changes are absorbed, the
    /// conflict is closed and the claim released. `None` when the record is
    /// not cached.
    pub fn refresh_conflict(
        &mut self,
        server: InventoryRecord,
        now: DateTime<Utc>,
    ) -> Option<Refresh> {
        let local = self.records.get(&server.id)?;
        let Some(kind) = detect::classify(local, &server) else {
            let purged = self.absorb(server, now);
            return Some(Refresh::Converged { purged });
        };
        let conflict = ConflictInfo {
            item_id: local.id.clone(),
            item_name: local.name.clone(),
            local_version: local.clone(),
            server_version: server,
            conflict_type: kind,
            detected_at: now,
        };
        self.conflicts.upsert(conflict);
        Some(Refresh::Diverged(kind))
    }

    /// Compute the push of a record's pending changes against a server copy.
    pub fn plan_push(&self, server: &InventoryRecord) -> Option<ResolutionPlan> {
        let local = self.records.get(&server.id)?;
        let unsynced = self.ledger.list_unsynced(Some(&server.id));
        if unsynced.is_empty() {
            return None;
        }
        Some(reconcile::plan_push(local, server, &unsynced))
    }

    /// Apply a plan after the server confirmed the write.
    ///
    /// `confirmed` is the record as the server now stores it. The cache takes
    /// it, changes recorded after the plan was made are replayed on top in
    /// creation order, consumed changes are marked synced and purged, the
    /// conflict (if any) is closed and the last-sync marker advances.
    ///
    /// Returns the number of ledger entries purged.
    pub fn commit(
        &mut self,
        plan: &ResolutionPlan,
        confirmed: InventoryRecord,
        now: DateTime<Utc>,
    ) -> usize {
        let server_time = confirmed
            .last_updated
            .as_ref()
            .and_then(ServerTimestamp::to_datetime);

        self.ledger.mark_all_synced(&plan.consumed);
        let purged = self.ledger.purge_synced();

        let mut record = confirmed;
        for change in self.ledger.list_unsynced(Some(&plan.item_id)) {
            apply_change(&mut record, change);
        }
        self.records.insert(plan.item_id.clone(), record);

        if plan.resolution.is_some() {
            self.conflicts.remove(&plan.item_id);
        }
        self.resolving.remove(&plan.item_id);

        self.advance_last_sync(server_time.map_or(now, |at| at.max(now)));
        purged
    }

    /// Dismiss one conflict, accepting the server's view of the record.
    ///
    /// Nothing is written remotely. The record's unsynced changes are
    /// dropped and the cache takes the conflict's server version.
    pub fn dismiss(&mut self, item_id: &str) -> Option<ConflictInfo> {
        if self.resolving.contains(item_id) {
            return None;
        }
        let conflict = self.conflicts.remove(item_id)?;
        self.discard_local(&conflict);
        Some(conflict)
    }

    /// Dismiss every open conflict that is not mid-resolution.
    ///
    /// Returns how many were dismissed.
    pub fn dismiss_all(&mut self) -> usize {
        let dismissable: Vec<RecordId> = self
            .conflicts
            .iter()
            .map(|c| c.item_id.clone())
            .filter(|id| !self.resolving.contains(id))
            .collect();
        dismissable
            .iter()
            .filter(|id| self.dismiss(id).is_some())
            .count()
    }

    fn discard_local(&mut self, conflict: &ConflictInfo) {
        self.drop_unsynced(&conflict.item_id);
        self.records
            .insert(conflict.item_id.clone(), conflict.server_version.clone());
    }

    /// Close a conflict whose server version caught up with the local one.
    fn absorb(&mut self, server: InventoryRecord, now: DateTime<Utc>) -> usize {
        let item_id = server.id.clone();
        let server_time = server
            .last_updated
            .as_ref()
            .and_then(ServerTimestamp::to_datetime);

        let purged = self.drop_unsynced(&item_id);
        self.records.insert(item_id.clone(), server);
        self.conflicts.remove(&item_id);
        self.resolving.remove(&item_id);
        self.advance_last_sync(server_time.map_or(now, |at| at.max(now)));
        purged
    }

    fn drop_unsynced(&mut self, item_id: &str) -> usize {
        let ids: Vec<_> = self
            .ledger
            .list_unsynced(Some(item_id))
            .iter()
            .map(|c| c.id.clone())
            .collect();
        self.ledger.mark_all_synced(&ids);
        self.ledger.purge_synced()
    }
}

fn apply_change(record: &mut InventoryRecord, change: &PendingChange) {
    match &change.kind {
        crate::ChangeKind::QuantityDelta { delta, .. } => {
            record.apply_delta(*delta);
        }
        crate::ChangeKind::MetadataUpdate { metadata } => metadata.apply_to(record),
    }
}
