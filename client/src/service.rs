//! The sync service: one instance per process, shared by reference.
//!
//! Wraps the engine [`Store`] with local persistence and the remote document
//! store. Local mutations apply optimistically and are recorded in the
//! ledger; server records observed later are checked for conflicts; conflicts
//! are resolved by writing to the server first and committing locally only
//! once the write succeeded.
//!
//! The state lock is never held across a remote call. A record with a write
//! in flight is claimed in the store, so concurrent observations of it are
//! deferred and a second resolution of it is a no-op.

use chrono::Utc;
use stocksync_engine::{
    classify, Actor, ConflictInfo, Error as EngineError, InventoryRecord, MetadataPatch,
    Observation, PendingChange, RecordId, Refresh, Resolution, ResolutionClaim, ResolutionPlan,
    Store, TransactionKind,
};
use tokio::sync::{watch, Mutex};

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::remote::{record_fields, resolution_fields, DocumentStore, RemoteError};
use crate::signal::{SyncSignal, SyncStatus};
use crate::storage::{KeyValueStore, LocalStore};

/// Service behaviour switches.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Re-read the server record before writing a resolution
    pub verify_before_resolve: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            verify_before_resolve: true,
        }
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            verify_before_resolve: config.verify_before_resolve,
        }
    }
}

/// Result of a resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Resolved; the record as now cached
    Resolved(InventoryRecord),
    /// No open conflict, or another resolution already in flight
    NoOp,
}

/// Result of resolving many conflicts.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub resolved: Vec<RecordId>,
    pub failed: Vec<(RecordId, SyncError)>,
}

/// Result of a reconciliation pass over pending changes.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Records whose pending changes reached the server
    pub pushed: Vec<RecordId>,
    /// Records that turned out to be in conflict
    pub conflicts: Vec<RecordId>,
    pub failed: Vec<(RecordId, SyncError)>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.pushed.is_empty() && self.conflicts.is_empty() && self.failed.is_empty()
    }

    /// Every attempted push failed because the remote store was unreachable.
    pub fn lost_connection(&self) -> bool {
        self.pushed.is_empty()
            && self.conflicts.is_empty()
            && !self.failed.is_empty()
            && self.failed.iter().all(|(_, e)| e.is_transient())
    }
}

/// Record read when the cache is empty; any answer but `Unavailable` counts.
const CONNECTIVITY_CHECK_ID: &str = "_connectivity";

enum PushOutcome {
    Pushed,
    Conflict,
    Skipped,
}

pub struct SyncService<D, K> {
    remote: D,
    local: LocalStore<K>,
    state: Mutex<Store>,
    signal: SyncSignal,
    options: SyncOptions,
}

impl<D, K> SyncService<D, K>
where
    D: DocumentStore,
    K: KeyValueStore,
{
    /// Build a service around already-loaded state.
    pub fn new(remote: D, local: LocalStore<K>, store: Store, options: SyncOptions) -> Self {
        let signal = SyncSignal::new(SyncStatus {
            online: false,
            pending: store.unsynced_count(),
            conflicts: store.conflict_count(),
        });
        Self {
            remote,
            local,
            state: Mutex::new(store),
            signal,
            options,
        }
    }

    /// Load persisted state and build the service. Starts offline.
    pub async fn open(remote: D, local: LocalStore<K>, options: SyncOptions) -> Result<Self> {
        let store = local.load().await?;
        tracing::info!(
            pending = store.unsynced_count(),
            conflicts = store.conflict_count(),
            "Sync service opened"
        );
        Ok(Self::new(remote, local, store, options))
    }

    pub fn signal(&self) -> &SyncSignal {
        &self.signal
    }

    pub fn status(&self) -> SyncStatus {
        self.signal.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.signal.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.signal.is_online()
    }

    /// Feed a platform connectivity transition.
    pub fn set_online(&self, online: bool) {
        if self.signal.set_online(online) {
            tracing::info!(online, "Connectivity changed");
        }
    }

    /// Read one record to learn whether the remote store answers, and
    /// update the online state accordingly.
    pub async fn check_connectivity(&self) -> bool {
        let id = self
            .state
            .lock()
            .await
            .records()
            .next()
            .map_or_else(|| CONNECTIVITY_CHECK_ID.to_string(), |r| r.id.clone());

        let reachable = !matches!(
            self.remote.read_one(&id).await,
            Err(RemoteError::Unavailable(_))
        );
        self.set_online(reachable);
        reachable
    }

    pub fn local(&self) -> &LocalStore<K> {
        &self.local
    }

    /// Cached record, with optimistic changes applied.
    pub async fn record(&self, item_id: &str) -> Option<InventoryRecord> {
        self.state.lock().await.record(item_id).cloned()
    }

    pub async fn records(&self) -> Vec<InventoryRecord> {
        self.state.lock().await.records().cloned().collect()
    }

    /// Unsynced changes in creation order.
    pub async fn pending_changes(&self) -> Vec<PendingChange> {
        let state = self.state.lock().await;
        state
            .ledger()
            .list_unsynced(None)
            .into_iter()
            .cloned()
            .collect()
    }

    /// All open conflicts.
    pub async fn get_conflicts(&self) -> Vec<ConflictInfo> {
        self.state.lock().await.conflicts().to_vec()
    }

    pub async fn last_sync(&self) -> chrono::DateTime<Utc> {
        self.state.lock().await.last_sync()
    }

    // =========================================================================
    // Local mutations
    // =========================================================================

    /// Goods in.
    pub async fn receive(
        &self,
        item_id: &str,
        amount: u32,
        actor: &Actor,
    ) -> Result<InventoryRecord> {
        self.transact(item_id, TransactionKind::Receive, amount, actor)
            .await
    }

    /// Goods out. Refused when more than the cached quantity is requested.
    pub async fn dispatch(
        &self,
        item_id: &str,
        amount: u32,
        actor: &Actor,
    ) -> Result<InventoryRecord> {
        self.transact(item_id, TransactionKind::Dispatch, amount, actor)
            .await
    }

    pub async fn transact(
        &self,
        item_id: &str,
        kind: TransactionKind,
        amount: u32,
        actor: &Actor,
    ) -> Result<InventoryRecord> {
        let delta = kind.signed_delta(amount)?;

        let mut state = self.state.lock().await;
        let available = state
            .record(item_id)
            .map(|r| r.quantity)
            .ok_or_else(|| EngineError::RecordNotFound(item_id.to_string()))?;
        if kind == TransactionKind::Dispatch && amount > available {
            return Err(EngineError::InsufficientStock {
                item_id: item_id.to_string(),
                available,
                requested: amount,
            }
            .into());
        }

        let change = PendingChange::quantity_delta(
            new_change_id(),
            item_id,
            delta,
            Some(available),
            actor,
            Utc::now(),
        );
        self.apply_and_record(&mut state, change).await
    }

    /// Edit metadata fields.
    pub async fn edit(
        &self,
        item_id: &str,
        patch: MetadataPatch,
        actor: &Actor,
    ) -> Result<InventoryRecord> {
        let change =
            PendingChange::metadata_update(new_change_id(), item_id, patch, actor, Utc::now());

        let mut state = self.state.lock().await;
        self.apply_and_record(&mut state, change).await
    }

    /// Apply to the cache, then append to the ledger, as two separate steps.
    ///
    /// Persistence failures are logged, never returned: the mutation stays
    /// applied in memory for the rest of the session.
    async fn apply_and_record(
        &self,
        state: &mut Store,
        change: PendingChange,
    ) -> Result<InventoryRecord> {
        change.validate()?;
        let record = state.apply_optimistic(&change)?.clone();
        if let Err(e) = self.local.save_cache(state).await {
            tracing::warn!(item_id = %change.item_id, error = %e, "Failed to persist record cache");
        }

        let change_id = change.id.clone();
        let item_id = change.item_id.clone();
        state.record_change(change)?;
        if let Err(e) = self.local.save_ledger(state.ledger()).await {
            tracing::warn!(
                item_id = %item_id,
                change_id = %change_id,
                error = %e,
                "Failed to persist pending change; it will not survive a reload"
            );
        }

        tracing::debug!(item_id = %item_id, change_id = %change_id, "Change recorded");
        self.publish(state);
        Ok(record)
    }

    // =========================================================================
    // Server observations
    // =========================================================================

    /// Interpret a server record delivered by a read or the change feed.
    pub async fn observe_server(&self, server: InventoryRecord) -> Observation {
        let item_id = server.id.clone();
        let server_time = server.last_updated.as_ref().and_then(|t| t.to_datetime());

        let mut state = self.state.lock().await;
        let observation = state.observe(server, Utc::now());

        match &observation {
            Observation::Conflict(kind) => {
                tracing::info!(item_id = %item_id, conflict_type = %kind, "Conflict detected");
                self.persist_all(&state).await;
            }
            Observation::Inserted | Observation::Refreshed => {
                // With nothing unconfirmed anywhere, the cache agrees with the server
                if state.unsynced_count() == 0 && state.conflict_count() == 0 {
                    if let Some(at) = server_time {
                        state.advance_last_sync(at);
                    }
                }
                self.persist_all(&state).await;
            }
            Observation::Pending { unsynced } => {
                tracing::debug!(item_id = %item_id, unsynced, "Server copy unchanged, push pending");
            }
            Observation::Deferred => {
                tracing::debug!(item_id = %item_id, "Write in flight, observation deferred");
            }
        }

        self.publish(&state);
        observation
    }

    /// Read one record from the server and observe it.
    pub async fn sync_record(&self, item_id: &str) -> Result<Observation> {
        self.ensure_online()?;
        let server = self.remote.read_one(item_id).await?;
        Ok(self.observe_server(server).await)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve one open conflict.
    ///
    /// The server write comes first. If it fails nothing changes locally and
    /// the conflict stays open. Resolving a record with no open conflict, or
    /// one already being resolved, is a no-op.
    pub async fn resolve(&self, item_id: &str, resolution: Resolution) -> Result<ResolveOutcome> {
        self.ensure_online()?;

        let Some(claim) = self.state.lock().await.begin_resolution(item_id) else {
            tracing::debug!(item_id = %item_id, "No open conflict to resolve");
            return Ok(ResolveOutcome::NoOp);
        };

        tracing::info!(item_id = %item_id, %resolution, "Resolving conflict");
        match self.write_resolution(&claim, resolution).await {
            Ok(record) => Ok(ResolveOutcome::Resolved(record)),
            Err(e) => {
                self.state.lock().await.abort_resolution(item_id);
                tracing::warn!(item_id = %item_id, error = %e, "Resolution failed, conflict kept");
                Err(e)
            }
        }
    }

    async fn write_resolution(
        &self,
        claim: &ResolutionClaim,
        resolution: Resolution,
    ) -> Result<InventoryRecord> {
        let item_id = claim.item_id();

        if self.options.verify_before_resolve {
            let fresh = self.remote.read_one(item_id).await?;
            if classify(&claim.conflict.server_version, &fresh).is_some() {
                let mut state = self.state.lock().await;
                let refreshed = state.refresh_conflict(fresh, Utc::now());
                self.persist_all(&state).await;
                self.publish(&state);

                if let Some(Refresh::Converged { purged }) = refreshed {
                    tracing::info!(
                        item_id = %item_id,
                        purged,
                        "Server caught up with local changes, conflict closed"
                    );
                    return state
                        .record(item_id)
                        .cloned()
                        .ok_or_else(|| EngineError::RecordNotFound(item_id.to_string()).into());
                }
                tracing::info!(item_id = %item_id, "Server moved since detection, conflict refreshed");
                return Err(SyncError::StaleConflict(item_id.to_string()));
            }
        }

        let plan = claim.plan(resolution);
        let fields = resolution_fields(&plan.record, Utc::now());
        let confirmed = self.remote.write_one(item_id, fields).await?;

        let record = self.commit(&plan, confirmed).await;
        tracing::info!(
            item_id = %item_id,
            %resolution,
            quantity = record.quantity,
            "Conflict resolved"
        );
        Ok(record)
    }

    /// Resolve every open conflict with `merge`, one at a time.
    ///
    /// A failure does not stop the others.
    pub async fn resolve_all_with_merge(&self) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let ids: Vec<RecordId> = self
            .get_conflicts()
            .await
            .into_iter()
            .map(|c| c.item_id)
            .collect();

        for item_id in ids {
            match self.resolve(&item_id, Resolution::Merge).await {
                Ok(ResolveOutcome::Resolved(_)) => outcome.resolved.push(item_id),
                Ok(ResolveOutcome::NoOp) => {}
                Err(e) => outcome.failed.push((item_id, e)),
            }
        }

        tracing::info!(
            resolved = outcome.resolved.len(),
            failed = outcome.failed.len(),
            "Batch merge finished"
        );
        outcome
    }

    /// Drop one conflict and accept the server's version. Nothing is written.
    pub async fn dismiss(&self, item_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let dismissed = state.dismiss(item_id).is_some();
        if dismissed {
            tracing::info!(item_id = %item_id, "Conflict dismissed, local changes discarded");
            self.persist_all(&state).await;
            self.publish(&state);
        }
        dismissed
    }

    /// Drop every open conflict that is not mid-resolution.
    pub async fn dismiss_all(&self) -> usize {
        let mut state = self.state.lock().await;
        let dismissed = state.dismiss_all();
        if dismissed > 0 {
            tracing::info!(dismissed, "Conflicts dismissed, local changes discarded");
            self.persist_all(&state).await;
            self.publish(&state);
        }
        dismissed
    }

    // =========================================================================
    // Pending change push
    // =========================================================================

    /// Push pending changes of every record without an open conflict.
    pub async fn reconcile_pending(&self) -> Result<ReconcileReport> {
        self.ensure_online()?;

        let items = self.state.lock().await.pending_items();
        let mut report = ReconcileReport::default();

        for item_id in items {
            match self.push_item(&item_id).await {
                Ok(PushOutcome::Pushed) => report.pushed.push(item_id),
                Ok(PushOutcome::Conflict) => report.conflicts.push(item_id),
                Ok(PushOutcome::Skipped) => {}
                Err(e) => {
                    tracing::warn!(item_id = %item_id, error = %e, "Push failed");
                    report.failed.push((item_id, e));
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                pushed = report.pushed.len(),
                conflicts = report.conflicts.len(),
                failed = report.failed.len(),
                "Reconciliation pass finished"
            );
        }
        Ok(report)
    }

    async fn push_item(&self, item_id: &str) -> Result<PushOutcome> {
        let server = self.remote.read_one(item_id).await?;

        let plan = {
            let mut state = self.state.lock().await;
            match state.observe(server.clone(), Utc::now()) {
                Observation::Conflict(kind) => {
                    tracing::info!(item_id = %item_id, conflict_type = %kind, "Conflict detected");
                    self.persist_all(&state).await;
                    self.publish(&state);
                    return Ok(PushOutcome::Conflict);
                }
                Observation::Pending { .. } => {}
                _ => return Ok(PushOutcome::Skipped),
            }
            let Some(plan) = state.plan_push(&server) else {
                return Ok(PushOutcome::Skipped);
            };
            if !state.begin_push(item_id) {
                return Ok(PushOutcome::Skipped);
            }
            plan
        };

        match self.remote.write_one(item_id, record_fields(&plan.record)).await {
            Ok(confirmed) => {
                let record = self.commit(&plan, confirmed).await;
                tracing::info!(
                    item_id = %item_id,
                    changes = plan.consumed.len(),
                    quantity = record.quantity,
                    "Pending changes pushed"
                );
                Ok(PushOutcome::Pushed)
            }
            Err(e) => {
                self.state.lock().await.abort_resolution(item_id);
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn commit(&self, plan: &ResolutionPlan, confirmed: InventoryRecord) -> InventoryRecord {
        let mut state = self.state.lock().await;
        let purged = state.commit(plan, confirmed, Utc::now());
        tracing::debug!(item_id = %plan.item_id, purged, "Ledger entries purged");
        self.persist_all(&state).await;
        self.publish(&state);
        state
            .record(&plan.item_id)
            .cloned()
            .unwrap_or_else(|| plan.record.clone())
    }

    async fn persist_all(&self, state: &Store) {
        if let Err(e) = self.local.save_all(state).await {
            tracing::warn!(error = %e, "Failed to persist local state");
        }
    }

    fn publish(&self, state: &Store) {
        self.signal
            .set_counts(state.unsynced_count(), state.conflict_count());
    }

    fn ensure_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(SyncError::Offline)
        }
    }
}

fn new_change_id() -> String {
    format!(
        "change_{}_{}",
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}
