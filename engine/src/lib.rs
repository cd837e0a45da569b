//! # StockSync Engine
//!
//! Deterministic offline conflict resolution for inventory records.
//!
//! Inventory mutations made while disconnected are applied optimistically to a
//! local cache and appended to a ledger. When the authoritative server record
//! is observed again, the engine decides whether the two copies truly
//! diverged and, once the user picks a resolution, what gets written back.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches disk or network; the client crate does
//! - **Deterministic**: time is always an input, never read from the system
//! - **No lost writes**: quantity moves are signed deltas replayed on top of the
//!   server's current value, never absolute overwrites
//!
//! ## Core Concepts
//!
//! ### Pending changes and the ledger
//!
//! A [`PendingChange`] is either a `quantity_delta` (one receive or dispatch) or
//! a `metadata_update` (an edit). The [`Ledger`] keeps them in creation order
//! until they are confirmed and purged.
//!
//! ### Detection
//!
//! [`detect_conflict`] compares a server record against the local one and the
//! last-sync marker. Only a server copy newer than the marker whose fields
//! differ is a conflict; an unreadable server timestamp never is.
//!
//! ### Reconciliation
//!
//! [`merge_quantity`] computes `max(0, server + sum(deltas))`. A [`Resolution`]
//! (`keep_local`, `keep_server`, `merge`) turns a [`ConflictInfo`] into a
//! [`ResolutionPlan`].
//!
//! ## Quick Start
//!
//! ```rust
//! use stocksync_engine::{
//!     Actor, InventoryRecord, Observation, PendingChange, Resolution, ServerTimestamp, Store,
//! };
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let synced_at = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
//! let widget = InventoryRecord::new("item-1", "Widget", "Parts", 100, 5, "A1")
//!     .with_last_updated(ServerTimestamp::epoch(synced_at));
//!
//! let mut store = Store::new();
//! store.observe(widget.clone(), synced_at);
//! store.advance_last_sync(synced_at);
//!
//! // Offline: receive 5, dispatch 20
//! let alice = Actor::new("u-1", "Alice");
//! for (id, delta) in [("c-1", 5), ("c-2", -20)] {
//!     let change = PendingChange::quantity_delta(id, "item-1", delta, None, &alice, synced_at);
//!     store.apply_optimistic(&change).unwrap();
//!     store.record_change(change).unwrap();
//! }
//!
//! // Back online: someone else touched the record meanwhile
//! let later = synced_at + Duration::minutes(5);
//! let server = widget.with_last_updated(ServerTimestamp::epoch(later));
//! assert!(matches!(store.observe(server, later), Observation::Conflict(_)));
//!
//! let claim = store.begin_resolution("item-1").unwrap();
//! let plan = claim.plan(Resolution::Merge);
//! assert_eq!(plan.record.quantity, 85);
//! ```

pub mod change;
pub mod conflict;
pub mod detect;
pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod timestamp;

// Re-export main types at crate root
pub use change::{Actor, ChangeKind, PendingChange, TransactionKind};
pub use conflict::{ConflictInfo, ConflictKind, ConflictSet};
pub use detect::{classify, detect_conflict};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use reconcile::{merge_quantity, plan_push, plan_resolution, Resolution, ResolutionPlan};
pub use record::{InventoryRecord, MetadataPatch};
pub use store::{Observation, Refresh, ResolutionClaim, Store};
pub use timestamp::ServerTimestamp;

/// Type aliases for clarity
pub type RecordId = String;
pub type ChangeId = String;
