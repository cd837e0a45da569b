//! Sync/presence signal.
//!
//! Connectivity plus the badge counts, published on a `watch` channel so any
//! number of observers see the latest value without polling the service.

use serde::Serialize;
use tokio::sync::watch;

/// What a status badge shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    /// Unsynced ledger entries
    pub pending: usize,
    /// Open conflicts
    pub conflicts: usize,
}

impl SyncStatus {
    pub fn needs_attention(&self) -> bool {
        self.conflicts > 0
    }
}

#[derive(Debug)]
pub struct SyncSignal {
    sender: watch::Sender<SyncStatus>,
}

impl SyncSignal {
    pub fn new(initial: SyncStatus) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Current status.
    pub fn current(&self) -> SyncStatus {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.sender.borrow().online
    }

    /// Record a connectivity transition. Returns whether it changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.sender.send_if_modified(|status| {
            let changed = status.online != online;
            status.online = online;
            changed
        })
    }

    /// Publish fresh counts.
    pub fn set_counts(&self, pending: usize, conflicts: usize) {
        self.sender.send_if_modified(|status| {
            let changed = status.pending != pending || status.conflicts != conflicts;
            status.pending = pending;
            status.conflicts = conflicts;
            changed
        });
    }
}
