//! Periodic conflict check.
//!
//! A cancellable background task. Every tick it pushes pending changes while
//! online and publishes the open conflicts to watchers. Dropping the poller
//! stops the task.
//!
//! When tracking presence the poller also owns the online state: a pass whose
//! pushes all fail as unreachable takes the service offline, and while
//! offline each tick checks whether the remote store answers again.

use std::sync::Arc;
use std::time::Duration;

use stocksync_engine::ConflictInfo;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::remote::DocumentStore;
use crate::service::SyncService;
use crate::storage::KeyValueStore;

#[derive(Debug)]
pub struct ConflictPoller {
    handle: JoinHandle<()>,
    conflicts: watch::Receiver<Vec<ConflictInfo>>,
}

impl ConflictPoller {
    /// Spawn the poll loop. The first tick runs immediately.
    ///
    /// The online state is left to the caller.
    pub fn start<D, K>(service: Arc<SyncService<D, K>>, interval: Duration) -> Self
    where
        D: DocumentStore + 'static,
        K: KeyValueStore + 'static,
    {
        Self::spawn(service, interval, false)
    }

    /// Spawn the poll loop, deriving the online state from remote failures.
    pub fn start_tracking_presence<D, K>(
        service: Arc<SyncService<D, K>>,
        interval: Duration,
    ) -> Self
    where
        D: DocumentStore + 'static,
        K: KeyValueStore + 'static,
    {
        Self::spawn(service, interval, true)
    }

    fn spawn<D, K>(
        service: Arc<SyncService<D, K>>,
        interval: Duration,
        track_presence: bool,
    ) -> Self
    where
        D: DocumentStore + 'static,
        K: KeyValueStore + 'static,
    {
        let (sender, conflicts) = watch::channel(Vec::new());

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_ms = interval.as_millis() as u64,
                track_presence,
                "Conflict poller started"
            );

            loop {
                ticker.tick().await;

                if track_presence && !service.is_online() {
                    service.check_connectivity().await;
                }

                if service.is_online() {
                    match service.reconcile_pending().await {
                        Ok(report) if track_presence && report.lost_connection() => {
                            tracing::warn!(
                                failed = report.failed.len(),
                                "Remote store unreachable, going offline"
                            );
                            service.set_online(false);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!(error = %e, "Reconciliation skipped"),
                    }
                }

                let open = service.get_conflicts().await;
                sender.send_if_modified(|current| {
                    if *current == open {
                        false
                    } else {
                        *current = open;
                        true
                    }
                });
            }
        });

        Self { handle, conflicts }
    }

    /// Watch the open conflicts.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ConflictInfo>> {
        self.conflicts.clone()
    }

    /// Conflicts as of the last tick.
    pub fn latest(&self) -> Vec<ConflictInfo> {
        self.conflicts.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop polling.
    pub fn stop(self) {
        // Drop aborts the task
    }
}

impl Drop for ConflictPoller {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            tracing::info!("Conflict poller stopped");
        }
    }
}
