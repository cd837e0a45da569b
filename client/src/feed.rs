//! Change feed listener.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::remote::{ChangeFeed, DocumentStore};
use crate::service::SyncService;
use crate::storage::KeyValueStore;

/// Forwards every record from a change feed to
/// [`SyncService::observe_server`]. Records arriving while offline are
/// ignored. The task is aborted on drop.
#[derive(Debug)]
pub struct FeedListener {
    handle: JoinHandle<()>,
}

impl FeedListener {
    /// Subscribe now and spawn the forwarding task.
    pub fn start<F, D, K>(feed: &F, service: Arc<SyncService<D, K>>) -> Self
    where
        F: ChangeFeed + ?Sized,
        D: DocumentStore + 'static,
        K: KeyValueStore + 'static,
    {
        let mut records = feed.subscribe();

        let handle = tokio::spawn(async move {
            while let Some(record) = records.next().await {
                if !service.is_online() {
                    continue;
                }
                let item_id = record.id.clone();
                let observation = service.observe_server(record).await;
                tracing::trace!(item_id = %item_id, ?observation, "Feed record observed");
            }
            tracing::info!("Change feed closed");
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {}
}

impl Drop for FeedListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
