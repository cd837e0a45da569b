//! StockSync Agent - headless sync runtime.
//!
//! Keeps the local inventory state in step with the remote document store:
//! pushes pending changes and tracks open conflicts until interrupted.

use std::sync::Arc;

use stocksync_client::{
    Config, ConflictPoller, HttpDocumentStore, LocalStore, SqliteKv, SyncOptions, SyncService,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stocksync_client=debug,stocksync_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        remote = %config.remote_url,
        collection = %config.collection,
        "Starting StockSync agent"
    );

    // Open local storage
    let kv = SqliteKv::connect(&config.local_db_url).await?;
    tracing::info!("Running local storage migrations...");
    kv.run_migrations().await?;

    let remote = HttpDocumentStore::new(&config.remote_url, &config.collection)?;
    let service = Arc::new(
        SyncService::open(remote, LocalStore::new(kv), SyncOptions::from(&config)).await?,
    );
    if !service.check_connectivity().await {
        tracing::warn!("Remote store unreachable, starting offline");
    }

    let poller =
        ConflictPoller::start_tracking_presence(Arc::clone(&service), config.poll_interval);
    let mut status = service.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                tracing::info!(
                    online = current.online,
                    pending = current.pending,
                    conflicts = current.conflicts,
                    "Sync status"
                );
            }
        }
    }

    tracing::info!("Shutting down");
    poller.stop();
    Ok(())
}
