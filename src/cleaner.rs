//! Keeps the image store bounded by deleting the oldest images.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::CleanerConfig;
use crate::error::Result;
use crate::store::Store;

/// Delete the `clearance_count` oldest images once the store holds at
/// least `image_limit`. Returns how many were deleted.
pub fn check_and_clean(store: &dyn Store, image_limit: usize, clearance_count: usize) -> Result<usize> {
    let size = store.size()?;
    if size < image_limit {
        tracing::debug!(size, image_limit, "store below limit");
        return Ok(0);
    }
    tracing::info!(size, clearance_count, "cleaning up old images");
    store.delete_oldest(clearance_count)
}

/// Clean immediately, then every `interval_secs`, until `cancel` fires.
pub async fn run_cleaner(store: Arc<dyn Store>, config: CleanerConfig, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("cleaner stopped");
                break;
            }
            _ = ticker.tick() => {
                let store = Arc::clone(&store);
                let (limit, clear) = (config.image_limit, config.clearance_count);
                match tokio::task::spawn_blocking(move || check_and_clean(&*store, limit, clear)).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(deleted)) => tracing::info!(deleted, "old images removed"),
                    Ok(Err(e)) => tracing::error!(error = %e, "store cleanup failed"),
                    Err(e) => tracing::error!(error = %e, "cleanup task failed"),
                }
            }
        }
    }
}
