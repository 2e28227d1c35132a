//! Periodic Sweep Task
//!
//! Background task that periodically purges expired and corrupt cache
//! entries from the store's root directory.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that periodically sweeps the cache store.
///
/// The task runs in an infinite loop, sleeping for the given interval
/// between sweeps. The store itself spawns it at construction and aborts
/// it via `CacheStore::shutdown`; the returned handle is what shutdown
/// aborts.
///
/// # Arguments
/// * `store` - Clone of the store to sweep
/// * `interval` - Time between consecutive sweeps
pub fn spawn_sweep_task(store: CacheStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "starting cache sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.cleanup().await;
            if removed > 0 {
                info!(removed, "cache sweep removed stale entries");
            } else {
                debug!("cache sweep found nothing to remove");
            }
        }
    })
}
