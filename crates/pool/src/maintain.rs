//! Periodic compaction of soft-deleted bundles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::pool::BundlePool;

/// Run the pool cleanup job until shutdown is signalled.
///
/// Every `interval` the job compacts the pool and reports the wall-clock
/// duration through `observe` (wired to a histogram by the daemon) and a
/// debug log line.
pub async fn run_cleanup_job<F>(
    pool: Arc<BundlePool>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut observe: F,
) where
    F: FnMut(Duration) + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let start = Instant::now();
                pool.compact();
                let elapsed = start.elapsed();
                observe(elapsed);
                tracing::debug!(duration = ?elapsed, "cleanup job completed");
            }
            _ = shutdown.changed() => {
                tracing::debug!("cleanup job shutting down");
                break;
            }
        }
    }
}
