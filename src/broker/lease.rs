use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::broker::store::SharedStore;

/// Periodic sweep that requeues running jobs whose lease expired without a
/// terminal report.
///
/// The sweep is a freshness improvement only: the claim path already treats
/// expired-lease jobs as queued, so correctness and forward progress do not
/// depend on this task running.
pub struct LeaseSweeper {
    store: SharedStore,
    interval: Duration,
}

impl LeaseSweeper {
    pub fn new(store: SharedStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let requeued = self.store.write().await.reclaim_expired(Utc::now());
                    if requeued > 0 {
                        tracing::info!(requeued, "lease sweep requeued orphaned jobs");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("lease sweeper stopping");
                    break;
                }
            }
        }
    }
}
