use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::WorkerSettings;
use crate::services::cache::RateCache;
use crate::services::rate_aggregator::RateAggregator;

/// Outcome of one ingestion pass over the configured pair set.
#[derive(Debug, Clone, Copy)]
pub struct CycleSummary {
    pub pairs_attempted: usize,
    pub pairs_succeeded: usize,
    pub duration: Duration,
}

/// Background loop that keeps the fresh cache populated for the working set
/// and feeds the broadcast channel, independent of user request patterns.
pub struct RateIngestor {
    aggregator: Arc<RateAggregator>,
    cache: Arc<dyn RateCache>,
    worker: WorkerSettings,
}

impl RateIngestor {
    pub fn new(aggregator: Arc<RateAggregator>, cache: Arc<dyn RateCache>, worker: WorkerSettings) -> Self {
        info!(
            base_currencies = ?worker.base_currencies,
            target_currencies = ?worker.target_currencies,
            update_interval_secs = worker.update_interval_secs,
            total_pairs = worker.total_pairs(),
            "rate ingestor initialized"
        );
        Self {
            aggregator,
            cache,
            worker,
        }
    }

    /// Main loop. Runs until the shutdown flag flips; the current cycle
    /// completes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("rate ingestor started");
        let interval = Duration::from_secs(self.worker.update_interval_secs);
        let mut cycle_count: u64 = 0;

        while !*shutdown.borrow() {
            cycle_count += 1;

            match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(summary) => {
                    info!(
                        cycle = cycle_count,
                        pairs_attempted = summary.pairs_attempted,
                        pairs_succeeded = summary.pairs_succeeded,
                        duration_secs = summary.duration.as_secs_f64(),
                        "update cycle completed"
                    );
                }
                Err(_) => {
                    error!(cycle = cycle_count, "CRITICAL: worker cycle panicked, continuing");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("rate ingestor stopped");
    }

    /// One complete pass: all base currencies in parallel, targets within a
    /// base sequentially. Pair failures are isolated.
    pub async fn run_cycle(&self) -> CycleSummary {
        let cycle_start = std::time::Instant::now();

        let per_base = join_all(
            self.worker
                .base_currencies
                .iter()
                .map(|base| self.fetch_and_publish_for_base(base)),
        )
        .await;

        let pairs_attempted = per_base.iter().map(|(attempted, _)| attempted).sum();
        let pairs_succeeded = per_base.iter().map(|(_, succeeded)| succeeded).sum();

        CycleSummary {
            pairs_attempted,
            pairs_succeeded,
            duration: cycle_start.elapsed(),
        }
    }

    /// Fetch, cache and publish each target for one base. Returns
    /// (attempted, succeeded).
    async fn fetch_and_publish_for_base(&self, base: &str) -> (usize, usize) {
        let mut attempted = 0;
        let mut succeeded = 0;

        for target in self.worker.target_currencies.iter().filter(|t| *t != base) {
            attempted += 1;
            match self.aggregator.get_rate(base, target).await {
                Ok(aggregated) => {
                    let update = aggregated.to_update();
                    self.cache.set_latest_rate(&update).await;
                    self.cache.publish_rate_update(&update).await;
                    succeeded += 1;
                }
                Err(err) => {
                    error!(base, target = %target, error = %err, "failed to fetch or publish rate");
                }
            }
        }

        (attempted, succeeded)
    }
}
