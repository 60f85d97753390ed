//! Background job: purge expired access requests.
//!
//! Lazy expiry only catches requests that somebody touches again; this job
//! bounds memory for the ones that are abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::middleware::metrics::Metrics;
use crate::registry::Registry;

/// Spawn the sweeper task. Call this once at startup.
pub fn spawn(registry: Arc<Registry>, metrics: Arc<Metrics>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_once(&registry, &metrics);
        }
    })
}

fn run_once(registry: &Registry, metrics: &Metrics) {
    let removed = registry.sweep();
    if removed > 0 {
        tracing::info!(removed, "purged expired requests");
        metrics.record_swept(removed);
    }
    metrics.set_live_requests(registry.len());
}
