//! Interval loop driving one collector until shutdown.

use std::time::Duration;

use pgstats_core::errors::Result;
use pgstats_core::factory::CollectorFactory;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::collector::StatsCollector;

/// Staleness budget for a collector ticking every `every`
pub fn ttl_for(every: Duration) -> i64 {
    (every.as_secs() as i64).saturating_mul(2)
}

/// Tick `collector` every `every` until `shutdown` turns true (or its
/// sender is dropped), then release its source.
///
/// The first tick fires one interval after the call. A tick that overruns
/// delays the next one instead of bunching them up, and a tick in progress
/// always runs to completion; shutdown is only observed between ticks.
/// Tick errors are logged by the collector and the loop carries on.
///
/// # Errors
///
/// - `Shutdown`: releasing the source failed
pub async fn run<F: CollectorFactory>(
    mut collector: StatsCollector<F>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        collector = collector.name(),
        interval_ms = every.as_millis() as u64,
        "collector running"
    );

    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Ok(report) = collector.tick().await {
                    debug!(
                        collector = collector.name(),
                        collected = report.collected,
                        emitted = report.emitted,
                        "tick complete"
                    );
                }
            }
        }
    }

    info!(collector = collector.name(), "collector stopping");
    collector.shutdown().await
}
