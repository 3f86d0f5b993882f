//! Held-snapshot merge engine.
//!
//! The core entry point is [`DiffEngine::merge`], which compares a freshly
//! collected snapshot against the held one and produces a [`DeltaSet`].

use tracing::debug;

use crate::diff::model::{DeltaSet, MergeSummary};
use crate::errors::{Result, StatsError};
use crate::metric::PgMetric;
use crate::snapshot::Snapshot;

/// Owns the previous snapshot of one collector and the staleness budget.
///
/// Not shared: each collector drives its own engine from a single task.
#[derive(Debug)]
pub struct DiffEngine<M: PgMetric> {
    held: Snapshot<M>,
    ttl_secs: i64,
}

impl<M: PgMetric> DiffEngine<M> {
    /// Start from the first collected snapshot; nothing is emitted for it
    pub fn new(baseline: Snapshot<M>, ttl_secs: i64) -> Self {
        Self {
            held: baseline,
            ttl_secs,
        }
    }

    pub fn held(&self) -> &Snapshot<M> {
        &self.held
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Merge `next` against the held snapshot and make it the new baseline.
    ///
    /// The held snapshot is replaced on every call, including the stale
    /// path, so the following tick always diffs against the latest data.
    ///
    /// # Errors
    ///
    /// - `Stale`: `next.version - held.version > ttl`; no rows are produced
    pub fn merge(&mut self, next: Snapshot<M>) -> Result<DeltaSet<M>> {
        let gap_secs = next.version() - self.held.version();
        if gap_secs > self.ttl_secs {
            debug!(
                gap_secs,
                ttl_secs = self.ttl_secs,
                "snapshot gap exceeds ttl, re-baselining"
            );
            self.held = next;
            return Err(StatsError::SnapshotStale {
                gap_secs,
                ttl_secs: self.ttl_secs,
            }
            .into());
        }

        let mut summary = MergeSummary::default();
        let mut rows = Vec::new();
        for (&hash, &position) in next.index() {
            let current = &next.rows()[position];
            match self.held.get(hash) {
                Some(prior) => {
                    summary.matched += 1;
                    if current.is_skippable(prior) {
                        summary.skipped += 1;
                    } else {
                        summary.deltas += 1;
                        rows.push(current.delta(prior));
                    }
                }
                None => {
                    summary.passthrough += 1;
                    rows.push(current.clone());
                }
            }
        }
        summary.dropped = self
            .held
            .index()
            .keys()
            .filter(|hash| !next.index().contains_key(hash))
            .count();

        debug!(
            held_version = self.held.version(),
            next_version = next.version(),
            matched = summary.matched,
            skipped = summary.skipped,
            deltas = summary.deltas,
            passthrough = summary.passthrough,
            dropped = summary.dropped,
            "merged snapshot"
        );

        self.held = next;
        Ok(DeltaSet { rows, summary })
    }
}
