//! Merge output types.

use serde::{Deserialize, Serialize};

use crate::metric::PgMetric;

/// Rows to emit for one tick, plus how each new row was classified.
///
/// Row order follows the new snapshot's index and is unspecified; callers
/// must not depend on it.
#[derive(Debug, Clone)]
pub struct DeltaSet<M: PgMetric> {
    pub rows: Vec<M>,
    pub summary: MergeSummary,
}

impl<M: PgMetric> DeltaSet<M> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn into_rows(self) -> Vec<M> {
        self.rows
    }
}

/// Per-merge classification counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeSummary {
    /// Identities present in both snapshots
    pub matched: usize,
    /// Matched identities with no activity, not emitted
    pub skipped: usize,
    /// Matched identities emitted as a delta (or raw after a reset)
    pub deltas: usize,
    /// Identities seen for the first time, emitted unchanged
    pub passthrough: usize,
    /// Identities of the held snapshot missing from the new one
    pub dropped: usize,
}

impl MergeSummary {
    /// Rows emitted by the merge
    pub fn emitted(&self) -> usize {
        self.deltas + self.passthrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitted_counts_deltas_and_passthrough() {
        let summary = MergeSummary {
            matched: 4,
            skipped: 1,
            deltas: 3,
            passthrough: 2,
            dropped: 5,
        };
        assert_eq!(summary.emitted(), 5);
    }

    #[test]
    fn test_summary_serializes_flat() {
        let json = serde_json::to_value(MergeSummary::default()).unwrap();
        assert_eq!(json["dropped"], 0);
        assert_eq!(json.as_object().map(|o| o.len()), Some(5));
    }
}
