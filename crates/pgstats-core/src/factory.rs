//! Collector factory: everything family-specific a collector needs.

use crate::errors::StatsError;
use crate::metric::PgMetric;
use crate::source::SourceRecord;

/// Reads one statistics family and knows where its deltas are written
pub trait CollectorFactory: Send + Sync + 'static {
    type Metric: PgMetric;

    /// Collector name used in logs and errors
    fn name(&self) -> &'static str;

    /// Query run against the source on every collection
    fn collect_query(&self) -> &'static str;

    /// Build one typed row, coalescing nullable counters to zero
    fn new_metric(&self, row: &SourceRecord) -> Result<Self::Metric, StatsError>;

    /// Positional insert run once per emitted row
    fn push_query(&self) -> &'static str;
}
