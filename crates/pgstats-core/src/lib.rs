//! pgstats core - snapshot-diff kernel
//!
//! This crate holds everything between "rows came back from PostgreSQL" and
//! "rows go into the analytical store":
//! - Metric families with counter/gauge delta rules
//! - Immutable snapshots indexed by identity hash
//! - The merge engine that turns two snapshots into a delta set
//! - Source and sink collaborator contracts, and the all-or-nothing push
//! - Error and logging facilities shared by the other crates

pub mod diff;
pub mod errors;
pub mod factory;
pub mod logging_facility;
pub mod metric;
pub mod sink;
pub mod snapshot;
pub mod source;

// Used by the logging macros
pub use pgstats_core_types;

// Re-export commonly used types
pub use diff::{DeltaSet, DiffEngine, MergeSummary};
pub use errors::{ExError, ExErrorKind, Result, StatsError};
pub use factory::CollectorFactory;
pub use metric::{MetricKind, PgMetric, SinkValue};
pub use sink::{push, Sink, SinkBatch};
pub use snapshot::{collect, Snapshot};
pub use source::{Cell, Source, SourceRecord};
