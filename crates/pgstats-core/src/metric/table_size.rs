//! Per-table size and tuple gauges from `pg_stat_user_tables`.

use super::{identity_hash, IdentityHash, MetricKind, PgMetric, SinkValue};
use crate::errors::StatsError;
use crate::factory::CollectorFactory;
use crate::source::SourceRecord;

/// Table size and live/dead tuple estimates at collection time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PgTableSize {
    pub datname: String,
    pub schemaname: String,
    pub tablename: String,
    pub n_live_tup: f64,
    pub n_dead_tup: f64,
    pub size: f64,
    pub idx_size: f64,
}

impl PgMetric for PgTableSize {
    const KIND: MetricKind = MetricKind::Gauge;

    fn identity(&self) -> IdentityHash {
        identity_hash([
            self.datname.as_str(),
            self.schemaname.as_str(),
            self.tablename.as_str(),
        ])
    }

    fn is_skippable(&self, _prior: &Self) -> bool {
        false
    }

    fn delta(&self, _prior: &Self) -> Self {
        self.clone()
    }

    fn value(&self, hostname: &str) -> Vec<SinkValue> {
        vec![
            SinkValue::from(hostname),
            SinkValue::from(self.datname.as_str()),
            SinkValue::from(self.schemaname.as_str()),
            SinkValue::from(self.tablename.as_str()),
            SinkValue::from(self.n_live_tup),
            SinkValue::from(self.n_dead_tup),
            SinkValue::from(self.size),
            SinkValue::from(self.idx_size),
        ]
    }
}

/// Collector factory for [`PgTableSize`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PgTableSizeFactory;

impl CollectorFactory for PgTableSizeFactory {
    type Metric = PgTableSize;

    fn name(&self) -> &'static str {
        "PgTableSize"
    }

    fn collect_query(&self) -> &'static str {
        r#"
        SELECT
            current_database()::text AS datname,
            schemaname::text AS schemaname,
            relname::text AS tablename,
            n_live_tup::float8 AS n_live_tup,
            n_dead_tup::float8 AS n_dead_tup,
            pg_table_size(relid)::float8 AS size,
            pg_indexes_size(relid)::float8 AS idx_size
        FROM pg_stat_user_tables
        WHERE schemaname NOT IN ('pg_catalog', 'pg_toast', 'information_schema')
        "#
    }

    fn new_metric(&self, row: &SourceRecord) -> Result<PgTableSize, StatsError> {
        Ok(PgTableSize {
            datname: row.text(0)?,
            schemaname: row.text(1)?,
            tablename: row.text(2)?,
            n_live_tup: row.float(3)?,
            n_dead_tup: row.float(4)?,
            size: row.float(5)?,
            idx_size: row.float(6)?,
        })
    }

    fn push_query(&self) -> &'static str {
        r#"INSERT INTO pg.pg_table_size_buffer(
            hostname,
            datname,
            schemaname,
            tablename,
            n_live_tup,
            n_dead_tup,
            size,
            idx_size) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#
    }
}
