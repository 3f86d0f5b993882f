//! Per-table I/O and access counters from `pg_statio_user_tables` joined
//! with `pg_stat_user_tables`.

use super::{identity_hash, Counter, IdentityHash, MetricKind, PgMetric, SinkValue};
use crate::errors::StatsError;
use crate::factory::CollectorFactory;
use crate::source::SourceRecord;

/// One table's I/O and access counters.
///
/// Index and TOAST columns are NULL for tables without indexes or TOAST
/// relations; those read as zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PgStatioTable {
    pub datname: String,
    pub schemaname: String,
    pub tablename: String,
    pub heap_blks_read: f64,
    pub heap_blks_hit: f64,
    pub idx_blks_read: f64,
    pub idx_blks_hit: f64,
    pub toast_blks_read: f64,
    pub toast_blks_hit: f64,
    pub tidx_blks_read: f64,
    pub tidx_blks_hit: f64,
    pub seq_scan: f64,
    pub seq_tup_read: f64,
    pub idx_scan: f64,
    pub idx_tup_fetch: f64,
    pub n_tup_ins: f64,
    pub n_tup_upd: f64,
    pub n_tup_del: f64,
    pub n_tup_hot_upd: f64,
    pub vacuum_count: f64,
    pub autovacuum_count: f64,
    pub analyze_count: f64,
    pub autoanalyze_count: f64,
}

impl Counter for PgStatioTable {
    fn monotonic(&self) -> Vec<f64> {
        vec![
            self.idx_scan,
            self.seq_scan,
            self.n_tup_ins,
            self.n_tup_upd,
            self.n_tup_del,
        ]
    }

    fn subtract(&self, prior: &Self) -> Self {
        Self {
            datname: self.datname.clone(),
            schemaname: self.schemaname.clone(),
            tablename: self.tablename.clone(),
            heap_blks_read: self.heap_blks_read - prior.heap_blks_read,
            heap_blks_hit: self.heap_blks_hit - prior.heap_blks_hit,
            idx_blks_read: self.idx_blks_read - prior.idx_blks_read,
            idx_blks_hit: self.idx_blks_hit - prior.idx_blks_hit,
            toast_blks_read: self.toast_blks_read - prior.toast_blks_read,
            toast_blks_hit: self.toast_blks_hit - prior.toast_blks_hit,
            tidx_blks_read: self.tidx_blks_read - prior.tidx_blks_read,
            tidx_blks_hit: self.tidx_blks_hit - prior.tidx_blks_hit,
            seq_scan: self.seq_scan - prior.seq_scan,
            seq_tup_read: self.seq_tup_read - prior.seq_tup_read,
            idx_scan: self.idx_scan - prior.idx_scan,
            idx_tup_fetch: self.idx_tup_fetch - prior.idx_tup_fetch,
            n_tup_ins: self.n_tup_ins - prior.n_tup_ins,
            n_tup_upd: self.n_tup_upd - prior.n_tup_upd,
            n_tup_del: self.n_tup_del - prior.n_tup_del,
            n_tup_hot_upd: self.n_tup_hot_upd - prior.n_tup_hot_upd,
            vacuum_count: self.vacuum_count - prior.vacuum_count,
            autovacuum_count: self.autovacuum_count - prior.autovacuum_count,
            analyze_count: self.analyze_count - prior.analyze_count,
            autoanalyze_count: self.autoanalyze_count - prior.autoanalyze_count,
        }
    }
}

impl PgMetric for PgStatioTable {
    const KIND: MetricKind = MetricKind::Counter;

    fn identity(&self) -> IdentityHash {
        identity_hash([
            self.datname.as_str(),
            self.schemaname.as_str(),
            self.tablename.as_str(),
        ])
    }

    fn is_skippable(&self, prior: &Self) -> bool {
        self.counter_is_skippable(prior)
    }

    fn delta(&self, prior: &Self) -> Self {
        self.counter_delta(prior)
    }

    fn value(&self, hostname: &str) -> Vec<SinkValue> {
        vec![
            SinkValue::from(hostname),
            SinkValue::from(self.datname.as_str()),
            SinkValue::from(self.schemaname.as_str()),
            SinkValue::from(self.tablename.as_str()),
            SinkValue::from(self.heap_blks_read),
            SinkValue::from(self.heap_blks_hit),
            SinkValue::from(self.idx_blks_read),
            SinkValue::from(self.idx_blks_hit),
            SinkValue::from(self.toast_blks_read),
            SinkValue::from(self.toast_blks_hit),
            SinkValue::from(self.tidx_blks_read),
            SinkValue::from(self.tidx_blks_hit),
            SinkValue::from(self.seq_scan),
            SinkValue::from(self.seq_tup_read),
            SinkValue::from(self.idx_scan),
            SinkValue::from(self.idx_tup_fetch),
            SinkValue::from(self.n_tup_ins),
            SinkValue::from(self.n_tup_upd),
            SinkValue::from(self.n_tup_del),
            SinkValue::from(self.n_tup_hot_upd),
            SinkValue::from(self.vacuum_count),
            SinkValue::from(self.autovacuum_count),
            SinkValue::from(self.analyze_count),
            SinkValue::from(self.autoanalyze_count),
        ]
    }
}

/// Collector factory for [`PgStatioTable`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PgStatioTableFactory;

impl CollectorFactory for PgStatioTableFactory {
    type Metric = PgStatioTable;

    fn name(&self) -> &'static str {
        "PgStatioTable"
    }

    fn collect_query(&self) -> &'static str {
        r#"
        SELECT
            current_database()::text AS datname,
            a.schemaname::text AS schemaname,
            a.relname::text AS tablename,
            heap_blks_read::float8 AS heap_blks_read,
            heap_blks_hit::float8 AS heap_blks_hit,
            idx_blks_read::float8 AS idx_blks_read,
            idx_blks_hit::float8 AS idx_blks_hit,
            toast_blks_read::float8 AS toast_blks_read,
            toast_blks_hit::float8 AS toast_blks_hit,
            tidx_blks_read::float8 AS tidx_blks_read,
            tidx_blks_hit::float8 AS tidx_blks_hit,
            seq_scan::float8 AS seq_scan,
            seq_tup_read::float8 AS seq_tup_read,
            idx_scan::float8 AS idx_scan,
            idx_tup_fetch::float8 AS idx_tup_fetch,
            n_tup_ins::float8 AS n_tup_ins,
            n_tup_upd::float8 AS n_tup_upd,
            n_tup_del::float8 AS n_tup_del,
            n_tup_hot_upd::float8 AS n_tup_hot_upd,
            vacuum_count::float8 AS vacuum_count,
            autovacuum_count::float8 AS autovacuum_count,
            analyze_count::float8 AS analyze_count,
            autoanalyze_count::float8 AS autoanalyze_count
        FROM pg_statio_user_tables a
        JOIN pg_stat_user_tables b USING (relid)
        WHERE a.schemaname NOT IN ('pg_toast', 'information_schema')
        "#
    }

    fn new_metric(&self, row: &SourceRecord) -> Result<PgStatioTable, StatsError> {
        Ok(PgStatioTable {
            datname: row.text(0)?,
            schemaname: row.text(1)?,
            tablename: row.text(2)?,
            heap_blks_read: row.float(3)?,
            heap_blks_hit: row.float(4)?,
            idx_blks_read: row.float_or_zero(5)?,
            idx_blks_hit: row.float_or_zero(6)?,
            toast_blks_read: row.float_or_zero(7)?,
            toast_blks_hit: row.float_or_zero(8)?,
            tidx_blks_read: row.float_or_zero(9)?,
            tidx_blks_hit: row.float_or_zero(10)?,
            seq_scan: row.float(11)?,
            seq_tup_read: row.float(12)?,
            idx_scan: row.float_or_zero(13)?,
            idx_tup_fetch: row.float_or_zero(14)?,
            n_tup_ins: row.float(15)?,
            n_tup_upd: row.float(16)?,
            n_tup_del: row.float(17)?,
            n_tup_hot_upd: row.float(18)?,
            vacuum_count: row.float(19)?,
            autovacuum_count: row.float(20)?,
            analyze_count: row.float(21)?,
            autoanalyze_count: row.float(22)?,
        })
    }

    fn push_query(&self) -> &'static str {
        r#"INSERT INTO pg.pg_statio_tables_buffer(
            hostname,
            datname,
            schemaname,
            tablename,
            heap_blks_read,
            heap_blks_hit,
            idx_blks_read,
            idx_blks_hit,
            toast_blks_read,
            toast_blks_hit,
            tidx_blks_read,
            tidx_blks_hit,
            seq_scan,
            seq_tup_read,
            idx_scan,
            idx_tup_fetch,
            n_tup_ins,
            n_tup_upd,
            n_tup_del,
            n_tup_hot_upd,
            vacuum_count,
            autovacuum_count,
            analyze_count,
            autoanalyze_count) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?
            )"#
    }
}
