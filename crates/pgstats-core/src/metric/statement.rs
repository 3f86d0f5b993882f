//! Per-query execution statistics from `pg_stat_statements`.

use super::{identity_hash, Counter, IdentityHash, MetricKind, PgMetric, SinkValue};
use crate::errors::StatsError;
use crate::factory::CollectorFactory;
use crate::source::SourceRecord;

/// One `pg_stat_statements` row.
///
/// Identified by (queryid, datname, username), which is how PostgreSQL
/// documents a statement entry. `calls` is the monotonic field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PgStatStatement {
    pub queryid: i64,
    pub datname: String,
    pub username: String,
    pub query: String,
    pub calls: f64,
    pub total_time: f64,
    pub rows: f64,
    pub shared_blks_hit: f64,
    pub shared_blks_read: f64,
    pub shared_blks_dirtied: f64,
    pub shared_blks_written: f64,
    pub local_blks_hit: f64,
    pub local_blks_read: f64,
    pub local_blks_dirtied: f64,
    pub local_blks_written: f64,
    pub temp_blks_read: f64,
    pub temp_blks_written: f64,
    pub blk_read_time: f64,
    pub blk_write_time: f64,
}

impl Counter for PgStatStatement {
    fn monotonic(&self) -> Vec<f64> {
        vec![self.calls]
    }

    fn subtract(&self, prior: &Self) -> Self {
        Self {
            queryid: self.queryid,
            datname: self.datname.clone(),
            username: self.username.clone(),
            query: self.query.clone(),
            calls: self.calls - prior.calls,
            total_time: self.total_time - prior.total_time,
            rows: self.rows - prior.rows,
            shared_blks_hit: self.shared_blks_hit - prior.shared_blks_hit,
            shared_blks_read: self.shared_blks_read - prior.shared_blks_read,
            shared_blks_dirtied: self.shared_blks_dirtied - prior.shared_blks_dirtied,
            shared_blks_written: self.shared_blks_written - prior.shared_blks_written,
            local_blks_hit: self.local_blks_hit - prior.local_blks_hit,
            local_blks_read: self.local_blks_read - prior.local_blks_read,
            local_blks_dirtied: self.local_blks_dirtied - prior.local_blks_dirtied,
            local_blks_written: self.local_blks_written - prior.local_blks_written,
            temp_blks_read: self.temp_blks_read - prior.temp_blks_read,
            temp_blks_written: self.temp_blks_written - prior.temp_blks_written,
            blk_read_time: self.blk_read_time - prior.blk_read_time,
            blk_write_time: self.blk_write_time - prior.blk_write_time,
        }
    }
}

impl PgMetric for PgStatStatement {
    const KIND: MetricKind = MetricKind::Counter;

    fn identity(&self) -> IdentityHash {
        let queryid = self.queryid.to_string();
        identity_hash([
            queryid.as_str(),
            self.datname.as_str(),
            self.username.as_str(),
        ])
    }

    fn is_skippable(&self, prior: &Self) -> bool {
        // A reset that lands on exactly the previous call count is not
        // detectable and that tick's activity is lost.
        self.counter_is_skippable(prior)
    }

    fn delta(&self, prior: &Self) -> Self {
        self.counter_delta(prior)
    }

    fn value(&self, hostname: &str) -> Vec<SinkValue> {
        vec![
            SinkValue::from(hostname),
            SinkValue::from(self.datname.as_str()),
            SinkValue::from(self.username.as_str()),
            SinkValue::from(self.query.as_str()),
            SinkValue::from(self.calls),
            SinkValue::from(self.total_time),
            SinkValue::from(self.rows),
            SinkValue::from(self.shared_blks_hit),
            SinkValue::from(self.shared_blks_read),
            SinkValue::from(self.shared_blks_dirtied),
            SinkValue::from(self.shared_blks_written),
            SinkValue::from(self.local_blks_hit),
            SinkValue::from(self.local_blks_read),
            SinkValue::from(self.local_blks_dirtied),
            SinkValue::from(self.local_blks_written),
            SinkValue::from(self.temp_blks_read),
            SinkValue::from(self.temp_blks_written),
            SinkValue::from(self.blk_read_time),
            SinkValue::from(self.blk_write_time),
        ]
    }
}

/// Collector factory for [`PgStatStatement`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PgStatStatementsFactory;

impl CollectorFactory for PgStatStatementsFactory {
    type Metric = PgStatStatement;

    fn name(&self) -> &'static str {
        "PgStatStatements"
    }

    fn collect_query(&self) -> &'static str {
        r#"
        SELECT
            queryid,
            datname::text AS datname,
            pg_catalog.pg_get_userbyid(userid)::text AS username,
            left(query, 3000) AS query,
            calls::float8 AS calls,
            total_time::float8 AS total_time,
            rows::float8 AS rows,
            shared_blks_hit::float8 AS shared_blks_hit,
            shared_blks_read::float8 AS shared_blks_read,
            shared_blks_dirtied::float8 AS shared_blks_dirtied,
            shared_blks_written::float8 AS shared_blks_written,
            local_blks_hit::float8 AS local_blks_hit,
            local_blks_read::float8 AS local_blks_read,
            local_blks_dirtied::float8 AS local_blks_dirtied,
            local_blks_written::float8 AS local_blks_written,
            temp_blks_read::float8 AS temp_blks_read,
            temp_blks_written::float8 AS temp_blks_written,
            blk_read_time::float8 AS blk_read_time,
            blk_write_time::float8 AS blk_write_time
        FROM pg_stat_statements
        JOIN pg_database ON pg_stat_statements.dbid = pg_database.oid
        ORDER BY queryid, datname, username, query
        "#
    }

    fn new_metric(&self, row: &SourceRecord) -> Result<PgStatStatement, StatsError> {
        Ok(PgStatStatement {
            queryid: row.int(0)?,
            datname: row.text(1)?,
            username: row.text(2)?,
            query: row.text(3)?,
            calls: row.float(4)?,
            total_time: row.float(5)?,
            rows: row.float(6)?,
            shared_blks_hit: row.float(7)?,
            shared_blks_read: row.float(8)?,
            shared_blks_dirtied: row.float(9)?,
            shared_blks_written: row.float(10)?,
            local_blks_hit: row.float(11)?,
            local_blks_read: row.float(12)?,
            local_blks_dirtied: row.float(13)?,
            local_blks_written: row.float(14)?,
            temp_blks_read: row.float(15)?,
            temp_blks_written: row.float(16)?,
            blk_read_time: row.float(17)?,
            blk_write_time: row.float(18)?,
        })
    }

    fn push_query(&self) -> &'static str {
        r#"INSERT INTO pg.pg_stat_statements_buffer(
            hostname,
            datname,
            username,
            query,
            calls,
            total_time,
            rows,
            shared_blks_hit,
            shared_blks_read,
            shared_blks_dirtied,
            shared_blks_written,
            local_blks_hit,
            local_blks_read,
            local_blks_dirtied,
            local_blks_written,
            temp_blks_read,
            temp_blks_written,
            blk_read_time,
            blk_write_time) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )"#
    }
}
