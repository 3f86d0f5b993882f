//! PostgreSQL statistics source.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use pgstats_core::errors::{ExError, ExErrorKind};
use pgstats_core::source::{Cell, Source, SourceRecord};
use pgstats_core_types::Sensitive;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::errors::{connection_error, from_sqlx, Result};

/// Connection limits of one collector's source.
///
/// The defaults keep exactly one open connection and nothing idle, so a
/// collector never shows up as more than one backend on the monitored
/// server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLimits {
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            max_open_conns: 1,
            max_idle_conns: 0,
            idle_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// A dedicated connection to the monitored PostgreSQL server
#[derive(Debug)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    /// Connect and ping once.
    ///
    /// Prepared statement caching is disabled: the same statistics query
    /// runs every tick and must not leave prepared statements behind on
    /// the monitored server.
    ///
    /// # Errors
    ///
    /// - `Connection`: the DSN is invalid or the server is unreachable
    pub async fn connect(dsn: &Sensitive<String>, limits: SourceLimits) -> Result<Self> {
        let options = PgConnectOptions::from_str(dsn.expose())
            .map_err(|e| connection_error("pg_connect", e))?
            .statement_cache_capacity(0);
        let pool = PgPoolOptions::new()
            .max_connections(limits.max_open_conns)
            .min_connections(limits.max_idle_conns)
            .idle_timeout(Some(limits.idle_timeout))
            .acquire_timeout(limits.connect_timeout)
            .test_before_acquire(false)
            .connect_with(options)
            .await
            .map_err(|e| connection_error("pg_connect", e))?;

        let source = Self { pool };
        source.ping().await?;
        debug!(
            max_open_conns = limits.max_open_conns,
            max_idle_conns = limits.max_idle_conns,
            "postgres source connected"
        );
        Ok(source)
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| connection_error("pg_ping", e))?;
        Ok(())
    }
}

#[async_trait]
impl Source for PgSource {
    async fn fetch(&mut self, query: &str) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(from_sqlx)?;
        rows.iter().map(to_record).collect()
    }

    async fn close(&mut self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Materialize one row by column type.
///
/// The family queries cast every numeric column to `float8` or `int8` and
/// every name to `text`; the narrower types are accepted for ad-hoc queries.
fn to_record(row: &PgRow) -> Result<SourceRecord> {
    let mut cells = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        if row.try_get_raw(index).map_err(from_sqlx)?.is_null() {
            cells.push(Cell::Null);
            continue;
        }
        let cell = match column.type_info().name() {
            "INT2" => Cell::Int(i64::from(row.try_get::<i16, _>(index).map_err(from_sqlx)?)),
            "INT4" => Cell::Int(i64::from(row.try_get::<i32, _>(index).map_err(from_sqlx)?)),
            "INT8" => Cell::Int(row.try_get::<i64, _>(index).map_err(from_sqlx)?),
            "FLOAT4" => Cell::Float(f64::from(row.try_get::<f32, _>(index).map_err(from_sqlx)?)),
            "FLOAT8" => Cell::Float(row.try_get::<f64, _>(index).map_err(from_sqlx)?),
            "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" => {
                Cell::Text(row.try_get::<String, _>(index).map_err(from_sqlx)?)
            }
            other => {
                return Err(ExError::new(ExErrorKind::Collection)
                    .with_op("fetch")
                    .with_message(format!(
                        "column {} ({}) has unsupported type {}",
                        index,
                        column.name(),
                        other
                    )))
            }
        };
        cells.push(cell);
    }
    Ok(SourceRecord::new(cells))
}
