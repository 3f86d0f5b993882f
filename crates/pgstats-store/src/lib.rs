//! pgstats store - concrete source and sink collaborators
//!
//! Provides:
//! - PostgreSQL statistics source over sqlx
//! - ClickHouse sink over the HTTP interface
//! - SQLite sink with embedded migrations for development and tests
//! - DSN-based sink selection

use std::sync::Arc;

use pgstats_core::errors::StatsError;
use pgstats_core::sink::Sink;

pub mod clickhouse;
pub mod errors;
pub mod migrations;
pub mod postgres;
pub mod sqlite;

// Re-export key types
pub use clickhouse::ClickHouseSink;
pub use errors::Result;
pub use postgres::{PgSource, SourceLimits};
pub use sqlite::SqliteSink;

const SQLITE_MEMORY: &str = "sqlite::memory:";
const SQLITE_PREFIX: &str = "sqlite://";

/// Open the sink named by `dsn`.
///
/// - `http://...` / `https://...`: ClickHouse HTTP interface
/// - `sqlite::memory:`: in-memory SQLite
/// - `sqlite://<path>`: SQLite file
///
/// # Errors
///
/// - `Configuration`: unsupported scheme
/// - `Connection`: the sink could not be opened
pub fn open_sink(dsn: &str) -> Result<Arc<dyn Sink>> {
    if dsn == SQLITE_MEMORY {
        return Ok(Arc::new(SqliteSink::open_in_memory()?));
    }
    if let Some(path) = dsn.strip_prefix(SQLITE_PREFIX) {
        return Ok(Arc::new(SqliteSink::open(path)?));
    }
    if dsn.starts_with("http://") || dsn.starts_with("https://") {
        return Ok(Arc::new(ClickHouseSink::new(dsn)?));
    }
    let scheme = dsn.split_once("://").map_or(dsn, |(scheme, _)| scheme);
    Err(StatsError::UnsupportedDsn {
        scheme: scheme.to_string(),
    }
    .into())
}
