//! Local SQLite sink.
//!
//! Stands in for ClickHouse in development and tests. The target database is
//! attached as schema `pg`, so the family insert templates
//! (`INSERT INTO pg.<table> ...`) run unchanged. One connection is shared by
//! every collector; a batch holds it for its whole lifetime, so batches from
//! different collectors are serialized.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use pgstats_core::metric::SinkValue;
use pgstats_core::sink::{Sink, SinkBatch};
use rusqlite::types::Value;
use rusqlite::Connection;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::errors::{connection_error, from_rusqlite, shutdown_error, sink_closed, Result};
use crate::migrations::apply_migrations;

const MEMORY: &str = ":memory:";

#[derive(Clone)]
pub struct SqliteSink {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteSink {
    /// Open a sink whose `pg` schema lives in memory
    pub fn open_in_memory() -> Result<Self> {
        Self::attach(MEMORY)
    }

    /// Open a sink whose `pg` schema is the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let target = path
            .to_str()
            .ok_or_else(|| connection_error("sqlite_open", "database path is not valid UTF-8"))?;
        Self::attach(target)
    }

    fn attach(target: &str) -> Result<Self> {
        let mut conn =
            Connection::open_in_memory().map_err(|e| connection_error("sqlite_open", e))?;
        conn.execute("ATTACH DATABASE ?1 AS pg", [target])
            .map_err(|e| connection_error("sqlite_attach", e))?;
        apply_migrations(&mut conn)?;
        debug!(target, "sqlite sink opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Number of committed rows in `pg.<table>`
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(|| sink_closed("row_count"))?;
        conn.query_row(&format!("SELECT COUNT(*) FROM pg.{}", table), [], |row| {
            row.get(0)
        })
        .map_err(from_rusqlite)
    }

    /// Text values of one column of `pg.<table>`, in insertion order
    pub async fn column_text(&self, table: &str, column: &str) -> Result<Vec<String>> {
        self.column(table, column).await
    }

    /// Numeric values of one column of `pg.<table>`, in insertion order
    pub async fn column_float(&self, table: &str, column: &str) -> Result<Vec<f64>> {
        self.column(table, column).await
    }

    async fn column<T: rusqlite::types::FromSql>(&self, table: &str, column: &str) -> Result<Vec<T>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(|| sink_closed("column"))?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM pg.{} ORDER BY rowid", column, table))
            .map_err(from_rusqlite)?;
        let values = stmt
            .query_map([], |row| row.get::<_, T>(0))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(values)
    }
}

fn to_sql_value(value: &SinkValue) -> Value {
    match value {
        SinkValue::Text(text) => Value::Text(text.clone()),
        SinkValue::Float(number) => Value::Real(*number),
    }
}

#[async_trait]
impl Sink for SqliteSink {
    async fn ping(&self) -> Result<()> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(|| sink_closed("ping"))?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| connection_error("ping", e))
    }

    async fn begin(&self, template: &str) -> Result<Box<dyn SinkBatch>> {
        let guard = self.conn.clone().lock_owned().await;
        let conn = guard.as_ref().ok_or_else(|| sink_closed("begin"))?;
        conn.execute_batch("BEGIN").map_err(from_rusqlite)?;
        Ok(Box::new(SqliteBatch {
            guard,
            template: template.to_string(),
            finished: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        match guard.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, err)| shutdown_error("sqlite_close", err)),
            None => Ok(()),
        }
    }
}

/// An open SQLite transaction; rolled back on drop unless committed
struct SqliteBatch {
    guard: OwnedMutexGuard<Option<Connection>>,
    template: String,
    finished: bool,
}

impl SqliteBatch {
    fn conn(&self) -> Result<&Connection> {
        self.guard.as_ref().ok_or_else(|| sink_closed("batch"))
    }

    fn finish(mut self: Box<Self>, statement: &str) -> Result<()> {
        self.conn()?
            .execute_batch(statement)
            .map_err(from_rusqlite)?;
        self.finished = true;
        Ok(())
    }
}

#[async_trait]
impl SinkBatch for SqliteBatch {
    async fn execute(&mut self, params: &[SinkValue]) -> Result<()> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&self.template).map_err(from_rusqlite)?;
        stmt.execute(rusqlite::params_from_iter(params.iter().map(to_sql_value)))
            .map_err(from_rusqlite)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteBatch {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(conn) = self.guard.as_ref() {
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "rollback of abandoned sqlite batch failed");
            }
        }
    }
}
