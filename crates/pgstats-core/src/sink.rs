//! Sink collaborator contract and the all-or-nothing writer.

use async_trait::async_trait;
use tracing::warn;

use crate::errors::{ExError, ExErrorKind, Result};
use crate::metric::{PgMetric, SinkValue};

/// One transactional batch against the sink.
///
/// Nothing executed through a batch is visible until [`SinkBatch::commit`]
/// succeeds. Dropping a batch without committing discards it.
#[async_trait]
pub trait SinkBatch: Send {
    /// Execute the batch template once with positional parameters
    async fn execute(&mut self, params: &[SinkValue]) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// The analytical store deltas are written to.
///
/// Shared by every collector of the process, so all methods take `&self`.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Check the sink is reachable
    async fn ping(&self) -> Result<()>;

    /// Open a batch for the positional insert `template`
    async fn begin(&self, template: &str) -> Result<Box<dyn SinkBatch>>;

    /// Release the connection; later calls succeed without doing anything
    async fn close(&self) -> Result<()>;
}

/// Write every row in one batch, or none of them.
///
/// An empty `rows` still opens and commits an empty batch. On the first
/// failing row the batch is rolled back; a failed rollback is logged and
/// the row error is returned.
pub async fn push<S, M>(sink: &S, template: &str, hostname: &str, rows: &[M]) -> Result<usize>
where
    S: Sink + ?Sized,
    M: PgMetric,
{
    let mut batch = sink.begin(template).await?;
    for (position, row) in rows.iter().enumerate() {
        if let Err(err) = batch.execute(&row.value(hostname)).await {
            if let Err(rollback_err) = batch.rollback().await {
                warn!(
                    err.code = rollback_err.code(),
                    err.message = rollback_err.message(),
                    "rollback after failed row did not complete"
                );
            }
            return Err(ExError::new(ExErrorKind::Write)
                .with_op("push")
                .with_message(format!(
                    "row {} of {} failed: {}",
                    position,
                    rows.len(),
                    err.message()
                ))
                .with_source(err));
        }
    }
    batch.commit().await?;
    Ok(rows.len())
}
