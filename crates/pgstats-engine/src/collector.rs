//! One collector: a statistics family bound to a source, a sink and a
//! held snapshot.
//!
//! ## Tick pipeline (in order):
//! 1. Collect: run the family query and build a snapshot (no state change on failure)
//! 2. Merge: diff against the held snapshot, which is replaced even when stale
//! 3. Push: write the delta rows in one all-or-nothing batch
//!
//! Shutting a collector down releases only its source. The sink is shared
//! and is closed by its owner after every collector has stopped.

use std::sync::Arc;
use std::time::Instant;

use pgstats_core::diff::{DiffEngine, MergeSummary};
use pgstats_core::errors::{ExError, ExErrorKind, Result};
use pgstats_core::factory::CollectorFactory;
use pgstats_core::sink::{push, Sink};
use pgstats_core::snapshot::{collect, Snapshot};
use pgstats_core::source::Source;
use pgstats_core::{log_op_end, log_op_error, log_op_start};
use pgstats_core_types::TickId;
use tracing::{info_span, Instrument};

/// Outcome of one successful tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick_id: TickId,
    /// Rows read from the source
    pub collected: usize,
    /// Rows written to the sink
    pub emitted: usize,
    pub summary: MergeSummary,
}

pub struct StatsCollector<F: CollectorFactory> {
    factory: F,
    source: Box<dyn Source>,
    sink: Arc<dyn Sink>,
    hostname: String,
    engine: DiffEngine<F::Metric>,
}

impl<F: CollectorFactory> StatsCollector<F> {
    /// Collect the first snapshot, which becomes the baseline; nothing is
    /// pushed for it.
    ///
    /// # Errors
    ///
    /// - `Connection`: the initial collection failed, the collector does not start
    pub async fn start(
        factory: F,
        mut source: Box<dyn Source>,
        sink: Arc<dyn Sink>,
        hostname: impl Into<String>,
        ttl_secs: i64,
    ) -> Result<Self> {
        let name = factory.name();
        let started = Instant::now();
        log_op_start!("start", collector = name);

        let baseline = match collect(&factory, source.as_mut()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let err = ExError::new(ExErrorKind::Connection)
                    .with_op("start")
                    .with_collector(name)
                    .with_message(format!("initial collection failed: {}", err.message()))
                    .with_source(err);
                log_op_error!(
                    "start",
                    err,
                    duration_ms = started.elapsed().as_millis() as u64,
                    collector = name
                );
                return Err(err);
            }
        };

        log_op_end!(
            "start",
            duration_ms = started.elapsed().as_millis() as u64,
            collector = name,
            rows = baseline.len()
        );
        Ok(Self {
            factory,
            source,
            sink,
            hostname: hostname.into(),
            engine: DiffEngine::new(baseline, ttl_secs),
        })
    }

    pub fn name(&self) -> &'static str {
        self.factory.name()
    }

    pub fn held(&self) -> &Snapshot<F::Metric> {
        self.engine.held()
    }

    /// Run collect, merge and push once.
    ///
    /// Errors carry the failing stage as `op`, the collector name and the
    /// tick id. None of them is fatal; the next tick starts from whatever
    /// baseline the merge left behind.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let tick_id = TickId::new();
        let span = info_span!("tick", collector = self.name(), tick_id = %tick_id);
        self.run_tick(tick_id).instrument(span).await
    }

    async fn run_tick(&mut self, tick_id: TickId) -> Result<TickReport> {
        let name = self.name();
        let started = Instant::now();
        log_op_start!("tick", collector = name, tick_id = tick_id.as_str());

        let result = self.stages(tick_id.clone()).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(report) => {
                log_op_end!(
                    "tick",
                    duration_ms = duration_ms,
                    collector = name,
                    tick_id = tick_id.as_str(),
                    rows = report.collected,
                    deltas = report.emitted
                );
            }
            Err(err) => {
                log_op_error!(
                    "tick",
                    *err,
                    duration_ms = duration_ms,
                    collector = name,
                    tick_id = tick_id.as_str()
                );
            }
        }
        result
    }

    async fn stages(&mut self, tick_id: TickId) -> Result<TickReport> {
        let name = self.factory.name();
        let context = |err: ExError, stage: &str| {
            err.in_stage(stage)
                .with_collector(name)
                .with_tick_id(tick_id.clone())
        };

        let next = collect(&self.factory, self.source.as_mut())
            .await
            .map_err(|err| context(err, "collect"))?;
        let collected = next.len();

        let deltas = self
            .engine
            .merge(next)
            .map_err(|err| context(err, "merge"))?;

        let emitted = push(
            self.sink.as_ref(),
            self.factory.push_query(),
            &self.hostname,
            &deltas.rows,
        )
        .await
        .map_err(|err| context(err, "push"))?;

        Ok(TickReport {
            tick_id: tick_id.clone(),
            collected,
            emitted,
            summary: deltas.summary,
        })
    }

    /// Release this collector's source.
    ///
    /// The sink is shared with the other collectors of the process and is
    /// left open; close it with [`release_sink`] once every collector has
    /// stopped.
    ///
    /// # Errors
    ///
    /// - `Shutdown`: the source could not be released (fatal)
    pub async fn shutdown(mut self) -> Result<()> {
        let name = self.name();
        self.source.close().await.map_err(|err| {
            ExError::new(ExErrorKind::Shutdown)
                .with_op("shutdown")
                .with_collector(name)
                .with_message(format!("source release failed: {}", err.message()))
                .with_source(err)
        })
    }
}

/// Close the sink shared by every collector.
///
/// # Errors
///
/// - `Shutdown`: the sink could not be released (fatal)
pub async fn release_sink<S: Sink + ?Sized>(sink: &S) -> Result<()> {
    sink.close().await.map_err(|err| {
        ExError::new(ExErrorKind::Shutdown)
            .with_op("release_sink")
            .with_message(format!("sink release failed: {}", err.message()))
            .with_source(err)
    })
}
