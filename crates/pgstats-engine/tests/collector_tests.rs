//! Collector and runner tests against scripted sources and an in-memory
//! SQLite sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pgstats_core::errors::{ExError, ExErrorKind, Result};
use pgstats_core::logging_facility::init_test_capture;
use pgstats_core::metric::{PgStatStatementsFactory, PgTableSizeFactory};
use pgstats_core::sink::{Sink, SinkBatch};
use pgstats_core::source::{Cell, Source, SourceRecord};
use pgstats_core_types::schema::{EVENT_END, EVENT_END_ERROR};
use pgstats_engine::{release_sink, run, StatsCollector};
use pgstats_store::SqliteSink;
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serves queued responses in order, then repeats the last one
#[derive(Clone, Default)]
struct ScriptedSource {
    responses: Arc<Mutex<VecDeque<Result<Vec<SourceRecord>>>>>,
    fetches: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn new(responses: Vec<Result<Vec<SourceRecord>>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            ..Default::default()
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for ScriptedSource {
    async fn fetch(&mut self, _query: &str) -> Result<Vec<SourceRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            return responses.pop_front().unwrap();
        }
        responses.front().cloned().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn statement_row(queryid: i64, calls: f64, total_time: f64) -> SourceRecord {
    let mut cells = vec![
        Cell::Int(queryid),
        Cell::from("postgres"),
        Cell::from("app"),
        Cell::from("select * from accounts"),
        Cell::Float(calls),
        Cell::Float(total_time),
    ];
    cells.extend((0..13).map(|_| Cell::Float(0.0)));
    SourceRecord::new(cells)
}

fn table_size_row(table: &str, size: f64) -> SourceRecord {
    SourceRecord::new(vec![
        Cell::from("postgres"),
        Cell::from("public"),
        Cell::from(table),
        Cell::Int(100),
        Cell::Int(0),
        Cell::Float(size),
        Cell::Float(0.0),
    ])
}

fn source_down() -> ExError {
    ExError::new(ExErrorKind::Collection)
        .with_op("fetch")
        .with_message("server closed the connection unexpectedly")
}

const STATEMENTS: &str = "pg_stat_statements_buffer";
const TTL: i64 = 60;

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_collects_baseline_without_pushing() {
    let source = ScriptedSource::new(vec![Ok(vec![statement_row(1, 5.0, 1.0)])]);
    let sink = SqliteSink::open_in_memory().unwrap();

    let collector = StatsCollector::start(
        PgStatStatementsFactory,
        Box::new(source.clone()),
        Arc::new(sink.clone()),
        "db-01",
        TTL,
    )
    .await
    .unwrap();

    assert_eq!(collector.held().len(), 1);
    assert_eq!(source.fetches(), 1);
    assert_eq!(sink.row_count(STATEMENTS).await.unwrap(), 0);
}

#[tokio::test]
async fn test_start_failure_is_fatal() {
    let source = ScriptedSource::new(vec![Err(source_down())]);
    let sink = SqliteSink::open_in_memory().unwrap();

    let err = StatsCollector::start(
        PgStatStatementsFactory,
        Box::new(source),
        Arc::new(sink),
        "db-01",
        TTL,
    )
    .await
    .err()
    .unwrap();

    assert_eq!(err.kind(), ExErrorKind::Connection);
    assert!(err.kind().is_fatal());
    assert_eq!(err.collector(), Some("PgStatStatements"));
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tick_pushes_deltas_and_skips_idle_rows() {
    let source = ScriptedSource::new(vec![
        Ok(vec![statement_row(1, 1.0, 2.0), statement_row(2, 7.0, 7.0)]),
        Ok(vec![
            statement_row(1, 3.0, 5.0),
            statement_row(2, 7.0, 7.0),
            statement_row(3, 4.0, 1.0),
        ]),
    ]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let mut collector = StatsCollector::start(
        PgStatStatementsFactory,
        Box::new(source),
        Arc::new(sink.clone()),
        "db-01",
        TTL,
    )
    .await
    .unwrap();

    let report = collector.tick().await.unwrap();

    assert_eq!(report.collected, 3);
    assert_eq!(report.emitted, 2);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.passthrough, 1);

    let mut calls = sink.column_float(STATEMENTS, "calls").await.unwrap();
    calls.sort_by(f64::total_cmp);
    assert_eq!(calls, vec![2.0, 4.0]);
    assert_eq!(
        sink.column_text(STATEMENTS, "hostname").await.unwrap(),
        vec!["db-01".to_string(), "db-01".to_string()]
    );
}

#[tokio::test]
async fn test_tick_after_counter_reset_pushes_raw_values() {
    let source = ScriptedSource::new(vec![
        Ok(vec![statement_row(1, 30.0, 90.0)]),
        Ok(vec![statement_row(1, 2.0, 4.0)]),
    ]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let mut collector = StatsCollector::start(
        PgStatStatementsFactory,
        Box::new(source),
        Arc::new(sink.clone()),
        "db-01",
        TTL,
    )
    .await
    .unwrap();

    collector.tick().await.unwrap();

    assert_eq!(sink.column_float(STATEMENTS, "calls").await.unwrap(), vec![2.0]);
    assert_eq!(
        sink.column_float(STATEMENTS, "total_time").await.unwrap(),
        vec![4.0]
    );
}

#[tokio::test]
async fn test_collect_failure_keeps_baseline() {
    let source = ScriptedSource::new(vec![
        Ok(vec![statement_row(1, 1.0, 1.0)]),
        Err(source_down()),
        Ok(vec![statement_row(1, 6.0, 1.0)]),
    ]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let mut collector = StatsCollector::start(
        PgStatStatementsFactory,
        Box::new(source),
        Arc::new(sink.clone()),
        "db-01",
        TTL,
    )
    .await
    .unwrap();
    let baseline_version = collector.held().version();

    let err = collector.tick().await.unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Collection);
    assert_eq!(err.op(), Some("collect"));
    assert_eq!(err.collector(), Some("PgStatStatements"));
    assert!(err.tick_id().is_some());
    assert_eq!(collector.held().version(), baseline_version);
    assert_eq!(sink.row_count(STATEMENTS).await.unwrap(), 0);

    // the next tick still diffs against the start baseline
    collector.tick().await.unwrap();
    assert_eq!(sink.column_float(STATEMENTS, "calls").await.unwrap(), vec![5.0]);
}

#[tokio::test]
async fn test_stale_tick_rebaselines_without_pushing() {
    let source = ScriptedSource::new(vec![
        Ok(vec![statement_row(1, 1.0, 1.0)]),
        Ok(vec![statement_row(1, 9.0, 1.0)]),
    ]);
    let sink = SqliteSink::open_in_memory().unwrap();
    // a negative budget makes every gap stale
    let mut collector = StatsCollector::start(
        PgStatStatementsFactory,
        Box::new(source),
        Arc::new(sink.clone()),
        "db-01",
        -1,
    )
    .await
    .unwrap();

    let err = collector.tick().await.unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Stale);
    assert_eq!(err.op(), Some("merge"));
    assert!(!err.kind().is_fatal());
    assert_eq!(collector.held().rows()[0].calls, 9.0);
    assert_eq!(sink.row_count(STATEMENTS).await.unwrap(), 0);
}

#[tokio::test]
async fn test_push_failure_loses_tick_but_advances_baseline() {
    let source = ScriptedSource::new(vec![
        Ok(vec![table_size_row("accounts", 8192.0)]),
        Ok(vec![table_size_row("accounts", 16384.0)]),
    ]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let mut collector = StatsCollector::start(
        PgTableSizeFactory,
        Box::new(source),
        Arc::new(sink.clone()),
        "db-01",
        TTL,
    )
    .await
    .unwrap();
    sink.close().await.unwrap();

    let err = collector.tick().await.unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Write);
    assert_eq!(err.op(), Some("push"));
    assert_eq!(collector.held().rows()[0].size, 16384.0);
}

#[tokio::test]
async fn test_tick_logs_start_and_end_with_collector() {
    let capture = init_test_capture();
    let source = ScriptedSource::new(vec![Ok(vec![table_size_row("logged_table", 1.0)])]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let mut collector = StatsCollector::start(
        PgTableSizeFactory,
        Box::new(source),
        Arc::new(sink),
        "db-01",
        TTL,
    )
    .await
    .unwrap();

    let report = collector.tick().await.unwrap();

    let ended = capture.find("tick", EVENT_END);
    let event = ended
        .iter()
        .find(|e| e.fields.get("tick_id") == Some(&report.tick_id.to_string()))
        .expect("tick end event for this tick");
    assert_eq!(event.collector.as_deref(), Some("PgTableSize"));
    assert_eq!(event.fields.get("deltas"), Some(&"1".to_string()));
}

#[tokio::test]
async fn test_failed_tick_logs_error_event() {
    let capture = init_test_capture();
    let source = ScriptedSource::new(vec![Ok(Vec::new()), Err(source_down())]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let mut collector = StatsCollector::start(
        PgTableSizeFactory,
        Box::new(source),
        Arc::new(sink),
        "db-01",
        TTL,
    )
    .await
    .unwrap();

    let err = collector.tick().await.unwrap_err();
    let tick_id = err.tick_id().map(|id| id.to_string());

    let logged = capture
        .find("tick", EVENT_END_ERROR)
        .into_iter()
        .any(|e| e.fields.get("tick_id") == tick_id.as_ref());
    assert!(logged);
}

// ---------------------------------------------------------------------------
// Shutdown and runner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_shutdown_releases_source_and_leaves_sink_open() {
    let source = ScriptedSource::new(vec![Ok(Vec::new())]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let collector = StatsCollector::start(
        PgTableSizeFactory,
        Box::new(source.clone()),
        Arc::new(sink.clone()),
        "db-01",
        TTL,
    )
    .await
    .unwrap();

    collector.shutdown().await.unwrap();

    assert!(source.closed.load(Ordering::SeqCst));
    sink.ping().await.unwrap();
}

#[tokio::test]
async fn test_sibling_tick_pushes_after_first_collector_shuts_down() {
    let sink: Arc<SqliteSink> = Arc::new(SqliteSink::open_in_memory().unwrap());
    let first = StatsCollector::start(
        PgTableSizeFactory,
        Box::new(ScriptedSource::new(vec![Ok(Vec::new())])),
        sink.clone(),
        "db-01",
        TTL,
    )
    .await
    .unwrap();
    let mut second = StatsCollector::start(
        PgStatStatementsFactory,
        Box::new(ScriptedSource::new(vec![
            Ok(vec![statement_row(1, 1.0, 1.0)]),
            Ok(vec![statement_row(1, 3.0, 1.0)]),
        ])),
        sink.clone(),
        "db-01",
        TTL,
    )
    .await
    .unwrap();

    first.shutdown().await.unwrap();
    let report = second.tick().await.unwrap();

    assert_eq!(report.emitted, 1);
    assert_eq!(sink.column_float(STATEMENTS, "calls").await.unwrap(), vec![2.0]);

    second.shutdown().await.unwrap();
    release_sink(sink.as_ref()).await.unwrap();
    assert!(sink.ping().await.is_err());
}

#[tokio::test]
async fn test_release_sink_is_idempotent() {
    let sink = SqliteSink::open_in_memory().unwrap();

    release_sink(&sink).await.unwrap();
    release_sink(&sink).await.unwrap();

    assert!(sink.begin("SELECT 1").await.is_err());
}

/// A sink whose connection cannot be released
struct StuckSink;

#[async_trait]
impl Sink for StuckSink {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn begin(&self, _template: &str) -> Result<Box<dyn SinkBatch>> {
        Err(ExError::new(ExErrorKind::Write).with_message("not used"))
    }

    async fn close(&self) -> Result<()> {
        Err(ExError::new(ExErrorKind::Write)
            .with_op("close")
            .with_message("connection reset by peer"))
    }
}

#[tokio::test]
async fn test_release_sink_failure_is_fatal_shutdown_error() {
    let err = release_sink(&StuckSink).await.unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Shutdown);
    assert!(err.kind().is_fatal());
    assert_eq!(err.op(), Some("release_sink"));
    assert_eq!(err.source_error().map(|e| e.kind()), Some(ExErrorKind::Write));
}

#[tokio::test(start_paused = true)]
async fn test_runner_ticks_on_interval_until_shutdown() {
    let source = ScriptedSource::new(vec![Ok(vec![statement_row(1, 1.0, 1.0)])]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let collector = StatsCollector::start(
        PgStatStatementsFactory,
        Box::new(source.clone()),
        Arc::new(sink.clone()),
        "db-01",
        TTL,
    )
    .await
    .unwrap();
    let (stop, stopped) = watch::channel(false);

    let handle = tokio::spawn(run(collector, Duration::from_secs(30), stopped));

    // nothing fires before the first full interval
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(source.fetches(), 1);

    tokio::time::sleep(Duration::from_secs(62)).await;
    assert_eq!(source.fetches(), 4);
    // idle counters were skipped every tick
    assert_eq!(sink.row_count(STATEMENTS).await.unwrap(), 0);

    stop.send(true).unwrap();
    handle.await.unwrap().unwrap();
    assert!(source.closed.load(Ordering::SeqCst));
    // the shared sink is left to its owner
    sink.ping().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_runner_stops_when_sender_dropped() {
    let source = ScriptedSource::new(vec![Ok(Vec::new())]);
    let sink = SqliteSink::open_in_memory().unwrap();
    let collector = StatsCollector::start(
        PgTableSizeFactory,
        Box::new(source.clone()),
        Arc::new(sink),
        "db-01",
        TTL,
    )
    .await
    .unwrap();
    let (stop, stopped) = watch::channel(false);

    let handle = tokio::spawn(run(collector, Duration::from_secs(30), stopped));
    drop(stop);

    handle.await.unwrap().unwrap();
    assert_eq!(source.fetches(), 1);
    assert!(source.closed.load(Ordering::SeqCst));
}
