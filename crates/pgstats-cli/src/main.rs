//! pgstats-to-clickhouse
//!
//! Samples PostgreSQL cumulative statistics on an interval and ships the
//! per-interval deltas to ClickHouse.

use std::sync::Arc;
use std::time::Duration;

use pgstats_core::factory::CollectorFactory;
use pgstats_core::logging_facility;
use pgstats_core::metric::{PgStatStatementsFactory, PgStatioTableFactory, PgTableSizeFactory};
use pgstats_core::sink::Sink;
use pgstats_core_types::Sensitive;
use pgstats_engine::{release_sink, run, ttl_for, StatsCollector};
use pgstats_store::{open_sink, PgSource, SourceLimits};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

mod config;
mod shutdown;

use config::Config;

type Collector = JoinHandle<pgstats_core::Result<()>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    logging_facility::init(config.log_profile);

    let hostname = config.hostname();
    info!(
        hostname = %hostname,
        interval = %humantime::format_duration(config.interval),
        "pgstats-to-clickhouse starting"
    );

    let sink = open_sink(config.clickhouse_dsn.expose())?;
    sink.ping().await?;

    let (stop, stopped) = watch::channel(false);
    let mut collectors: Vec<Collector> = Vec::new();

    collectors.push(
        spawn_collector(
            PgStatStatementsFactory,
            &config.postgres_dsn,
            &sink,
            &hostname,
            config.interval,
            stopped.clone(),
        )
        .await?,
    );

    match config.statio_dsn() {
        Some(dsn) => {
            collectors.push(
                spawn_collector(
                    PgStatioTableFactory,
                    dsn,
                    &sink,
                    &hostname,
                    config.interval,
                    stopped.clone(),
                )
                .await?,
            );
            collectors.push(
                spawn_collector(
                    PgTableSizeFactory,
                    dsn,
                    &sink,
                    &hostname,
                    config.table_size_interval(),
                    stopped,
                )
                .await?,
            );
        }
        None => info!("statio collectors disabled"),
    }

    let signal = shutdown::shutdown_signal().await?;
    info!(signal, "shutting down");
    stop.send(true).ok();

    let mut failures = stop_collectors(collectors).await;

    // every collector has stopped, nothing else pushes to the sink
    if let Err(err) = release_sink(sink.as_ref()).await {
        error!(error = %err, "sink shutdown failed");
        failures.push(Box::new(err));
    }

    match failures.into_iter().next() {
        Some(err) => Err(err),
        None => {
            info!("pgstats-to-clickhouse stopped");
            Ok(())
        }
    }
}

/// Wait for every collector to release its source, logging each failure
async fn stop_collectors(collectors: Vec<Collector>) -> Vec<Box<dyn std::error::Error>> {
    let mut failures: Vec<Box<dyn std::error::Error>> = Vec::new();
    for collector in collectors {
        let outcome: Result<(), Box<dyn std::error::Error>> = match collector.await {
            Ok(released) => released.map_err(Box::from),
            Err(join_err) => Err(Box::from(join_err)),
        };
        if let Err(err) = outcome {
            error!(error = %err, "collector shutdown failed");
            failures.push(err);
        }
    }
    failures
}

/// Connect a dedicated source, take the baseline snapshot and start ticking
async fn spawn_collector<F: CollectorFactory>(
    factory: F,
    dsn: &Sensitive<String>,
    sink: &Arc<dyn Sink>,
    hostname: &str,
    every: Duration,
    shutdown: watch::Receiver<bool>,
) -> pgstats_core::Result<Collector> {
    let source = PgSource::connect(dsn, SourceLimits::default()).await?;
    let collector = StatsCollector::start(
        factory,
        Box::new(source),
        Arc::clone(sink),
        hostname,
        ttl_for(every),
    )
    .await?;
    Ok(tokio::spawn(run(collector, every, shutdown)))
}
