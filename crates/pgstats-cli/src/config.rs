//! Daemon configuration: command-line flags, each also readable from the
//! environment.

use std::time::Duration;

use clap::Parser;
use pgstats_core::logging_facility::Profile;
use pgstats_core_types::Sensitive;
use sysinfo::System;

const DEFAULT_POSTGRES_DSN: &str = "postgres://postgres@localhost:5432/postgres?sslmode=disable";
const DEFAULT_CLICKHOUSE_DSN: &str = "http://localhost:8123/default";
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Table sizes move slowly, so that collector ticks this many times less often
pub const TABLE_SIZE_INTERVAL_FACTOR: u32 = 4;

#[derive(Debug, Clone, Parser)]
#[command(name = "pgstats-to-clickhouse")]
#[command(
    about = "Ship PostgreSQL statistics deltas to ClickHouse",
    long_about = None
)]
pub struct Config {
    /// Collection interval ("30s", "2m")
    #[arg(long, env = "INTERVAL", default_value = "30s", value_parser = parse_interval)]
    pub interval: Duration,

    /// Source for the statements collector
    #[arg(
        long,
        env = "POSTGRES_DSN",
        default_value = DEFAULT_POSTGRES_DSN,
        hide_env_values = true,
        hide_default_value = true,
        value_parser = parse_dsn
    )]
    pub postgres_dsn: Sensitive<String>,

    /// Sink: http(s)://host:port/database, sqlite://path or sqlite::memory:
    #[arg(
        long,
        env = "CLICKHOUSE_DSN",
        default_value = DEFAULT_CLICKHOUSE_DSN,
        hide_env_values = true,
        value_parser = parse_dsn
    )]
    pub clickhouse_dsn: Sensitive<String>,

    /// Source for the statio and table-size collectors; defaults to
    /// --postgres-dsn, an empty value disables both
    #[arg(long, env = "STATIO_POSTGRES_DSN", hide_env_values = true, value_parser = parse_dsn)]
    pub statio_postgres_dsn: Option<Sensitive<String>>,

    /// Host name stamped on every row; defaults to the machine host name
    #[arg(long, env = "PGSTATS_HOSTNAME")]
    pub hostname: Option<String>,

    /// development (human readable) or production (JSON)
    #[arg(long, env = "PGSTATS_LOG_PROFILE", default_value = "development")]
    pub log_profile: Profile,
}

impl Config {
    /// Load `.env` if present, then parse flags and environment.
    ///
    /// Invalid configuration prints the usage text and exits with status 2.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    /// DSN of the statio and table-size collectors, `None` when disabled
    pub fn statio_dsn(&self) -> Option<&Sensitive<String>> {
        match &self.statio_postgres_dsn {
            None => Some(&self.postgres_dsn),
            Some(dsn) if dsn.expose().is_empty() => None,
            Some(dsn) => Some(dsn),
        }
    }

    pub fn table_size_interval(&self) -> Duration {
        self.interval * TABLE_SIZE_INTERVAL_FACTOR
    }

    pub fn hostname(&self) -> String {
        self.hostname
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(System::host_name)
            .unwrap_or_else(|| "localhost".to_string())
    }
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    let interval = humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if interval < MIN_INTERVAL {
        return Err(format!(
            "interval must be at least {}",
            humantime::format_duration(MIN_INTERVAL)
        ));
    }
    Ok(interval)
}

fn parse_dsn(value: &str) -> Result<Sensitive<String>, String> {
    Ok(Sensitive::new(value.trim().to_string()))
}
