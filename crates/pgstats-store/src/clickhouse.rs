//! ClickHouse sink over the HTTP interface.
//!
//! ClickHouse has no multi-statement transactions over HTTP, so a batch is
//! buffered client-side: every `execute` renders one `VALUES` tuple and
//! `commit` sends all of them as a single `INSERT`. A batch that is rolled
//! back (or dropped) never reaches the server, and one `INSERT` is applied
//! by ClickHouse as a whole.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pgstats_core::errors::{ExError, ExErrorKind, StatsError};
use pgstats_core::metric::SinkValue;
use pgstats_core::sink::{Sink, SinkBatch};
use pgstats_core_types::Sensitive;
use reqwest::Url;
use tracing::debug;

use crate::errors::{connection_error, from_reqwest, sink_closed, Result};

const DEFAULT_DATABASE: &str = "default";
const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

/// A positional insert split into its statement head and `VALUES` tuple
#[derive(Debug, Clone, PartialEq)]
pub struct InsertTemplate {
    head: String,
    tuple: String,
    placeholders: usize,
}

impl InsertTemplate {
    pub fn parse(template: &str) -> std::result::Result<Self, StatsError> {
        let invalid = || StatsError::InvalidTemplate {
            template: template.to_string(),
        };
        let values_at = template
            .to_ascii_uppercase()
            .rfind("VALUES")
            .ok_or_else(invalid)?;
        let head = template[..values_at + "VALUES".len()].trim().to_string();
        let tuple = template[values_at + "VALUES".len()..].trim();
        if !tuple.starts_with('(') || !tuple.ends_with(')') {
            return Err(invalid());
        }
        Ok(Self {
            head,
            tuple: tuple.to_string(),
            placeholders: tuple.matches('?').count(),
        })
    }

    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    /// Substitute `params` into the tuple, in order
    pub fn render_tuple(&self, params: &[SinkValue]) -> std::result::Result<String, StatsError> {
        if params.len() != self.placeholders {
            return Err(StatsError::PlaceholderMismatch {
                expected: self.placeholders,
                actual: params.len(),
            });
        }
        let mut params = params.iter();
        let mut rendered = String::with_capacity(self.tuple.len() * 2);
        for ch in self.tuple.chars() {
            match ch {
                '?' => {
                    if let Some(value) = params.next() {
                        rendered.push_str(&literal(value));
                    }
                }
                _ => rendered.push(ch),
            }
        }
        Ok(rendered)
    }

    /// Full statement for the rendered tuples
    pub fn statement(&self, tuples: &[String]) -> String {
        format!("{} {}", self.head, tuples.join(", "))
    }
}

/// ClickHouse SQL literal for one parameter
pub fn literal(value: &SinkValue) -> String {
    match value {
        SinkValue::Text(text) => {
            let mut quoted = String::with_capacity(text.len() + 2);
            quoted.push('\'');
            for ch in text.chars() {
                if ch == '\\' || ch == '\'' {
                    quoted.push('\\');
                }
                quoted.push(ch);
            }
            quoted.push('\'');
            quoted
        }
        SinkValue::Float(number) if number.is_nan() => "nan".to_string(),
        SinkValue::Float(number) if number.is_infinite() => {
            if number.is_sign_positive() {
                "inf".to_string()
            } else {
                "-inf".to_string()
            }
        }
        SinkValue::Float(number) => number.to_string(),
    }
}

/// Connection settings shared by the sink and its batches
#[derive(Debug)]
struct Endpoint {
    client: reqwest::Client,
    url: Url,
    database: String,
    user: Option<String>,
    password: Option<Sensitive<String>>,
}

impl Endpoint {
    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some(user) = &self.user {
            request = request.header(USER_HEADER, user);
        }
        if let Some(password) = &self.password {
            request = request.header(KEY_HEADER, password.expose().as_str());
        }
        request
    }

    async fn send(&self, statement: String) -> Result<()> {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("database", &self.database);
        let response = self
            .request(reqwest::Method::POST, url)
            .body(statement)
            .send()
            .await
            .map_err(from_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ExError::new(ExErrorKind::Write)
            .with_op("clickhouse_insert")
            .with_message(format!("{}: {}", status, body.trim())))
    }
}

pub struct ClickHouseSink {
    endpoint: Arc<Endpoint>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ClickHouseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseSink")
            .field("url", &self.endpoint.url.as_str())
            .field("database", &self.endpoint.database)
            .finish()
    }
}

impl ClickHouseSink {
    /// Build a sink from `http(s)://[user[:password]@]host:port[/database]`.
    ///
    /// No request is made; use [`Sink::ping`] to check the server.
    pub fn new(dsn: &str) -> Result<Self> {
        let parsed = Url::parse(dsn).map_err(|e| connection_error("clickhouse_dsn", e))?;
        let database = parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
            .unwrap_or(DEFAULT_DATABASE)
            .to_string();
        let user = Some(parsed.username())
            .filter(|user| !user.is_empty())
            .map(str::to_string);
        let password = parsed.password().map(|p| Sensitive::new(p.to_string()));

        let mut url = parsed.clone();
        url.set_path("/");
        url.set_query(None);
        url.set_username("")
            .and_then(|_| url.set_password(None))
            .map_err(|_| connection_error("clickhouse_dsn", "dsn cannot carry credentials"))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("pgstats-to-clickhouse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| connection_error("clickhouse_client", e))?;

        Ok(Self {
            endpoint: Arc::new(Endpoint {
                client,
                url,
                database,
                user,
                password,
            }),
            closed: AtomicBool::new(false),
        })
    }

    pub fn database(&self) -> &str {
        &self.endpoint.database
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(sink_closed(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for ClickHouseSink {
    async fn ping(&self) -> Result<()> {
        self.ensure_open("ping")?;
        let url = self
            .endpoint
            .url
            .join("ping")
            .map_err(|e| connection_error("ping", e))?;
        let response = self
            .endpoint
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| connection_error("ping", e))?;
        if !response.status().is_success() {
            return Err(connection_error("ping", response.status()));
        }
        Ok(())
    }

    async fn begin(&self, template: &str) -> Result<Box<dyn SinkBatch>> {
        self.ensure_open("begin")?;
        let template = InsertTemplate::parse(template)?;
        Ok(Box::new(ClickHouseBatch {
            endpoint: self.endpoint.clone(),
            template,
            tuples: Vec::new(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct ClickHouseBatch {
    endpoint: Arc<Endpoint>,
    template: InsertTemplate,
    tuples: Vec<String>,
}

#[async_trait]
impl SinkBatch for ClickHouseBatch {
    async fn execute(&mut self, params: &[SinkValue]) -> Result<()> {
        let tuple = self.template.render_tuple(params)?;
        self.tuples.push(tuple);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.tuples.is_empty() {
            return Ok(());
        }
        debug!(rows = self.tuples.len(), "sending clickhouse insert");
        let statement = self.template.statement(&self.tuples);
        self.endpoint.send(statement).await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
