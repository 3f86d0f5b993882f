use pgstats_core_types::TickId;
use thiserror::Error;

/// Result type alias using the canonical structured error
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// This taxonomy provides a stable, structured classification of all errors
/// raised while collecting, diffing and pushing statistics. Each kind maps to
/// a stable error code usable for programmatic handling and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    /// Invalid flags, environment or sink DSN
    Configuration,

    // Collaborators
    /// Source or sink connection could not be established at startup
    Connection,
    /// Source query or row materialization failed
    Collection,
    /// Snapshot gap exceeded the staleness budget (non-fatal, re-baselined)
    Stale,
    /// Sink batch failed and was rolled back
    Write,
    /// Source or sink could not be released during shutdown
    Shutdown,

    /// Sink request did not complete in time
    Timeout,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::Connection => "ERR_CONNECTION",
            ExErrorKind::Collection => "ERR_COLLECTION",
            ExErrorKind::Stale => "ERR_STALE",
            ExErrorKind::Write => "ERR_WRITE",
            ExErrorKind::Shutdown => "ERR_SHUTDOWN",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
        }
    }

    /// Whether the owning process must stop when this kind surfaces.
    ///
    /// Everything raised inside a tick is reported and the collector carries
    /// on; startup connection failures and shutdown release failures are not
    /// recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExErrorKind::Connection | ExErrorKind::Shutdown)
    }
}

/// Canonical structured error type
///
/// Carries classification fields for programmatic handling and rich context
/// (operation, collector, tick) for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    collector: Option<String>,
    tick_id: Option<TickId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            collector: None,
            tick_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add collector name context
    pub fn with_collector(mut self, name: impl Into<String>) -> Self {
        self.collector = Some(name.into());
        self
    }

    /// Add tick ID context
    pub fn with_tick_id(mut self, tick_id: TickId) -> Self {
        self.tick_id = Some(tick_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the collector context, if any
    pub fn collector(&self) -> Option<&str> {
        self.collector.as_deref()
    }

    /// Get the tick ID context, if any
    pub fn tick_id(&self) -> Option<&TickId> {
        self.tick_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Wrap this error as the source of a new error for the given stage.
    ///
    /// The outer error keeps the inner kind so callers can still branch on
    /// `Stale` versus `Write` after the tick has added its context.
    pub fn in_stage(self, stage: &str) -> Self {
        let kind = self.kind;
        let message = format!("{} failed with: {}", stage, self.message);
        ExError::new(kind)
            .with_op(stage)
            .with_message(message)
            .with_source(self)
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(collector) = &self.collector {
            write!(f, " [{}]", collector)?;
        }
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(tick_id) = &self.tick_id {
            write!(f, " (tick_id: {})", tick_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Typed failures raised by the statistics pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    /// The new snapshot is too far from the held one to trust a delta
    #[error("metrics snapshot ttl is expired: gap {gap_secs}s exceeds ttl {ttl_secs}s")]
    SnapshotStale { gap_secs: i64, ttl_secs: i64 },

    /// A source row has fewer columns than the family reads
    #[error("column {index} is missing (row has {len} columns)")]
    MissingColumn { index: usize, len: usize },

    /// A source column holds a value of the wrong type
    #[error("column {index}: expected {expected}, found {found}")]
    ColumnType {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// A non-nullable source column was NULL
    #[error("column {index} is NULL but the family does not allow NULL there")]
    UnexpectedNull { index: usize },

    /// Parameter count differs from the insert template's placeholders
    #[error("insert template expects {expected} parameters, got {actual}")]
    PlaceholderMismatch { expected: usize, actual: usize },

    /// The insert template has no `VALUES (...)` tuple to batch
    #[error("insert template has no VALUES tuple: {template}")]
    InvalidTemplate { template: String },

    /// Sink DSN scheme is not supported
    #[error("unsupported sink dsn scheme: {scheme}")]
    UnsupportedDsn { scheme: String },
}

/// Conversion from StatsError to ExError
impl From<StatsError> for ExError {
    fn from(err: StatsError) -> Self {
        match &err {
            StatsError::SnapshotStale { .. } => ExError::new(ExErrorKind::Stale)
                .with_op("merge")
                .with_message(err.to_string()),

            StatsError::MissingColumn { .. }
            | StatsError::ColumnType { .. }
            | StatsError::UnexpectedNull { .. } => ExError::new(ExErrorKind::Collection)
                .with_op("new_metric")
                .with_message(err.to_string()),

            StatsError::PlaceholderMismatch { .. } | StatsError::InvalidTemplate { .. } => {
                ExError::new(ExErrorKind::Write)
                    .with_op("push")
                    .with_message(err.to_string())
            }

            StatsError::UnsupportedDsn { .. } => ExError::new(ExErrorKind::Configuration)
                .with_op("open_sink")
                .with_message(err.to_string()),
        }
    }
}
