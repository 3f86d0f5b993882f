//! Error handling for pgstats-store
//!
//! Wraps pgstats-core ExError with driver-specific helpers

use pgstats_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a collection error from a failed source query or row decode
pub fn from_sqlx(err: sqlx::Error) -> ExError {
    ExError::new(ExErrorKind::Collection)
        .with_op("fetch")
        .with_message(err.to_string())
}

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Connection)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Configuration)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create a write error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Write)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create a write error from a failed ClickHouse request
pub fn from_reqwest(err: reqwest::Error) -> ExError {
    let kind = if err.is_timeout() {
        ExErrorKind::Timeout
    } else {
        ExErrorKind::Write
    };
    ExError::new(kind)
        .with_op("clickhouse")
        .with_message(err.to_string())
}

/// Create a startup connection error
pub fn connection_error(operation: &str, err: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Connection)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Create a resource release error
pub fn shutdown_error(operation: &str, err: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Shutdown)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Create an error for use of a sink after `close`
pub fn sink_closed(operation: &str) -> ExError {
    ExError::new(ExErrorKind::Write)
        .with_op(operation.to_string())
        .with_message("sink is closed")
}
