//! Migration framework for the SQLite sink
//!
//! Provides:
//! - Migration runner with checksums
//! - Idempotent application
//! - Embedded SQL migrations creating the `pg` buffer tables

mod embedded;
mod runner;

pub use runner::apply_migrations;
