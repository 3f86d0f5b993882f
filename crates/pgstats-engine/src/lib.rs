//! pgstats engine - collector orchestration
//!
//! Coordinates the core snapshot-diff kernel with a source and a sink:
//! one `StatsCollector` per statistics family and source connection, each
//! driven by its own interval loop.

pub mod collector;
pub mod runner;

pub use collector::{release_sink, StatsCollector, TickReport};
pub use runner::{run, ttl_for};
