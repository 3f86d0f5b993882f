//! Metric variants: one record shape per PostgreSQL statistics family.
//!
//! Every family implements [`PgMetric`]. Snapshots, the diff engine and the
//! collector are generic over a single shape, so two rows of different
//! families can never be compared or differenced: the mismatch is a type
//! error, not a runtime check.
//!
//! ## Classification
//!
//! - [`MetricKind::Counter`]: cumulative values, monotonic until the server
//!   resets its statistics. Deltas are `current - prior`, unless a monotonic
//!   field went backwards, in which case the raw current row is emitted.
//! - [`MetricKind::Gauge`]: point-in-time values, always re-emitted as-is.
//!
//! ## Identity
//!
//! Rows are matched across snapshots by a 32-bit CRC over their key fields.
//! Collisions are possible and accepted: the worst case is one wrong delta for
//! one tick, or a raw passthrough when the reset check trips.

use std::fmt;

pub mod statement;
pub mod statio;
pub mod table_size;

pub use statement::{PgStatStatement, PgStatStatementsFactory};
pub use statio::{PgStatioTable, PgStatioTableFactory};
pub use table_size::{PgTableSize, PgTableSizeFactory};

/// Identity of a row across snapshots (CRC-32 of its key fields)
pub type IdentityHash = u32;

/// Type-level classification of a metric family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// One positional parameter of a sink insert
#[derive(Debug, Clone, PartialEq)]
pub enum SinkValue {
    Text(String),
    Float(f64),
}

impl From<&str> for SinkValue {
    fn from(value: &str) -> Self {
        SinkValue::Text(value.to_string())
    }
}

impl From<f64> for SinkValue {
    fn from(value: f64) -> Self {
        SinkValue::Float(value)
    }
}

/// A row of one statistics family at one point in time
pub trait PgMetric: Clone + fmt::Debug + Send + Sync + 'static {
    /// Counter or gauge semantics for every row of this family
    const KIND: MetricKind;

    /// Stable identity derived from the family's key fields
    fn identity(&self) -> IdentityHash;

    /// True when nothing happened since `prior`, so no row needs emitting
    fn is_skippable(&self, prior: &Self) -> bool;

    /// The value to emit given the previously held row for the same identity
    fn delta(&self, prior: &Self) -> Self;

    /// Positional insert parameters, prefixed with the reporting host
    fn value(&self, hostname: &str) -> Vec<SinkValue>;
}

/// Shared skip/delta policy for counter families.
///
/// Implementors name their monotonic fields and know how to subtract
/// themselves field by field; the reset and no-activity rules live here.
pub trait Counter: Clone {
    /// Fields that only grow between statistics resets
    fn monotonic(&self) -> Vec<f64>;

    /// `self - prior` for every differenceable field, key fields untouched
    fn subtract(&self, prior: &Self) -> Self;

    /// Monotonic fields compared at integer precision
    fn counter_is_skippable(&self, prior: &Self) -> bool {
        self.monotonic()
            .iter()
            .zip(prior.monotonic())
            .all(|(current, before)| current.trunc() as i64 == before.trunc() as i64)
    }

    /// Any monotonic field that went backwards means the server counters were
    /// reset (or two entities share a hash)
    fn counter_was_reset(&self, prior: &Self) -> bool {
        self.monotonic()
            .iter()
            .zip(prior.monotonic())
            .any(|(current, before)| before > *current)
    }

    fn counter_delta(&self, prior: &Self) -> Self {
        if self.counter_was_reset(prior) {
            self.clone()
        } else {
            self.subtract(prior)
        }
    }
}

/// CRC-32 (IEEE) over the key fields, each terminated by `;`.
///
/// The separator keeps `("ab", "c")` and `("a", "bc")` apart.
pub fn identity_hash<'a, I>(keys: I) -> IdentityHash
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = crc32fast::Hasher::new();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(b";");
    }
    hasher.finalize()
}
