//! Snapshot merge ("diff") engine.
//!
//! ## Entry point
//!
//! ```ignore
//! use pgstats_core::diff::DiffEngine;
//!
//! let mut engine = DiffEngine::new(baseline, ttl_secs);
//! let deltas = engine.merge(next)?;
//! ```
//!
//! ## Guarantees
//!
//! - **Staleness**: a gap above the ttl yields an error and no rows, and
//!   the new snapshot still becomes the baseline.
//! - **No activity**: matched counter rows whose monotonic fields did not move
//!   are not emitted.
//! - **Resets**: a counter that went backwards is emitted raw, never as a
//!   negative delta.
//! - **Disappearance**: identities missing from the new snapshot are dropped
//!   without output or error.

pub mod engine;
pub mod model;

pub use engine::DiffEngine;
pub use model::{DeltaSet, MergeSummary};
