//! Canonical event names for structured logging
//!
//! The logging macros stamp one of these on the `event` field of every
//! operation log line; tests filter captured events by them.

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
