#![allow(clippy::unwrap_used, clippy::expect_used)]

use pgstats_core::errors::{ExError, ExErrorKind, StatsError};
use pgstats_core::logging_facility::test_capture::init_test_capture;
use pgstats_core::{log_op_end, log_op_error, log_op_start};
use pgstats_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name);

    assert!(
        !capture.find(op_name, EVENT_START).is_empty(),
        "Should have captured at least one start event"
    );
}

#[test]
fn test_log_op_end_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let end_events = capture.find(op_name, EVENT_END);
    assert_eq!(end_events.len(), 1, "Should have exactly one end event");
    assert_eq!(
        end_events[0].fields.get("duration_ms"),
        Some(&"42".to_string())
    );
}

#[test]
fn test_log_op_error_includes_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = StatsError::SnapshotStale {
        gap_secs: 95,
        ttl_secs: 60,
    };
    log_op_error!(op_name, err, duration_ms = 10);

    let error_events = capture.find(op_name, EVENT_END_ERROR);
    assert_eq!(error_events.len(), 1, "Should have exactly one error event");
    assert_eq!(
        error_events[0].fields.get("err.code"),
        Some(&"ERR_STALE".to_string())
    );
}

#[test]
fn test_log_op_error_accepts_ex_error() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_ex_unique_4";

    let err = ExError::new(ExErrorKind::Write).with_message("connection reset by peer");
    log_op_error!(op_name, err, duration_ms = 1);

    // err is still usable after logging
    assert_eq!(err.kind(), ExErrorKind::Write);

    let event = capture
        .find(op_name, EVENT_END_ERROR)
        .pop()
        .expect("Should have error event");
    assert_eq!(event.fields.get("err.code"), Some(&"ERR_WRITE".to_string()));
    assert_eq!(
        event.fields.get("err.message"),
        Some(&"connection reset by peer".to_string())
    );
}

#[test]
fn test_boundary_ownership_single_start_end() {
    let capture = init_test_capture();
    let op_name = "test_boundary_ownership_unique_5";

    log_op_start!(op_name, collector = "PgStatStatements");
    log_op_end!(op_name, duration_ms = 42);

    assert_eq!(capture.find(op_name, EVENT_START).len(), 1);
    assert_eq!(capture.find(op_name, EVENT_END).len(), 1);
}

#[test]
fn test_collector_field_is_captured() {
    let capture = init_test_capture();
    let op_name = "test_collector_field_unique_6";

    log_op_start!(op_name, collector = "PgStatioTable", rows = 12);

    let event = capture
        .find(op_name, EVENT_START)
        .pop()
        .expect("Should have start event");
    assert_eq!(event.collector.as_deref(), Some("PgStatioTable"));
    assert_eq!(event.fields.get("rows"), Some(&"12".to_string()));
}

#[test]
fn test_test_capture_assert_event_exists() {
    let capture = init_test_capture();
    let op_name = "test_capture_assert_unique_7";

    log_op_start!(op_name);

    // This should not panic
    capture.assert_event_exists(op_name, EVENT_START);
}

#[test]
#[should_panic(expected = "Expected event")]
fn test_test_capture_assert_event_exists_fails() {
    let capture = init_test_capture();

    capture.assert_event_exists("nonexistent_op_truly_unique_999", EVENT_START);
}

#[test]
fn test_test_capture_count_events() {
    let capture = init_test_capture();
    let op1_name = "test_count_events_op1_unique_8";
    let op2_name = "test_count_events_op2_unique_8";

    log_op_start!(op1_name);
    log_op_start!(op2_name);
    log_op_end!(op1_name, duration_ms = 10);

    let start_count = capture.count_events(|e| {
        e.event.as_deref() == Some(EVENT_START)
            && (e.op.as_deref() == Some(op1_name) || e.op.as_deref() == Some(op2_name))
    });
    let end_count = capture.count_events(|e| {
        e.event.as_deref() == Some(EVENT_END)
            && (e.op.as_deref() == Some(op1_name) || e.op.as_deref() == Some(op2_name))
    });

    assert_eq!(start_count, 2);
    assert_eq!(end_count, 1);
}

#[test]
fn test_collection_error_logged_with_collection_code() {
    let capture = init_test_capture();
    let op_name = "test_collection_error_unique_9";

    let err = StatsError::UnexpectedNull { index: 4 };
    log_op_error!(op_name, err.clone(), duration_ms = 5);

    let ex_err: ExError = err.into();
    assert_eq!(ex_err.kind(), ExErrorKind::Collection);

    let event = capture
        .find(op_name, EVENT_END_ERROR)
        .pop()
        .expect("Should have error event for this test");
    assert_eq!(
        event.fields.get("err.code"),
        Some(&"ERR_COLLECTION".to_string())
    );
}
