//! Logging Facility Tests
//!
//! ## Scenarios Covered
//!
//! 1. Registration, mutation and query emit start/end pairs
//! 2. Failures emit end_error carrying the stable error code and the request id
//!
//! The capture is process-wide, so each test works on its own treespace
//! name and filters on it.

mod common;

use std::sync::Arc;

use common::{core_schema, readonly_flag, writable_flag};
use treespace_core::logging_facility::init_test_capture;
use treespace_core::{
    DataNode, DataTree, HookRegistry, NoVariables, ReadOnlySubtreeHook, RequestContext, TreespaceRegistry,
};

#[test]
fn test_successful_operations_emit_start_and_end() {
    let capture = init_test_capture();

    // GIVEN a freshly registered treespace
    let registry = TreespaceRegistry::new();
    let ts = registry
        .register("log-success", core_schema(), DataTree::new(), HookRegistry::new())
        .unwrap();

    // WHEN mutating and querying it
    ts.set(&writable_flag(), DataNode::scalar(true), &RequestContext::new())
        .unwrap();
    let _ = ts.query("/system/writable/flag", &NoVariables).unwrap();

    // THEN each operation logged a start then an end with a duration
    for op in ["register_treespace", "mutate", "query"] {
        assert_eq!(capture.boundaries(op, "log-success"), vec!["start", "end"], "{}", op);
        let end = &capture.operation(op, "log-success")[1];
        assert!(end.field("duration_ms").is_some());
        assert!(end.component.as_deref().is_some_and(|c| c.starts_with("treespace_core")));
    }

    // AND the mutation end records the committed version
    let mutate_end = &capture.operation("mutate", "log-success")[1];
    assert_eq!(mutate_end.field("version"), Some("1"));
    assert_eq!(mutate_end.field("operation"), Some("create"));
}

#[test]
fn test_failures_emit_end_error_with_code() {
    let capture = init_test_capture();

    // GIVEN a treespace whose readonly subtree is protected
    let registry = TreespaceRegistry::new();
    let hooks = HookRegistry::new();
    hooks.register_hook("readonly", Arc::new(ReadOnlySubtreeHook::new(readonly_flag())));
    let ts = registry
        .register("log-failure", core_schema(), DataTree::new(), hooks)
        .unwrap();

    // WHEN a mutation is rejected and a query fails to parse
    let request = RequestContext::on_behalf_of("operator");
    assert!(ts.set(&readonly_flag(), DataNode::scalar(true), &request).is_err());
    assert!(ts.query_as("/system/#", &NoVariables, &request).is_err());

    // AND the same name is registered twice
    assert!(registry
        .register("log-failure", core_schema(), DataTree::new(), HookRegistry::new())
        .is_err());

    // THEN each failure closed with end_error and its stable code
    assert_eq!(capture.boundaries("mutate", "log-failure"), vec!["start", "end_error"]);
    assert_eq!(capture.operation("mutate", "log-failure")[1].field("err_code"), Some("ERR_FORBIDDEN"));

    assert_eq!(capture.boundaries("query", "log-failure"), vec!["start", "end_error"]);
    assert_eq!(capture.operation("query", "log-failure")[1].field("err_code"), Some("ERR_SYNTAX"));

    // AND both failures name the request that caused them
    for op in ["mutate", "query"] {
        let end = &capture.operation(op, "log-failure")[1];
        assert_eq!(end.field("request_id"), Some(request.request_id.as_str()), "{}", op);
    }

    assert_eq!(
        capture.boundaries("register_treespace", "log-failure"),
        vec!["start", "end", "start", "end_error"]
    );
    assert_eq!(
        capture.operation("register_treespace", "log-failure")[3].field("err_code"),
        Some("ERR_ALREADY_EXISTS")
    );
}
