//! Controller Scenario Tests
//!
//! End-to-end walk through a single "controller" treespace.
//!
//! ## Scenarios Covered
//!
//! 1. Read-only subtree is protected by a hook; writable subtree commits
//! 2. Commit notifies with old = absent and new = the written value
//! 3. Queries see committed data through the registry

mod common;

use std::sync::Arc;

use common::{controller, interface, readonly_flag, writable_flag, RecordingConsumer};
use treespace_core::{
    AuthorizationHook, ClosableIterator, DataNode, DataPath, MutationState, NoVariables, NotificationConsumer,
    Operation, ReadOnlySubtreeHook, RequestContext, TreespaceError,
};

#[test]
fn test_readonly_rejected_writable_committed_and_notified() {
    // GIVEN treespace "controller" composed from core@1.0
    let (registry, _) = controller();
    let controller = registry.get("controller").unwrap();

    // AND a hook rejecting anything under /system/readonly
    let readonly = DataPath::root().child("system").child("readonly");
    controller.hooks().register_hook(
        "readonly-guard",
        Arc::new(ReadOnlySubtreeHook::new(readonly)) as Arc<dyn AuthorizationHook>,
    );
    let consumer = Arc::new(RecordingConsumer::default());
    controller
        .hooks()
        .register_consumer("recorder", Arc::clone(&consumer) as Arc<dyn NotificationConsumer>);
    let request = RequestContext::new().with_principal("admin");

    // WHEN setting /system/readonly/flag = true
    let rejected = controller.set(&readonly_flag(), DataNode::scalar(true), &request);

    // THEN the hook rejects it and nothing is stored or notified
    match rejected {
        Err(TreespaceError::AuthorizationRejected { hook, .. }) => assert_eq!(hook, "readonly-guard"),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(matches!(
        controller.get(&readonly_flag()),
        Err(TreespaceError::NotFound { .. })
    ));
    assert!(consumer.events().is_empty());

    // WHEN setting /system/writable/flag = true
    let receipt = controller
        .set(&writable_flag(), DataNode::scalar(true), &request)
        .unwrap();

    // THEN it commits and is delivered once with old absent, new true
    assert_eq!(receipt.state, MutationState::Notified);
    assert_eq!(receipt.operation, Operation::Create);
    assert_eq!(controller.get(&writable_flag()).unwrap().as_ref(), &DataNode::scalar(true));

    let events = consumer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].path, writable_flag());
    assert!(events[0].old.is_none());
    assert_eq!(events[0].new.as_deref(), Some(&DataNode::scalar(true)));
    assert_eq!(events[0].request.principal.as_deref(), Some("admin"));
    assert_eq!(events[0].version, receipt.version);
}

#[test]
fn test_query_sees_committed_interfaces() {
    // GIVEN two interfaces written through the pipeline
    let (registry, _) = controller();
    let controller = registry.get("controller").unwrap();
    let request = RequestContext::new();
    controller
        .set(&interface("eth0").child("mtu"), DataNode::scalar(9000u64), &request)
        .unwrap();
    controller
        .set(&interface("eth1").child("enabled"), DataNode::scalar(true), &request)
        .unwrap();

    // WHEN querying interfaces whose name is not eth0
    let mut cursor = controller
        .query("/interfaces/interface[name != 'eth0']/name", &NoVariables)
        .unwrap();
    let names: Vec<DataNode> = cursor.by_ref().map(|m| m.node.as_ref().clone()).collect();

    // THEN only eth1's key leaf comes back and the cursor released itself
    assert_eq!(names, vec![DataNode::scalar("eth1")]);
    assert!(cursor.is_closed());
    assert_eq!(controller.open_cursors(), 0);
}

#[test]
fn test_unknown_treespace_is_not_found() {
    let (registry, _) = controller();
    assert_eq!(
        registry.get("oper").unwrap_err(),
        TreespaceError::TreespaceNotFound {
            name: "oper".to_string()
        }
    );
}
