//! Visibility and Validation Tests
//!
//! ## Scenarios Covered
//!
//! 1. A validation hook vetoes the proposed tree before any authorization hook
//! 2. A filtered entry is invisible to queries and unreachable by mutations
//! 3. Query hooks withhold matches without affecting mutations
//! 4. Unregistering a hook restores the previous behavior

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{controller, interface};
use treespace_core::{
    AuthorizationHook, ClosableIterator, DataNode, DataPath, FilterContext, FilterHook, FilterOperation,
    FilterResult, HookContext, HookResult, NoVariables, Operation, RequestContext, TreespaceError,
    ValidationContext, ValidationHook, ValidationResult,
};

fn interfaces() -> DataPath {
    DataPath::root().child("interfaces")
}

fn interface_list() -> DataPath {
    interfaces().child("interface")
}

fn matched_paths(ts: &treespace_core::Treespace, query: &str, request: &RequestContext) -> Vec<String> {
    let mut cursor = ts.query_as(query, &NoVariables, request).unwrap();
    let paths = cursor.by_ref().map(|m| m.path.to_string()).collect();
    cursor.close();
    paths
}

/// Enabled interfaces must carry an mtu
fn mtu_required() -> Arc<dyn ValidationHook> {
    Arc::new(|ctx: &ValidationContext<'_>| {
        let entries = ctx
            .node
            .and_then(|n| n.child("interface"))
            .and_then(|l| l.children().cloned())
            .unwrap_or_default();
        for (key, entry) in entries {
            let enabled = entry.child("enabled").is_some_and(|e| e.as_scalar().is_some_and(|v| v.truthy()));
            if enabled && entry.child("mtu").is_none() {
                return ValidationResult::invalid(format!("interface {} is enabled without an mtu", key));
            }
        }
        ValidationResult::Valid
    })
}

/// Hides every interface whose name starts with "mgmt"
fn hide_management(seen: &Arc<AtomicUsize>) -> Arc<dyn FilterHook> {
    let seen = Arc::clone(seen);
    Arc::new(move |ctx: &FilterContext<'_>| {
        seen.fetch_add(1, Ordering::SeqCst);
        let name = ctx.entry.child("name").and_then(|n| n.as_scalar()).map(|v| v.canonical());
        if name.is_some_and(|n| n.starts_with("mgmt")) {
            FilterResult::Exclude
        } else {
            FilterResult::Include
        }
    })
}

#[test]
fn test_validation_hook_vetoes_before_authorization() {
    // GIVEN a validator on /interfaces and a counting authorization hook
    let (_registry, ts) = controller();
    let authorized = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&authorized);
    let counting: Arc<dyn AuthorizationHook> = Arc::new(move |_: &HookContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        HookResult::Accept
    });
    ts.hooks().register_hook("count", counting);
    ts.hooks().register_validation_hook("mtu-required", interfaces(), mtu_required());
    let request = RequestContext::new();

    // WHEN enabling an interface that has no mtu
    let result = ts.set(&interface("eth0").child("enabled"), DataNode::scalar(true), &request);

    // THEN the validator rejects it, no hook ran and nothing was written
    let Err(TreespaceError::ValidationRejected { hook, reason, path }) = result else {
        panic!("expected a validation rejection, got {:?}", result);
    };
    assert_eq!(hook, "mtu-required");
    assert_eq!(path, "/interfaces");
    assert_eq!(reason, "interface eth0 is enabled without an mtu");
    assert_eq!(authorized.load(Ordering::SeqCst), 0);
    assert_eq!(ts.version(), 0);

    // AND the same interface with an mtu is accepted
    let entry = DataNode::container([("mtu", DataNode::scalar(1500u64)), ("enabled", DataNode::scalar(true))]);
    assert!(ts.set(&interface("eth0"), entry, &request).is_ok());
    assert_eq!(authorized.load(Ordering::SeqCst), 1);

    // AND mutations outside the scope never reach the validator
    let flag = DataPath::root().child("system").child("writable").child("flag");
    assert!(ts.set(&flag, DataNode::scalar(true), &request).is_ok());
}

#[test]
fn test_filtered_entry_is_invisible_and_unreachable() {
    // GIVEN two interfaces, one of them a management port
    let (_registry, ts) = controller();
    let request = RequestContext::new();
    for name in ["eth0", "mgmt0"] {
        ts.set(&interface(name).child("mtu"), DataNode::scalar(1500u64), &request)
            .unwrap();
    }
    let seen = Arc::new(AtomicUsize::new(0));
    ts.hooks()
        .register_filter_hook("hide-mgmt", interface_list(), hide_management(&seen));

    // WHEN querying the list, and querying through a predicate
    let listed = matched_paths(&ts, "/interfaces/interface", &request);
    let by_mtu = matched_paths(&ts, "/interfaces/interface[mtu='1500']/name", &request);

    // THEN only eth0 is visible either way
    assert_eq!(listed, vec!["/interfaces/interface[name='eth0']"]);
    assert_eq!(by_mtu, vec!["/interfaces/interface[name='eth0']/name"]);
    assert!(seen.load(Ordering::SeqCst) > 0);

    // WHEN deleting the hidden entry and writing inside it
    let deleted = ts.delete(&interface("mgmt0"), &request);
    let written = ts.set(&interface("mgmt0").child("mtu"), DataNode::scalar(9000u64), &request);

    // THEN the delete finds nothing and the write is refused by the filter
    assert!(matches!(deleted, Err(TreespaceError::NotFound { .. })));
    let Err(TreespaceError::AuthorizationRejected { hook, .. }) = written else {
        panic!("expected the filter to refuse the write, got {:?}", written);
    };
    assert_eq!(hook, "hide-mgmt");

    // AND replacing the whole list would drop the hidden entry, so it is refused
    assert!(matches!(
        ts.set(&interfaces(), DataNode::empty_container(), &request),
        Err(TreespaceError::AuthorizationRejected { .. })
    ));
    assert_eq!(
        ts.get(&interface("mgmt0").child("mtu")).unwrap().as_ref(),
        &DataNode::scalar(1500u64)
    );
}

#[test]
fn test_filter_sees_the_operation_kind() {
    // GIVEN a filter that only hides entries from queries
    let (_registry, ts) = controller();
    let request = RequestContext::new();
    ts.set(&interface("mgmt0").child("mtu"), DataNode::scalar(1500u64), &request)
        .unwrap();
    let query_only: Arc<dyn FilterHook> = Arc::new(|ctx: &FilterContext<'_>| match ctx.operation {
        FilterOperation::Query => FilterResult::Exclude,
        FilterOperation::Mutation => FilterResult::Include,
    });
    ts.hooks().register_filter_hook("query-only", interface_list(), query_only);

    // THEN queries miss the entry while mutations still reach it
    assert!(matched_paths(&ts, "/interfaces/interface", &request).is_empty());
    assert!(ts
        .set(&interface("mgmt0").child("mtu"), DataNode::scalar(9000u64), &request)
        .is_ok());
}

#[test]
fn test_query_hooks_withhold_matches() {
    // GIVEN two interfaces and a query hook refusing anything under eth1
    let (_registry, ts) = controller();
    let request = RequestContext::on_behalf_of("operator");
    for name in ["eth0", "eth1"] {
        ts.set(&interface(name).child("mtu"), DataNode::scalar(1500u64), &request)
            .unwrap();
    }
    let operations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&operations);
    let private = interface("eth1");
    let hide_eth1: Arc<dyn AuthorizationHook> = Arc::new(move |ctx: &HookContext| {
        if ctx.operation == Operation::Query && ctx.new.is_none() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        if private.is_prefix_of(&ctx.path) {
            HookResult::reject("eth1 is private")
        } else {
            HookResult::Accept
        }
    });
    ts.hooks().register_query_hook("hide-eth1", hide_eth1);

    // WHEN querying every mtu
    let mtus = matched_paths(&ts, "/interfaces/interface/mtu", &request);

    // THEN the eth1 match is withheld and each match was asked once, as a query
    assert_eq!(mtus, vec!["/interfaces/interface[name='eth0']/mtu"]);
    assert_eq!(operations.load(Ordering::SeqCst), 2);

    // AND mutations are not subject to query hooks
    assert!(ts
        .set(&interface("eth1").child("mtu"), DataNode::scalar(9000u64), &request)
        .is_ok());
}

#[test]
fn test_unregister_restores_behavior() {
    // GIVEN a validator, a filter and a query hook that all refuse
    let (_registry, ts) = controller();
    let request = RequestContext::new();
    ts.set(&interface("mgmt0").child("mtu"), DataNode::scalar(1500u64), &request)
        .unwrap();
    let hooks = ts.hooks();
    let seen = Arc::new(AtomicUsize::new(0));
    hooks.register_filter_hook("hide-mgmt", interface_list(), hide_management(&seen));
    hooks.register_validation_hook("mtu-required", interfaces(), mtu_required());
    let refuse: Arc<dyn AuthorizationHook> = Arc::new(|_: &HookContext| HookResult::reject("closed"));
    hooks.register_query_hook("closed", refuse);

    // WHEN removing each of them by name
    assert!(hooks.unregister_filter_hook("hide-mgmt"));
    assert!(hooks.unregister_query_hook("closed"));
    assert!(hooks.unregister_validation_hook("mtu-required"));

    // THEN the entry is visible again and the mtu-less interface is accepted
    assert_eq!(
        matched_paths(&ts, "/interfaces/interface", &request),
        vec!["/interfaces/interface[name='mgmt0']"]
    );
    assert!(ts
        .set(&interface("eth0").child("enabled"), DataNode::scalar(true), &request)
        .is_ok());

    // AND removing an unknown name reports false
    assert!(!hooks.unregister_filter_hook("hide-mgmt"));
    assert!(!hooks.unregister_hook("never-registered"));
}
