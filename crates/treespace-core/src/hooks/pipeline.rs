//! Validation, authorization and notification passes of a mutation, and
//! the visibility rules applied to queries
//!
//! `PROPOSED -> VALIDATING -> AUTHORIZING -> {COMMITTED | REJECTED} -> NOTIFIED`

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use treespace_core_types::RequestContext;

use crate::data::tree::lookup;
use crate::data::{DataNode, DataTree};
use crate::errors::{Result, TreespaceError};
use crate::hooks::registry::{NamedConsumer, NamedFilter, NamedHook, NamedValidator, ScopedHook};
use crate::hooks::{
    AuthorizationHook, FilterContext, FilterOperation, FilterResult, HookContext, HookResult, MutationEvent,
    Operation, ValidationContext, ValidationResult,
};
use crate::path::DataPath;
use crate::query::SelectionFilter;
use crate::schema::Schema;

/// Lifecycle state of one mutation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Proposed,
    Validating,
    Authorizing,
    Committed,
    Rejected,
    Notified,
}

/// Outcome of a committed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub path: DataPath,
    pub operation: Operation,
    /// Data tree version produced by the commit
    pub version: u64,
    /// `Committed`, or `Notified` once consumers were called
    pub state: MutationState,
    /// Consumers that returned `Ok`
    pub notified: usize,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("panicked: {}", message)
}

/// Run an authorization chain; `Err((hook, reason))` on rejection
///
/// The first `Reject` wins. A chain where every hook abstained rejects,
/// an empty chain accepts.
fn run_chain<'a, I>(hooks: I, ctx: &HookContext) -> std::result::Result<(), (String, String)>
where
    I: IntoIterator<Item = (&'a str, &'a dyn AuthorizationHook)>,
{
    let mut abstained = Vec::new();
    let mut accepted = false;
    for (name, hook) in hooks {
        let verdict = catch_unwind(AssertUnwindSafe(|| hook.authorize(ctx)))
            .unwrap_or_else(|payload| HookResult::Reject(panic_message(payload.as_ref())));
        match verdict {
            HookResult::Accept => accepted = true,
            HookResult::Reject(reason) => return Err((name.to_string(), reason)),
            HookResult::Undecided => abstained.push(name),
        }
    }
    if accepted || abstained.is_empty() {
        Ok(())
    } else {
        Err((abstained.join(", "), "no hook accepted".to_string()))
    }
}

/// Run hooks in order until one rejects
///
/// A panicking hook counts as a rejection carrying its panic message.
///
/// # Errors
///
/// `AuthorizationRejected` naming the first rejecting hook, or every hook
/// when all of them abstained.
pub fn authorize(hooks: &[NamedHook], ctx: &HookContext) -> Result<()> {
    run_chain(hooks.iter().map(|(name, hook)| (name.as_str(), hook.as_ref())), ctx).map_err(|(hook, reason)| {
        tracing::info!(
            treespace = %ctx.treespace,
            path = %ctx.path,
            hook = %hook,
            operation = %ctx.operation,
            reason = %reason,
            "mutation rejected"
        );
        TreespaceError::AuthorizationRejected { reason, hook }
    })
}

/// Check the proposed tree against every validation hook, in order
///
/// # Errors
///
/// `ValidationRejected` from the first hook returning `Invalid` or
/// panicking.
pub fn validate(validators: &[NamedValidator], treespace: &str, candidate: &DataTree) -> Result<()> {
    for (name, scope, hook) in validators {
        let node = candidate.get(scope);
        let ctx = ValidationContext {
            treespace,
            scope,
            node: node.as_ref(),
            root: candidate.root(),
        };
        let verdict = catch_unwind(AssertUnwindSafe(|| hook.validate(&ctx)))
            .unwrap_or_else(|payload| ValidationResult::Invalid(panic_message(payload.as_ref())));
        if let ValidationResult::Invalid(reason) = verdict {
            tracing::info!(treespace = %treespace, scope = %scope, hook = %name, reason = %reason, "mutation failed validation");
            return Err(TreespaceError::ValidationRejected {
                path: scope.to_string(),
                reason,
                hook: name.clone(),
            });
        }
    }
    Ok(())
}

/// Name of the first filter excluding the entry in `ctx`
///
/// A panicking filter excludes.
fn excluded_by(filters: &[NamedFilter], ctx: &FilterContext<'_>) -> Option<String> {
    let list = ctx.path.schema_path();
    filters
        .iter()
        .filter(|(_, scope, _)| scope.schema_path() == list)
        .find_map(|(name, _, hook)| {
            let verdict = catch_unwind(AssertUnwindSafe(|| hook.filter(ctx))).unwrap_or_else(|payload| {
                tracing::warn!(hook = %name, path = %ctx.path, reason = %panic_message(payload.as_ref()), "filter hook failed");
                FilterResult::Exclude
            });
            (verdict == FilterResult::Exclude).then(|| name.clone())
        })
}

/// Filter hook state shared by one mutation's checks
struct EntryScan<'a> {
    filters: &'a [NamedFilter],
    schema: &'a Schema,
    treespace: &'a str,
    request: &'a RequestContext,
}

impl EntryScan<'_> {
    fn excluded(&self, path: &DataPath, entry: &Arc<DataNode>) -> Option<String> {
        let ctx = FilterContext {
            treespace: self.treespace,
            operation: FilterOperation::Mutation,
            path,
            entry,
            request: self.request,
        };
        excluded_by(self.filters, &ctx)
    }

    /// Hidden entries inside the subtree at `path`
    fn below(&self, path: &DataPath, node: &Arc<DataNode>) -> Option<(String, DataPath)> {
        match node.as_ref() {
            DataNode::Container(children) => children
                .iter()
                .find_map(|(name, child)| self.below(&path.child(name.as_str()), child)),
            DataNode::List(entries) => {
                let list = path.last()?;
                let parent = path.parent().unwrap_or_default();
                let leaf = self.schema.lookup(path).ok().and_then(|n| n.key.clone()).unwrap_or_default();
                entries.iter().find_map(|(key, entry)| {
                    let entry_path = parent.entry(list.name.as_str(), leaf.as_str(), key.as_str());
                    match self.excluded(&entry_path, entry) {
                        Some(name) => Some((name, entry_path)),
                        None => self.below(&entry_path, entry),
                    }
                })
            }
            _ => None,
        }
    }
}

/// First list entry a filter hides from a mutation at `path`, as
/// `(filter, entry path)`
///
/// Entries on the way to `path` are checked first, then every entry in
/// the subtree the mutation would replace or remove.
pub fn hidden_entry(
    filters: &[NamedFilter],
    schema: &Schema,
    treespace: &str,
    request: &RequestContext,
    root: &Arc<DataNode>,
    path: &DataPath,
) -> Option<(String, DataPath)> {
    if filters.is_empty() {
        return None;
    }
    let scan = EntryScan {
        filters,
        schema,
        treespace,
        request,
    };
    let segments = path.segments();
    for (i, segment) in segments.iter().enumerate() {
        if segment.key.is_none() {
            continue;
        }
        let entry_path = DataPath::from_segments(segments[..=i].to_vec());
        // nothing below an absent entry exists either
        let entry = lookup(root, &entry_path)?;
        if let Some(name) = scan.excluded(&entry_path, &entry) {
            return Some((name, entry_path));
        }
    }
    let target = lookup(root, path)?;
    scan.below(path, &target)
}

/// Deliver an event to every consumer once; returns how many succeeded
///
/// Failures are logged and otherwise swallowed.
pub fn notify(consumers: &[NamedConsumer], event: &MutationEvent) -> usize {
    let mut delivered = 0;
    for (name, consumer) in consumers {
        match catch_unwind(AssertUnwindSafe(|| consumer.notify(event))) {
            Ok(Ok(())) => delivered += 1,
            Ok(Err(err)) => {
                tracing::warn!(
                    treespace = %event.treespace,
                    path = %event.path,
                    consumer = %name,
                    error = %err,
                    "notification failed"
                );
            }
            Err(payload) => {
                tracing::warn!(
                    treespace = %event.treespace,
                    path = %event.path,
                    consumer = %name,
                    reason = %panic_message(payload.as_ref()),
                    "notification consumer panicked"
                );
            }
        }
    }
    delivered
}

/// What one query request may see: filter hooks decide per list entry,
/// query authorization hooks per match
pub struct QueryVisibility {
    treespace: String,
    request: RequestContext,
    filters: Vec<NamedFilter>,
    hooks: Vec<ScopedHook>,
}

impl QueryVisibility {
    pub fn new(
        treespace: impl Into<String>,
        request: RequestContext,
        filters: Vec<NamedFilter>,
        hooks: Vec<ScopedHook>,
    ) -> Self {
        Self {
            treespace: treespace.into(),
            request,
            filters,
            hooks,
        }
    }

    /// True when nothing could be hidden
    pub fn is_unrestricted(&self) -> bool {
        self.filters.is_empty() && self.hooks.is_empty()
    }
}

impl SelectionFilter for QueryVisibility {
    fn admit_entry(&self, path: &DataPath, entry: &Arc<DataNode>) -> bool {
        let ctx = FilterContext {
            treespace: &self.treespace,
            operation: FilterOperation::Query,
            path,
            entry,
            request: &self.request,
        };
        excluded_by(&self.filters, &ctx).is_none()
    }

    fn admit_match(&self, path: &DataPath, node: &Arc<DataNode>) -> bool {
        let applicable: Vec<(&str, &dyn AuthorizationHook)> = self
            .hooks
            .iter()
            .filter(|(_, scope, _)| scope.as_ref().map_or(true, |s| s.overlaps(path)))
            .map(|(name, _, hook)| (name.as_str(), hook.as_ref()))
            .collect();
        if applicable.is_empty() {
            return true;
        }
        let ctx = HookContext {
            treespace: self.treespace.clone(),
            path: path.clone(),
            old: Some(Arc::clone(node)),
            new: None,
            operation: Operation::Query,
            request: self.request.clone(),
        };
        match run_chain(applicable, &ctx) {
            Ok(()) => true,
            Err((hook, reason)) => {
                tracing::debug!(treespace = %self.treespace, path = %path, hook = %hook, reason = %reason, "query match withheld");
                false
            }
        }
    }
}
