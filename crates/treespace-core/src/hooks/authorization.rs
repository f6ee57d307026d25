//! Authorization hooks

use crate::hooks::HookContext;
use crate::path::DataPath;

/// Verdict of one hook
///
/// `Undecided` abstains and leaves the decision to the other hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    Accept,
    Reject(String),
    Undecided,
}

impl HookResult {
    pub fn reject(reason: impl Into<String>) -> Self {
        HookResult::Reject(reason.into())
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, HookResult::Accept)
    }
}

/// Gate evaluated before a mutation commits, or before a query match is
/// returned
///
/// Hooks run synchronously on the calling thread, in registration order.
/// The first `Reject` aborts the mutation and later hooks are skipped. When
/// every hook abstains the mutation is rejected.
pub trait AuthorizationHook: Send + Sync {
    fn authorize(&self, ctx: &HookContext) -> HookResult;
}

impl<F> AuthorizationHook for F
where
    F: Fn(&HookContext) -> HookResult + Send + Sync,
{
    fn authorize(&self, ctx: &HookContext) -> HookResult {
        self(ctx)
    }
}

/// Always accepts
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllHook;

impl AuthorizationHook for AcceptAllHook {
    fn authorize(&self, _: &HookContext) -> HookResult {
        HookResult::Accept
    }
}

/// Always rejects with a fixed reason
#[derive(Debug, Clone)]
pub struct RejectAllHook {
    reason: String,
}

impl RejectAllHook {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AuthorizationHook for RejectAllHook {
    fn authorize(&self, _: &HookContext) -> HookResult {
        HookResult::Reject(self.reason.clone())
    }
}

/// Rejects any mutation at, below, or replacing an ancestor of a subtree
#[derive(Debug, Clone)]
pub struct ReadOnlySubtreeHook {
    root: DataPath,
}

impl ReadOnlySubtreeHook {
    pub fn new(root: DataPath) -> Self {
        Self { root }
    }
}

impl AuthorizationHook for ReadOnlySubtreeHook {
    fn authorize(&self, ctx: &HookContext) -> HookResult {
        if self.root.overlaps(&ctx.path) {
            HookResult::reject(format!("{} is read-only", self.root))
        } else {
            HookResult::Accept
        }
    }
}
