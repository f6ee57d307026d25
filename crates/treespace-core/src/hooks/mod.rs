//! Hooks around data access
//!
//! Every proposed mutation is described by a [`HookContext`]. Validation
//! hooks check the proposed tree, authorization hooks see the context
//! before commit and any of them can veto, and notification consumers see
//! the committed result as a [`MutationEvent`]. Filter hooks and query
//! authorization hooks decide what a query may return.

pub mod authorization;
pub mod filter;
pub mod notification;
pub mod pipeline;
pub mod registry;
pub mod validation;

use std::fmt;
use std::sync::Arc;

use treespace_core_types::RequestContext;

use crate::data::DataNode;
use crate::path::DataPath;

pub use authorization::{AcceptAllHook, AuthorizationHook, HookResult, ReadOnlySubtreeHook, RejectAllHook};
pub use filter::{FilterContext, FilterHook, FilterOperation, FilterResult};
pub use notification::{MutationEvent, NotificationConsumer};
pub use pipeline::{CommitReceipt, MutationState, QueryVisibility};
pub use registry::HookRegistry;
pub use validation::{ValidationContext, ValidationHook, ValidationResult};

/// Kind of access a hook is asked about
///
/// Mutations are classified from which side is present; `Query` is only
/// used for query authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Query,
}

impl Operation {
    /// Mutation kind; `None` when neither side exists
    pub fn classify(old: Option<&Arc<DataNode>>, new: Option<&Arc<DataNode>>) -> Option<Self> {
        match (old, new) {
            (None, Some(_)) => Some(Operation::Create),
            (Some(_), Some(_)) => Some(Operation::Update),
            (Some(_), None) => Some(Operation::Delete),
            (None, None) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Query => "query",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate mutation or query match as shown to authorization hooks
///
/// `old` and `new` are immutable snapshots; nothing a hook does with them
/// can reach the live tree. For queries `old` is the matched node and
/// `new` is `None`.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub treespace: String,
    pub path: DataPath,
    pub old: Option<Arc<DataNode>>,
    pub new: Option<Arc<DataNode>>,
    pub operation: Operation,
    pub request: RequestContext,
}
