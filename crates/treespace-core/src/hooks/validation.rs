//! Candidate-tree validation
//!
//! Validation hooks check constraints the schema cannot express, such as
//! relations between sibling leaves. They run on the proposed tree after
//! the schema has accepted it and before any authorization hook.

use std::sync::Arc;

use crate::data::DataNode;
use crate::path::DataPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn invalid(message: impl Into<String>) -> Self {
        ValidationResult::Invalid(message.into())
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// The proposed tree as shown to a validation hook
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub treespace: &'a str,
    /// Where the hook is registered
    pub scope: &'a DataPath,
    /// Node at `scope` in the proposed tree; `None` once it is deleted
    pub node: Option<&'a Arc<DataNode>>,
    /// Root of the proposed tree
    pub root: &'a Arc<DataNode>,
}

/// Veto on the state a mutation would produce
///
/// Hooks look only at the proposed tree, never at the current one, and
/// must not change any state.
pub trait ValidationHook: Send + Sync {
    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult;
}

impl<F> ValidationHook for F
where
    F: Fn(&ValidationContext<'_>) -> ValidationResult + Send + Sync,
{
    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        self(ctx)
    }
}
