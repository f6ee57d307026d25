//! List entry filters
//!
//! A filter is registered on a list node and decides, entry by entry, what
//! a request may see. Excluded entries behave as if they did not exist:
//! queries step over them and mutations cannot reach them.

use std::sync::Arc;

use treespace_core_types::RequestContext;

use crate::data::DataNode;
use crate::path::DataPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Include,
    Exclude,
}

/// What the filtered entry is being reached for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperation {
    Query,
    Mutation,
}

/// One list entry as shown to a filter
///
/// `entry` is the entry as it is before any pending mutation.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub treespace: &'a str,
    pub operation: FilterOperation,
    /// Fully keyed path of the entry
    pub path: &'a DataPath,
    pub entry: &'a Arc<DataNode>,
    pub request: &'a RequestContext,
}

/// Per-entry visibility decision; must not change any state
pub trait FilterHook: Send + Sync {
    fn filter(&self, ctx: &FilterContext<'_>) -> FilterResult;
}

impl<F> FilterHook for F
where
    F: Fn(&FilterContext<'_>) -> FilterResult + Send + Sync,
{
    fn filter(&self, ctx: &FilterContext<'_>) -> FilterResult {
        self(ctx)
    }
}
