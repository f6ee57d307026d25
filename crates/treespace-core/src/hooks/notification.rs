//! Post-commit notification

use std::sync::Arc;

use chrono::{DateTime, Utc};
use treespace_core_types::RequestContext;

use crate::data::DataNode;
use crate::errors::Result;
use crate::hooks::{HookContext, Operation};
use crate::path::DataPath;

/// A committed change
#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub treespace: String,
    pub path: DataPath,
    pub old: Option<Arc<DataNode>>,
    pub new: Option<Arc<DataNode>>,
    pub operation: Operation,
    /// Data tree version produced by the commit
    pub version: u64,
    pub request: RequestContext,
    pub committed_at: DateTime<Utc>,
}

impl MutationEvent {
    pub fn committed(ctx: HookContext, version: u64) -> Self {
        Self {
            treespace: ctx.treespace,
            path: ctx.path,
            old: ctx.old,
            new: ctx.new,
            operation: ctx.operation,
            version,
            request: ctx.request,
            committed_at: Utc::now(),
        }
    }
}

/// Receiver of committed changes
///
/// Delivery is best effort. An error or panic is logged and the commit
/// stands.
pub trait NotificationConsumer: Send + Sync {
    /// # Errors
    ///
    /// Any error; it is logged and otherwise ignored.
    fn notify(&self, event: &MutationEvent) -> Result<()>;
}

impl<F> NotificationConsumer for F
where
    F: Fn(&MutationEvent) -> Result<()> + Send + Sync,
{
    fn notify(&self, event: &MutationEvent) -> Result<()> {
        self(event)
    }
}
