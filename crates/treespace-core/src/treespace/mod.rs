//! A named, schema-validated data store
//!
//! Reads work on immutable snapshots and never wait for writers. Writes
//! go through the hook pipeline: the target subtree is locked, validation
//! hooks see the proposed tree, authorization hooks see the old and new
//! subtree, and the commit itself is a short write-lock swap of the root.
//! Consumers are notified after every lock is released.

pub mod locks;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use serde_json::{Map, Value};
use treespace_core_types::RequestContext;

use crate::data::{DataNode, DataTree};
use crate::errors::{ExError, Result, TreespaceError};
use crate::hooks::pipeline::{authorize, hidden_entry, notify, validate};
use crate::hooks::{
    CommitReceipt, HookContext, HookRegistry, MutationEvent, MutationState, Operation, QueryVisibility,
};
use crate::iter::{Cursor, CursorLease, EmptyCursor, QueryCursor};
use crate::path::DataPath;
use crate::query::{parse, Expression, VariableReplacer};
use crate::schema::module::NodeKind;
use crate::schema::{Schema, SchemaNode};
use crate::serializer::SerializerRegistry;
use crate::{log_op_end, log_op_error, log_op_start};

pub use locks::{PathGuard, PathLocks};

pub struct Treespace {
    name: String,
    schema: Arc<Schema>,
    data: RwLock<DataTree>,
    hooks: HookRegistry,
    path_locks: PathLocks,
    open_cursors: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Treespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Treespace")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Treespace {
    /// Build a treespace over initial data
    ///
    /// # Errors
    ///
    /// `SchemaViolation` if `data` does not conform to `schema`.
    pub fn new(name: impl Into<String>, schema: Arc<Schema>, data: DataTree, hooks: HookRegistry) -> Result<Self> {
        let root = schema.validate(&DataPath::root(), data.root())?;
        Ok(Self {
            name: name.into(),
            schema,
            data: RwLock::new(DataTree::from_root(root)),
            hooks,
            path_locks: PathLocks::new(),
            open_cursors: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Hook and consumer registration for this treespace
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn version(&self) -> u64 {
        self.current().version()
    }

    /// Root of the current data tree; never changes under the caller
    pub fn snapshot(&self) -> Arc<DataNode> {
        self.current().snapshot()
    }

    /// Cursors handed out and not yet closed
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    fn current(&self) -> DataTree {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Parse `query` and iterate its matches over the current snapshot,
    /// as an internal request
    ///
    /// # Errors
    ///
    /// `Parser`, `VariableNotFound` or `StopParsing` from the parser.
    pub fn query(&self, query: &str, replacer: &dyn VariableReplacer) -> Result<Cursor> {
        self.query_as(query, replacer, &RequestContext::new())
    }

    /// [`Treespace::query`] on behalf of `request`
    ///
    /// Filter hooks and query authorization hooks decide what the cursor
    /// yields.
    ///
    /// # Errors
    ///
    /// As [`Treespace::query`].
    pub fn query_as(&self, query: &str, replacer: &dyn VariableReplacer, request: &RequestContext) -> Result<Cursor> {
        let start = Instant::now();
        log_op_start!(
            "query",
            treespace = %self.name,
            query = query,
            request_id = %request.request_id
        );

        match parse(query, replacer) {
            Ok(expr) => {
                let cursor = self.query_expr_as(&expr, request);
                log_op_end!(
                    "query",
                    duration_ms = start.elapsed().as_millis() as u64,
                    treespace = %self.name
                );
                Ok(cursor)
            }
            Err(err) => {
                log_op_error!(
                    "query",
                    ExError::from(&err).with_request_id(request.request_id.clone()),
                    duration_ms = start.elapsed().as_millis() as u64,
                    treespace = %self.name
                );
                Err(err)
            }
        }
    }

    /// Iterate the matches of an already parsed expression, as an internal
    /// request
    pub fn query_expr(&self, expr: &Expression) -> Cursor {
        self.query_expr_as(expr, &RequestContext::new())
    }

    pub fn query_expr_as(&self, expr: &Expression, request: &RequestContext) -> Cursor {
        let tree = self.current();
        let has_data = tree.root().children().is_some_and(|c| !c.is_empty());
        let wants_children = expr.as_path().map_or(true, |p| !p.steps.is_empty());
        if !has_data && wants_children {
            return Box::new(EmptyCursor::new());
        }
        let mut selection = expr.select(Arc::clone(&self.schema), tree.snapshot());
        let visibility = QueryVisibility::new(
            self.name.clone(),
            request.clone(),
            self.hooks.filters(),
            self.hooks.query_hooks(),
        );
        if !visibility.is_unrestricted() {
            selection = selection.with_filter(Arc::new(visibility));
        }
        Box::new(QueryCursor::new(
            selection,
            CursorLease::acquire(&self.open_cursors),
            tree.version(),
        ))
    }

    /// Node at `path` in the current snapshot
    ///
    /// # Errors
    ///
    /// `InvalidPath` when the schema has no such node, `NotFound` when the
    /// data does not.
    pub fn get(&self, path: &DataPath) -> Result<Arc<DataNode>> {
        let path = self.schema.normalize(path)?;
        self.current().get(&path).ok_or_else(|| TreespaceError::NotFound {
            path: path.to_string(),
        })
    }

    /// Create or replace the subtree at `path`
    ///
    /// # Errors
    ///
    /// As [`Treespace::mutate`].
    pub fn set(&self, path: &DataPath, node: DataNode, request: &RequestContext) -> Result<CommitReceipt> {
        self.mutate(path, Some(node), request)
    }

    /// Remove the subtree at `path`
    ///
    /// # Errors
    ///
    /// As [`Treespace::mutate`].
    pub fn delete(&self, path: &DataPath, request: &RequestContext) -> Result<CommitReceipt> {
        self.mutate(path, None, request)
    }

    /// Run one mutation through validation, authorization, commit and
    /// notification
    ///
    /// `None` or `DataNode::Null` deletes. Nothing is applied unless every
    /// applicable validation hook passes and no authorization hook rejects.
    /// List entries hidden from the request by a filter hook count as
    /// absent.
    ///
    /// # Errors
    ///
    /// - `InvalidPath` / `SchemaViolation` when the path or subtree does
    ///   not fit the schema, including any change to the key leaf of a
    ///   list entry
    /// - `NotFound` when deleting something absent or hidden
    /// - `ValidationRejected` naming the first failing validation hook
    /// - `AuthorizationRejected` naming the first rejecting hook, or the
    ///   filter hiding an entry the mutation would write to
    pub fn mutate(&self, path: &DataPath, node: Option<DataNode>, request: &RequestContext) -> Result<CommitReceipt> {
        let start = Instant::now();
        log_op_start!(
            "mutate",
            treespace = %self.name,
            path = %path,
            request_id = %request.request_id
        );

        let result = self.mutate_inner(path, node, request);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(receipt) => {
                log_op_end!(
                    "mutate",
                    duration_ms = duration_ms,
                    treespace = %self.name,
                    operation = %receipt.operation,
                    version = receipt.version,
                    notified = receipt.notified
                );
            }
            Err(err) => {
                log_op_error!(
                    "mutate",
                    ExError::from(err).with_request_id(request.request_id.clone()),
                    duration_ms = duration_ms,
                    treespace = %self.name
                );
            }
        }
        result
    }

    fn mutate_inner(&self, path: &DataPath, node: Option<DataNode>, request: &RequestContext) -> Result<CommitReceipt> {
        let path = self.schema.normalize(path)?;
        let new = match node.filter(|n| !n.is_null()) {
            Some(node) => Some(Arc::new(self.schema.validate(&path, &node)?)),
            None => None,
        };
        self.check_key_leaf(&path, new.as_deref())?;

        let guard = self.path_locks.acquire(&path);
        let base = self.current();
        let filters = self.hooks.filters();
        if let Some((filter, entry)) = hidden_entry(&filters, &self.schema, &self.name, request, base.root(), &path) {
            // deleting a hidden entry, or something inside one, finds nothing
            if new.is_none() && entry.is_prefix_of(&path) {
                return Err(TreespaceError::NotFound {
                    path: path.to_string(),
                });
            }
            return Err(TreespaceError::AuthorizationRejected {
                reason: format!("{} is hidden", entry),
                hook: filter,
            });
        }
        let old = base.get(&path);
        let operation = Operation::classify(old.as_ref(), new.as_ref()).ok_or_else(|| TreespaceError::NotFound {
            path: path.to_string(),
        })?;

        // schema violations surface before any hook runs
        let candidate = self.apply(&base, &path, new.as_ref())?;
        self.check_ancestor_choices(&candidate, &path)?;
        let validators = self.hooks.validators_for(&path);
        validate(&validators, &self.name, &candidate)?;

        let ctx = HookContext {
            treespace: self.name.clone(),
            path: path.clone(),
            old,
            new: new.clone(),
            operation,
            request: request.clone(),
        };
        authorize(&self.hooks.hooks_for(&path), &ctx)?;

        let version = {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            let committed = if data.version() == base.version() {
                candidate
            } else {
                // a disjoint mutation landed meanwhile; our subtree is unchanged
                let rebased = self.apply(&data, &path, new.as_ref())?;
                self.check_ancestor_choices(&rebased, &path)?;
                validate(&validators, &self.name, &rebased)?;
                rebased
            };
            let version = committed.version();
            *data = committed;
            version
        };
        drop(guard);

        let consumers = self.hooks.consumers_for(&path);
        let event = MutationEvent::committed(ctx, version);
        let notified = notify(&consumers, &event);
        Ok(CommitReceipt {
            path,
            operation,
            version,
            state: if consumers.is_empty() {
                MutationState::Committed
            } else {
                MutationState::Notified
            },
            notified,
        })
    }

    fn apply(&self, tree: &DataTree, path: &DataPath, new: Option<&Arc<DataNode>>) -> Result<DataTree> {
        match new {
            Some(node) => tree.with_set(&self.schema, path, Arc::clone(node)),
            None => tree.with_removed(path),
        }
    }

    /// A list entry's key leaf is fixed for the life of the entry
    ///
    /// Setting it to the value it already has is allowed.
    fn check_key_leaf(&self, path: &DataPath, new: Option<&DataNode>) -> Result<()> {
        let Some(entry) = path.parent() else {
            return Ok(());
        };
        let (Some(leaf), Some(key)) = (path.last(), entry.last().and_then(|s| s.key.as_ref())) else {
            return Ok(());
        };
        if leaf.key.is_some() || leaf.name != key.leaf {
            return Ok(());
        }
        let violation = |reason: String| TreespaceError::SchemaViolation {
            path: path.to_string(),
            reason,
        };
        let expected = self.schema.key_value(self.schema.lookup(&entry)?, &key.value)?;
        match new {
            None => Err(violation(format!("key leaf '{}' cannot be deleted", key.leaf))),
            Some(DataNode::Scalar(value)) if *value == expected => Ok(()),
            Some(other) => Err(violation(format!(
                "key leaf '{}' is fixed at '{}', cannot set {}",
                key.leaf,
                key.value,
                match other {
                    DataNode::Scalar(value) => format!("'{}'", value),
                    other => other.kind_name().to_string(),
                }
            ))),
        }
    }

    /// Choices along the way to `path` may have gained a second case
    fn check_ancestor_choices(&self, tree: &DataTree, path: &DataPath) -> Result<()> {
        let segments = path.segments();
        for depth in 0..segments.len() {
            let ancestor = DataPath::from_segments(segments[..depth].to_vec());
            let Some(node) = tree.get(&ancestor) else {
                continue;
            };
            let DataNode::Container(children) = node.as_ref() else {
                continue;
            };
            let schema_node = self.schema.lookup(&ancestor)?;
            self.schema.check_choices(&ancestor.to_string(), schema_node, children)?;
        }
        Ok(())
    }

    /// Encode the subtree at `path` with the bound serializers
    ///
    /// Each node is looked up by its schema type identity and its schema
    /// path as accessor. Unbound nodes fall back to structural encoding.
    ///
    /// # Errors
    ///
    /// `InvalidPath`/`NotFound` as for [`Treespace::get`], plus any
    /// serializer resolution or encoding error.
    pub fn encode(&self, path: &DataPath, serializers: &SerializerRegistry) -> Result<Value> {
        let path = self.schema.normalize(path)?;
        let node = self.current().get(&path).ok_or_else(|| TreespaceError::NotFound {
            path: path.to_string(),
        })?;
        let schema_node = self.schema.lookup(&path)?;
        encode_node(schema_node, &path.schema_path(), &node, serializers)
    }
}

fn encode_node(
    schema_node: &SchemaNode,
    accessor: &str,
    node: &DataNode,
    serializers: &SerializerRegistry,
) -> Result<Value> {
    match (schema_node.kind, node) {
        // a single list entry
        (NodeKind::List, DataNode::Container(fields)) => encode_fields(schema_node, accessor, fields, serializers),
        _ => {
            if let Some(serializer) = serializers.binding_for(schema_node.type_identity(), Some(accessor))? {
                return serializer.serialize(node);
            }
            match node {
                DataNode::Container(children) => encode_fields(schema_node, accessor, children, serializers),
                DataNode::List(entries) => entries
                    .values()
                    .map(|entry| encode_node(schema_node, accessor, entry, serializers))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => Ok(other.to_json()),
            }
        }
    }
}

fn encode_fields(
    schema_node: &SchemaNode,
    accessor: &str,
    fields: &crate::data::Children,
    serializers: &SerializerRegistry,
) -> Result<Value> {
    let mut out = Map::new();
    for (name, child) in fields {
        let child_accessor = if accessor == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", accessor, name)
        };
        let value = match schema_node.data_child(name) {
            Some(child_schema) => encode_node(child_schema, &child_accessor, child, serializers)?,
            None => child.to_json(),
        };
        out.insert(name.clone(), value);
    }
    Ok(Value::Object(out))
}
