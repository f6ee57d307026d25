//! Treespace Core - schema-validated hierarchical data stores
//!
//! This crate provides the engine behind named treespaces:
//! - Schema composition from named, revisioned modules
//! - Versioned, structurally shared data trees
//! - Path queries with variable substitution and batched syntax errors
//! - Authorization hooks and change notification around every write
//! - Closable result cursors and serializer binding
//!
//! Everything is reached through an explicitly constructed
//! [`TreespaceRegistry`].

pub mod config;
pub mod data;
pub mod errors;
pub mod hooks;
pub mod iter;
pub mod logging_facility;
pub mod path;
pub mod query;
pub mod registry;
pub mod schema;
pub mod serializer;
pub mod treespace;

pub use config::{EngineConfig, LoggingConfig, TreespaceConfig};
pub use data::{DataNode, DataTree, ScalarValue};
pub use errors::{ExError, ExErrorKind, Result, TreespaceError};
pub use hooks::{
    AcceptAllHook, AuthorizationHook, CommitReceipt, FilterContext, FilterHook, FilterOperation, FilterResult,
    HookContext, HookRegistry, HookResult, MutationEvent, MutationState, NotificationConsumer, Operation,
    ReadOnlySubtreeHook, RejectAllHook, ValidationContext, ValidationHook, ValidationResult,
};
pub use iter::{ClosableIterator, Cursor};
pub use path::{DataPath, ListKey, PathSegment};
pub use query::{parse, parse_simple_path, Expression, MapVariableReplacer, NoVariables, VariableReplacer};
pub use registry::TreespaceRegistry;
pub use schema::{compose, ModuleCatalog, ModuleDefinition, ModuleDescriptor, Schema, SchemaNode, SchemaNodeDef};
pub use serializer::{BindingKey, DataNodeSerializer, SerializerFactory, SerializerRegistry};
pub use treespace::Treespace;
pub use treespace_core_types::RequestContext;

#[doc(hidden)]
pub use treespace_core_types::schema as __log_schema;
