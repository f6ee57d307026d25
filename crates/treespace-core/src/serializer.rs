//! Serializer binding
//!
//! Bindings map a node type (and optionally one accessor of it) to a
//! serializer factory plus static arguments. They are declared up front;
//! the first resolution freezes the table and every resolution is cached
//! for the life of the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::data::DataNode;
use crate::errors::{Result, TreespaceError};

/// Encodes one data node for the wire
pub trait DataNodeSerializer: Send + Sync {
    /// # Errors
    ///
    /// `Serialization` when the node cannot be encoded.
    fn serialize(&self, node: &DataNode) -> Result<Value>;
}

/// Builds a serializer from its static arguments
pub trait SerializerFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `create` understands arguments at all
    fn accepts_args(&self) -> bool {
        false
    }

    /// # Errors
    ///
    /// Any error the factory reports for its arguments.
    fn create(&self, args: &[String]) -> Result<Arc<dyn DataNodeSerializer>>;
}

/// Type identity plus optional accessor identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    pub type_id: String,
    pub accessor: Option<String>,
}

impl BindingKey {
    pub fn for_type(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            accessor: None,
        }
    }

    pub fn for_accessor(type_id: impl Into<String>, accessor: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            accessor: Some(accessor.into()),
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.accessor {
            Some(accessor) => write!(f, "{}::{}", self.type_id, accessor),
            None => write!(f, "{}", self.type_id),
        }
    }
}

/// Default encoding: the node's structural JSON form
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralSerializer;

impl DataNodeSerializer for StructuralSerializer {
    fn serialize(&self, node: &DataNode) -> Result<Value> {
        Ok(node.to_json())
    }
}

/// Renders scalars as JSON strings; handy for 64-bit counters
#[derive(Debug, Clone, Copy, Default)]
pub struct ToStringSerializer;

impl DataNodeSerializer for ToStringSerializer {
    fn serialize(&self, node: &DataNode) -> Result<Value> {
        match node {
            DataNode::Scalar(v) => Ok(Value::String(v.canonical())),
            DataNode::LeafList(values) => Ok(Value::Array(
                values.iter().map(|v| Value::String(v.canonical())).collect(),
            )),
            other => Err(TreespaceError::Serialization {
                message: format!("cannot render {} as a string", other.kind_name()),
            }),
        }
    }
}

/// Factory for serializers that take no arguments
pub struct FixedFactory {
    name: String,
    serializer: Arc<dyn DataNodeSerializer>,
}

impl FixedFactory {
    pub fn new(name: impl Into<String>, serializer: Arc<dyn DataNodeSerializer>) -> Self {
        Self {
            name: name.into(),
            serializer,
        }
    }
}

impl SerializerFactory for FixedFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _: &[String]) -> Result<Arc<dyn DataNodeSerializer>> {
        Ok(Arc::clone(&self.serializer))
    }
}

struct Binding {
    factory: Arc<dyn SerializerFactory>,
    args: Vec<String>,
}

#[derive(Default)]
struct State {
    bindings: HashMap<BindingKey, Binding>,
    /// `None` records "no binding, use the default"
    resolved: HashMap<BindingKey, Option<Arc<dyn DataNodeSerializer>>>,
    frozen: bool,
}

/// Registry of serializer bindings
pub struct SerializerRegistry {
    state: RwLock<State>,
    default: Arc<dyn DataNodeSerializer>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            default: Arc::new(StructuralSerializer),
        }
    }

    /// Declare a binding
    ///
    /// # Errors
    ///
    /// `DuplicateSerializerBinding` if `key` is already bound, and
    /// `InvalidConfig` once any resolution has happened.
    pub fn bind(&self, key: BindingKey, factory: Arc<dyn SerializerFactory>, args: Vec<String>) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.frozen {
            return Err(TreespaceError::InvalidConfig {
                reason: format!("serializer binding for {} declared after first resolution", key),
            });
        }
        if state.bindings.contains_key(&key) {
            return Err(TreespaceError::DuplicateSerializerBinding {
                binding: key.to_string(),
            });
        }
        tracing::debug!(binding = %key, factory = factory.name(), args = args.len(), "serializer bound");
        state.bindings.insert(key, Binding { factory, args });
        Ok(())
    }

    /// Serializer explicitly bound for this type/accessor, if any
    ///
    /// The accessor-level binding wins over the type-level one.
    ///
    /// # Errors
    ///
    /// `SerializerArgsNotAccepted` when the chosen factory takes no
    /// arguments but was bound with some, or any factory error.
    pub fn binding_for(&self, type_id: &str, accessor: Option<&str>) -> Result<Option<Arc<dyn DataNodeSerializer>>> {
        let lookup = BindingKey {
            type_id: type_id.to_string(),
            accessor: accessor.map(str::to_string),
        };
        if let Some(hit) = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolved
            .get(&lookup)
        {
            return Ok(hit.clone());
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.frozen = true;
        if let Some(hit) = state.resolved.get(&lookup) {
            return Ok(hit.clone());
        }

        let accessor_key = accessor.map(|a| BindingKey::for_accessor(type_id, a));
        let type_key = BindingKey::for_type(type_id);
        let chosen = accessor_key
            .as_ref()
            .and_then(|k| state.bindings.get(k).map(|b| (k, b)))
            .or_else(|| state.bindings.get(&type_key).map(|b| (&type_key, b)));

        let serializer = match chosen {
            Some((key, binding)) => {
                if !binding.args.is_empty() && !binding.factory.accepts_args() {
                    return Err(TreespaceError::SerializerArgsNotAccepted {
                        binding: key.to_string(),
                    });
                }
                Some(binding.factory.create(&binding.args)?)
            }
            None => None,
        };
        state.resolved.insert(lookup, serializer.clone());
        Ok(serializer)
    }

    /// Serializer to use for this type/accessor, falling back to the
    /// structural default
    ///
    /// # Errors
    ///
    /// As [`SerializerRegistry::binding_for`].
    pub fn resolve(&self, type_id: &str, accessor: Option<&str>) -> Result<Arc<dyn DataNodeSerializer>> {
        Ok(self
            .binding_for(type_id, accessor)?
            .unwrap_or_else(|| Arc::clone(&self.default)))
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps values in an object tagged with its static args
    struct TaggingFactory {
        created: AtomicUsize,
    }

    struct Tagging(Vec<String>);

    impl DataNodeSerializer for Tagging {
        fn serialize(&self, node: &DataNode) -> Result<Value> {
            Ok(json!({ "tags": self.0, "value": node.to_json() }))
        }
    }

    impl SerializerFactory for TaggingFactory {
        fn name(&self) -> &str {
            "tagging"
        }

        fn accepts_args(&self) -> bool {
            true
        }

        fn create(&self, args: &[String]) -> Result<Arc<dyn DataNodeSerializer>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Tagging(args.to_vec())))
        }
    }

    fn to_string_factory() -> Arc<dyn SerializerFactory> {
        Arc::new(FixedFactory::new("to-string", Arc::new(ToStringSerializer)))
    }

    #[test]
    fn test_accessor_binding_overrides_type_binding() {
        let registry = SerializerRegistry::new();
        registry
            .bind(BindingKey::for_type("uint64"), to_string_factory(), vec![])
            .unwrap();
        registry
            .bind(
                BindingKey::for_accessor("uint64", "/stats/rx"),
                Arc::new(TaggingFactory {
                    created: AtomicUsize::new(0),
                }),
                vec!["counter".to_string()],
            )
            .unwrap();

        let node = DataNode::scalar(7u64);
        let by_accessor = registry.resolve("uint64", Some("/stats/rx")).unwrap();
        assert_eq!(
            by_accessor.serialize(&node).unwrap(),
            json!({"tags": ["counter"], "value": 7})
        );
        let by_type = registry.resolve("uint64", Some("/stats/tx")).unwrap();
        assert_eq!(by_type.serialize(&node).unwrap(), json!("7"));
        let default = registry.resolve("string", None).unwrap();
        assert_eq!(default.serialize(&DataNode::scalar("x")).unwrap(), json!("x"));
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let registry = SerializerRegistry::new();
        let key = BindingKey::for_type("counter");
        registry.bind(key.clone(), to_string_factory(), vec![]).unwrap();
        assert_eq!(
            registry.bind(key, to_string_factory(), vec![]),
            Err(TreespaceError::DuplicateSerializerBinding {
                binding: "counter".to_string()
            })
        );
    }

    #[test]
    fn test_args_not_accepted() {
        let registry = SerializerRegistry::new();
        registry
            .bind(BindingKey::for_type("counter"), to_string_factory(), vec!["x".to_string()])
            .unwrap();
        assert!(matches!(
            registry.resolve("counter", None),
            Err(TreespaceError::SerializerArgsNotAccepted { .. })
        ));
    }

    #[test]
    fn test_resolution_cached_and_frozen() {
        let factory = Arc::new(TaggingFactory {
            created: AtomicUsize::new(0),
        });
        let registry = SerializerRegistry::new();
        registry
            .bind(BindingKey::for_type("t"), factory.clone(), vec![])
            .unwrap();

        let a = registry.resolve("t", None).unwrap();
        let b = registry.resolve("t", None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        assert!(matches!(
            registry.bind(BindingKey::for_type("u"), factory, vec![]),
            Err(TreespaceError::InvalidConfig { .. })
        ));
    }
}
