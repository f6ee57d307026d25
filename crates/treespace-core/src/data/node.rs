//! Immutable data nodes
//!
//! Nodes are shared through `Arc`, so a snapshot of a tree is a single
//! pointer clone and an update only copies the spine from the root to the
//! changed node.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Value held by a leaf or leaf-list member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
    /// Presence-only leaf (type `empty`)
    Empty,
}

impl ScalarValue {
    /// Canonical string form, used for list keys and predicate comparison
    pub fn canonical(&self) -> String {
        match self {
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Int(i) => i.to_string(),
            ScalarValue::Uint(u) => u.to_string(),
            ScalarValue::String(s) => s.clone(),
            ScalarValue::Empty => String::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ScalarValue::Bool(b) => Value::Bool(*b),
            ScalarValue::Int(i) => Value::from(*i),
            ScalarValue::Uint(u) => Value::from(*u),
            ScalarValue::String(s) => Value::String(s.clone()),
            ScalarValue::Empty => Value::Null,
        }
    }

    /// Interpret as a boolean the way predicates do
    pub fn truthy(&self) -> bool {
        match self {
            ScalarValue::Bool(b) => *b,
            ScalarValue::Int(i) => *i != 0,
            ScalarValue::Uint(u) => *u != 0,
            ScalarValue::String(s) => !s.is_empty(),
            ScalarValue::Empty => true,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<u64> for ScalarValue {
    fn from(v: u64) -> Self {
        ScalarValue::Uint(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::String(v)
    }
}

/// Ordered child map of a container or list
pub type Children = BTreeMap<String, Arc<DataNode>>;

/// A node in the live data tree
///
/// `List` maps each entry's key value to the entry itself; an entry is a
/// `Container` that also holds its key leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataNode {
    /// Absent value; as a mutation payload it means "delete"
    Null,
    Scalar(ScalarValue),
    LeafList(Vec<ScalarValue>),
    Container(Children),
    List(Children),
}

impl DataNode {
    pub fn empty_container() -> Self {
        DataNode::Container(Children::new())
    }

    pub fn scalar(value: impl Into<ScalarValue>) -> Self {
        DataNode::Scalar(value.into())
    }

    /// Build a container from `(name, node)` pairs
    pub fn container<K, I>(items: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DataNode)>,
    {
        DataNode::Container(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), Arc::new(v)))
                .collect(),
        )
    }

    /// Build a list from `(key value, entry)` pairs
    pub fn list<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DataNode)>,
    {
        DataNode::List(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Arc::new(v)))
                .collect(),
        )
    }

    pub fn leaf_list<V, I>(values: I) -> Self
    where
        V: Into<ScalarValue>,
        I: IntoIterator<Item = V>,
    {
        DataNode::LeafList(values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataNode::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DataNode::Null => "null",
            DataNode::Scalar(_) => "scalar",
            DataNode::LeafList(_) => "leaf-list",
            DataNode::Container(_) => "container",
            DataNode::List(_) => "list",
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            DataNode::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Child map of a container or list
    pub fn children(&self) -> Option<&Children> {
        match self {
            DataNode::Container(c) | DataNode::List(c) => Some(c),
            _ => None,
        }
    }

    /// Named child of a container
    pub fn child(&self, name: &str) -> Option<&Arc<DataNode>> {
        match self {
            DataNode::Container(c) => c.get(name),
            _ => None,
        }
    }

    /// Entry of a list by key value
    pub fn entry(&self, key: &str) -> Option<&Arc<DataNode>> {
        match self {
            DataNode::List(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Structural JSON rendering
    pub fn to_json(&self) -> Value {
        match self {
            DataNode::Null => Value::Null,
            DataNode::Scalar(v) => v.to_json(),
            DataNode::LeafList(values) => Value::Array(values.iter().map(ScalarValue::to_json).collect()),
            DataNode::Container(children) => {
                let mut map = Map::new();
                for (name, child) in children {
                    map.insert(name.clone(), child.to_json());
                }
                Value::Object(map)
            }
            DataNode::List(entries) => Value::Array(entries.values().map(|e| e.to_json()).collect()),
        }
    }

    /// Total node count of this subtree, leaf-list members excluded
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .map(|c| c.values().map(|n| n.node_count()).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_json_shapes() {
        let node = DataNode::container([
            ("hostname", DataNode::scalar("sw1")),
            ("servers", DataNode::leaf_list(["10.0.0.1", "10.0.0.2"])),
            (
                "interface",
                DataNode::list([(
                    "eth0",
                    DataNode::container([
                        ("name", DataNode::scalar("eth0")),
                        ("mtu", DataNode::scalar(1500u64)),
                    ]),
                )]),
            ),
        ]);

        assert_eq!(
            node.to_json(),
            json!({
                "hostname": "sw1",
                "servers": ["10.0.0.1", "10.0.0.2"],
                "interface": [{"name": "eth0", "mtu": 1500}]
            })
        );
    }

    #[test]
    fn test_canonical_forms() {
        assert_eq!(ScalarValue::Bool(true).canonical(), "true");
        assert_eq!(ScalarValue::Int(-3).canonical(), "-3");
        assert_eq!(ScalarValue::from("x").to_string(), "x");
        assert!(ScalarValue::Empty.truthy());
        assert!(!ScalarValue::Uint(0).truthy());
    }

    #[test]
    fn test_child_and_entry_lookups() {
        let list = DataNode::list([("a", DataNode::empty_container())]);
        assert!(list.entry("a").is_some());
        assert!(list.child("a").is_none());
        assert_eq!(list.node_count(), 2);
        assert_eq!(DataNode::Null.kind_name(), "null");
    }
}
