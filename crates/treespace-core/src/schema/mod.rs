//! Composed, immutable schema
//!
//! A `Schema` is produced once by [`compose`] and then shared read-only by
//! every query and mutation against its treespace. Renderers walk it through
//! [`Schema::nodes`] or [`Schema::walk`], which yield nodes depth-first with
//! parents before children.

pub mod compose;
pub mod module;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::data::{Children, DataNode, ScalarValue};
use crate::errors::{Result, TreespaceError};
use crate::path::{DataPath, PathSegment};

pub use compose::compose;
pub use module::{
    ModuleCatalog, ModuleDefinition, ModuleDescriptor, NodeKind, SchemaNodeDef, TypedefDef,
};

/// Builtin leaf types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    String,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Empty,
}

impl BuiltinType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => BuiltinType::String,
            "boolean" => BuiltinType::Boolean,
            "int8" => BuiltinType::Int8,
            "int16" => BuiltinType::Int16,
            "int32" => BuiltinType::Int32,
            "int64" => BuiltinType::Int64,
            "uint8" => BuiltinType::Uint8,
            "uint16" => BuiltinType::Uint16,
            "uint32" => BuiltinType::Uint32,
            "uint64" => BuiltinType::Uint64,
            "empty" => BuiltinType::Empty,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinType::String => "string",
            BuiltinType::Boolean => "boolean",
            BuiltinType::Int8 => "int8",
            BuiltinType::Int16 => "int16",
            BuiltinType::Int32 => "int32",
            BuiltinType::Int64 => "int64",
            BuiltinType::Uint8 => "uint8",
            BuiltinType::Uint16 => "uint16",
            BuiltinType::Uint32 => "uint32",
            BuiltinType::Uint64 => "uint64",
            BuiltinType::Empty => "empty",
        }
    }

    fn signed_range(&self) -> Option<(i64, i64)> {
        match self {
            BuiltinType::Int8 => Some((i8::MIN.into(), i8::MAX.into())),
            BuiltinType::Int16 => Some((i16::MIN.into(), i16::MAX.into())),
            BuiltinType::Int32 => Some((i32::MIN.into(), i32::MAX.into())),
            BuiltinType::Int64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    fn unsigned_max(&self) -> Option<u64> {
        match self {
            BuiltinType::Uint8 => Some(u8::MAX.into()),
            BuiltinType::Uint16 => Some(u16::MAX.into()),
            BuiltinType::Uint32 => Some(u32::MAX.into()),
            BuiltinType::Uint64 => Some(u64::MAX),
            _ => None,
        }
    }

    /// Normalise a value to this type, or `None` if it does not fit
    ///
    /// Integers are accepted from either signedness as long as they are in
    /// range; the result always uses the variant matching the type.
    pub fn coerce(&self, value: &ScalarValue) -> Option<ScalarValue> {
        if let Some((min, max)) = self.signed_range() {
            let v = match value {
                ScalarValue::Int(i) => *i,
                ScalarValue::Uint(u) => i64::try_from(*u).ok()?,
                _ => return None,
            };
            return (min..=max).contains(&v).then_some(ScalarValue::Int(v));
        }
        if let Some(max) = self.unsigned_max() {
            let v = match value {
                ScalarValue::Uint(u) => *u,
                ScalarValue::Int(i) => u64::try_from(*i).ok()?,
                _ => return None,
            };
            return (v <= max).then_some(ScalarValue::Uint(v));
        }
        match (self, value) {
            (BuiltinType::String, ScalarValue::String(_))
            | (BuiltinType::Boolean, ScalarValue::Bool(_))
            | (BuiltinType::Empty, ScalarValue::Empty) => Some(value.clone()),
            _ => None,
        }
    }

    /// Parse the canonical string form, as found in list keys
    pub fn parse(&self, text: &str) -> Option<ScalarValue> {
        let raw = match self {
            BuiltinType::String => ScalarValue::String(text.to_string()),
            BuiltinType::Boolean => match text {
                "true" => ScalarValue::Bool(true),
                "false" => ScalarValue::Bool(false),
                _ => return None,
            },
            BuiltinType::Empty if text.is_empty() => ScalarValue::Empty,
            BuiltinType::Empty => return None,
            _ if self.signed_range().is_some() => ScalarValue::Int(text.parse().ok()?),
            _ => ScalarValue::Uint(text.parse().ok()?),
        };
        self.coerce(&raw)
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved type of a leaf; `name` is the typedef name when one was used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafType {
    pub name: String,
    pub base: BuiltinType,
}

/// A composed schema node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNode {
    pub name: String,
    pub kind: NodeKind,
    pub leaf_type: Option<LeafType>,
    pub key: Option<String>,
    pub description: Option<String>,
    /// Module that first defined this node
    pub module: String,
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    fn root() -> Self {
        Self {
            name: String::new(),
            kind: NodeKind::Container,
            leaf_type: None,
            key: None,
            description: None,
            module: String::new(),
            children: Vec::new(),
        }
    }

    /// Direct schema child, choices included
    pub fn child(&self, name: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Child as it appears in data, looking through choices
    pub fn data_child(&self, name: &str) -> Option<&SchemaNode> {
        for child in &self.children {
            if child.kind == NodeKind::Choice {
                if let Some(found) = child.data_child(name) {
                    return Some(found);
                }
            } else if child.name == name {
                return Some(child);
            }
        }
        None
    }

    /// Key leaf of a list node
    pub fn key_leaf(&self) -> Option<&SchemaNode> {
        let key = self.key.as_deref()?;
        self.data_child(key).filter(|c| c.kind == NodeKind::Leaf)
    }

    /// Type identity used for serializer binding: the leaf type name, or
    /// the node kind for interior nodes
    pub fn type_identity(&self) -> &str {
        match &self.leaf_type {
            Some(t) => &t.name,
            None => self.kind.as_str(),
        }
    }

    fn present_in(&self, data: &Children) -> bool {
        match self.kind {
            NodeKind::Choice => self.children.iter().any(|c| c.present_in(data)),
            _ => data.contains_key(&self.name),
        }
    }
}

/// Depth-first pre-order iterator over `(schema path, node)`
pub struct SchemaNodes<'a> {
    stack: Vec<(String, &'a SchemaNode)>,
}

impl<'a> Iterator for SchemaNodes<'a> {
    type Item = (String, &'a SchemaNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push((format!("{}/{}", path, child.name), child));
        }
        Some((path, node))
    }
}

/// The composed schema of one treespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    root: SchemaNode,
    modules: Vec<ModuleDescriptor>,
}

impl Schema {
    pub(crate) fn new(root: SchemaNode, modules: Vec<ModuleDescriptor>) -> Self {
        Self { root, modules }
    }

    /// A schema with no modules, accepting only an empty root
    pub fn empty() -> Self {
        Self::new(SchemaNode::root(), Vec::new())
    }

    /// Unnamed root container; its children are the top-level nodes
    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Resolved modules, in composition order
    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Every schema node, depth-first, parent before children
    pub fn nodes(&self) -> SchemaNodes<'_> {
        SchemaNodes {
            stack: self
                .root
                .children
                .iter()
                .rev()
                .map(|c| (format!("/{}", c.name), c))
                .collect(),
        }
    }

    /// Invoke `visit` once per schema node in [`Schema::nodes`] order
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &SchemaNode),
    {
        for (path, node) in self.nodes() {
            visit(&path, node);
        }
    }

    /// Schema node addressed by a data path
    ///
    /// # Errors
    ///
    /// `InvalidPath` when a step names no data child, a key is applied to a
    /// non-list, a key names the wrong leaf, or a whole list is stepped
    /// through without selecting an entry.
    pub fn lookup(&self, path: &DataPath) -> Result<&SchemaNode> {
        let mut node = &self.root;
        let last = path.len().saturating_sub(1);
        for (i, segment) in path.segments().iter().enumerate() {
            let child = node.data_child(&segment.name).ok_or_else(|| TreespaceError::InvalidPath {
                path: path.to_string(),
                reason: format!("no schema node '{}'", segment.name),
            })?;
            self.check_segment(path, child, segment, i == last)?;
            node = child;
        }
        Ok(node)
    }

    /// Validate a path and rewrite its list keys into canonical form
    pub fn normalize(&self, path: &DataPath) -> Result<DataPath> {
        let mut node = &self.root;
        let mut segments = Vec::with_capacity(path.len());
        let last = path.len().saturating_sub(1);
        for (i, segment) in path.segments().iter().enumerate() {
            let child = node.data_child(&segment.name).ok_or_else(|| TreespaceError::InvalidPath {
                path: path.to_string(),
                reason: format!("no schema node '{}'", segment.name),
            })?;
            self.check_segment(path, child, segment, i == last)?;
            let mut segment = segment.clone();
            if let Some(key) = segment.key.as_mut() {
                key.value = self.key_value(child, &key.value)?.canonical();
            }
            segments.push(segment);
            node = child;
        }
        Ok(DataPath::from_segments(segments))
    }

    fn check_segment(
        &self,
        path: &DataPath,
        node: &SchemaNode,
        segment: &PathSegment,
        is_last: bool,
    ) -> Result<()> {
        let invalid = |reason: String| TreespaceError::InvalidPath {
            path: path.to_string(),
            reason,
        };
        match (&segment.key, node.kind) {
            (Some(key), NodeKind::List) => {
                if node.key.as_deref() != Some(key.leaf.as_str()) {
                    return Err(invalid(format!(
                        "list '{}' is keyed by '{}', not '{}'",
                        node.name,
                        node.key.as_deref().unwrap_or(""),
                        key.leaf
                    )));
                }
                Ok(())
            }
            (Some(_), kind) => Err(invalid(format!("'{}' is a {}, not a list", node.name, kind))),
            (None, NodeKind::List) if !is_last => {
                Err(invalid(format!("list '{}' needs an entry key", node.name)))
            }
            (None, _) => Ok(()),
        }
    }

    /// Typed value of a list key given in a path
    pub fn key_value(&self, list: &SchemaNode, text: &str) -> Result<ScalarValue> {
        let leaf = list.key_leaf().ok_or_else(|| TreespaceError::Internal {
            message: format!("list '{}' has no key leaf", list.name),
        })?;
        let ty = leaf.leaf_type.as_ref().ok_or_else(|| TreespaceError::Internal {
            message: format!("key leaf '{}' has no type", leaf.name),
        })?;
        ty.base.parse(text).ok_or_else(|| TreespaceError::SchemaViolation {
            path: format!("{}[{}]", list.name, leaf.name),
            reason: format!("'{}' is not a valid {}", text, ty.name),
        })
    }

    /// Check a proposed subtree against the schema node at `path`
    ///
    /// Returns the normalised subtree: scalars coerced to their declared
    /// type, list entries completed with their key leaf.
    ///
    /// # Errors
    ///
    /// `InvalidPath` if `path` does not address a schema node and
    /// `SchemaViolation` for any shape, type, key or choice mismatch.
    pub fn validate(&self, path: &DataPath, node: &DataNode) -> Result<DataNode> {
        let schema_node = self.lookup(path)?;
        match path.last().and_then(|s| s.key.as_ref()) {
            Some(key) => {
                let value = self.key_value(schema_node, &key.value)?;
                self.conform_entry(&path.to_string(), schema_node, &key.value, value, node)
            }
            None => self.conform(&path.to_string(), schema_node, node),
        }
    }

    /// Reject data carrying members of more than one case of a choice
    pub fn check_choices(&self, at: &str, schema_node: &SchemaNode, data: &Children) -> Result<()> {
        for child in &schema_node.children {
            if child.kind != NodeKind::Choice {
                continue;
            }
            let present: Vec<&str> = child
                .children
                .iter()
                .filter(|case| case.present_in(data))
                .map(|case| case.name.as_str())
                .collect();
            if present.len() > 1 {
                return Err(TreespaceError::SchemaViolation {
                    path: at.to_string(),
                    reason: format!(
                        "choice '{}' has more than one case present: {}",
                        child.name,
                        present.join(", ")
                    ),
                });
            }
            self.check_choices(at, child, data)?;
        }
        Ok(())
    }

    fn conform(&self, at: &str, schema_node: &SchemaNode, node: &DataNode) -> Result<DataNode> {
        let violation = |reason: String| TreespaceError::SchemaViolation {
            path: at.to_string(),
            reason,
        };
        match (schema_node.kind, node) {
            (NodeKind::Leaf, DataNode::Scalar(value)) => {
                Ok(DataNode::Scalar(self.coerce_scalar(at, schema_node, value)?))
            }
            (NodeKind::LeafList, DataNode::LeafList(values)) => {
                let coerced = values
                    .iter()
                    .map(|v| self.coerce_scalar(at, schema_node, v))
                    .collect::<Result<Vec<_>>>()?;
                Ok(DataNode::LeafList(coerced))
            }
            (NodeKind::Container, DataNode::Container(children)) => {
                Ok(DataNode::Container(self.conform_children(at, schema_node, children)?))
            }
            (NodeKind::List, DataNode::List(entries)) => {
                let mut out = Children::new();
                for (key_text, entry) in entries {
                    let value = self.key_value(schema_node, key_text)?;
                    // typed keys normalise their text, e.g. "007" -> "7"
                    let canonical = value.canonical();
                    if out.contains_key(&canonical) {
                        return Err(violation(format!(
                            "entry key '{}' duplicates key '{}'",
                            key_text, canonical
                        )));
                    }
                    let entry_at = format!("{}[{}]", at, key_text);
                    let conformed =
                        self.conform_entry(&entry_at, schema_node, key_text, value, entry)?;
                    out.insert(canonical, Arc::new(conformed));
                }
                Ok(DataNode::List(out))
            }
            (kind, other) => Err(violation(format!(
                "expected {} data, found {}",
                kind,
                other.kind_name()
            ))),
        }
    }

    fn conform_entry(
        &self,
        at: &str,
        list: &SchemaNode,
        key_text: &str,
        key_value: ScalarValue,
        entry: &DataNode,
    ) -> Result<DataNode> {
        let DataNode::Container(children) = entry else {
            return Err(TreespaceError::SchemaViolation {
                path: at.to_string(),
                reason: format!("list entry must be a container, found {}", entry.kind_name()),
            });
        };
        let key_leaf = list.key.clone().unwrap_or_default();
        let mut children = children.clone();
        match children.get(&key_leaf).map(|n| n.as_ref()) {
            None => {
                children.insert(key_leaf, Arc::new(DataNode::Scalar(key_value)));
            }
            Some(DataNode::Scalar(existing)) => {
                let matches = list
                    .key_leaf()
                    .and_then(|l| l.leaf_type.as_ref())
                    .and_then(|t| t.base.coerce(existing))
                    .is_some_and(|v| v == key_value);
                if !matches {
                    return Err(TreespaceError::SchemaViolation {
                        path: at.to_string(),
                        reason: format!(
                            "key leaf '{}' is '{}' but the entry key is '{}'",
                            key_leaf, existing, key_text
                        ),
                    });
                }
            }
            Some(other) => {
                return Err(TreespaceError::SchemaViolation {
                    path: at.to_string(),
                    reason: format!("key leaf '{}' holds {}", key_leaf, other.kind_name()),
                })
            }
        }
        Ok(DataNode::Container(self.conform_children(at, list, &children)?))
    }

    fn conform_children(&self, at: &str, schema_node: &SchemaNode, children: &Children) -> Result<Children> {
        let mut out = BTreeMap::new();
        for (name, child) in children {
            let child_at = format!("{}/{}", at.trim_end_matches('/'), name);
            let child_schema = schema_node.data_child(name).ok_or_else(|| {
                TreespaceError::SchemaViolation {
                    path: child_at.clone(),
                    reason: format!("no schema node '{}'", name),
                }
            })?;
            if child.is_null() {
                continue;
            }
            out.insert(name.clone(), Arc::new(self.conform(&child_at, child_schema, child)?));
        }
        self.check_choices(at, schema_node, &out)?;
        Ok(out)
    }

    fn coerce_scalar(&self, at: &str, schema_node: &SchemaNode, value: &ScalarValue) -> Result<ScalarValue> {
        let ty = schema_node.leaf_type.as_ref().ok_or_else(|| TreespaceError::Internal {
            message: format!("leaf '{}' has no type", schema_node.name),
        })?;
        ty.base.coerce(value).ok_or_else(|| TreespaceError::SchemaViolation {
            path: at.to_string(),
            reason: format!("value '{}' is not a valid {}", value, ty.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        let catalog = ModuleCatalog::new().with_module(
            ModuleDefinition::new(
                "net",
                Some("1.0"),
                vec![SchemaNodeDef::container(
                    "interfaces",
                    vec![SchemaNodeDef::list(
                        "interface",
                        "name",
                        vec![
                            SchemaNodeDef::leaf("name", "string"),
                            SchemaNodeDef::leaf("mtu", "uint16"),
                            SchemaNodeDef::choice(
                                "addressing",
                                vec![
                                    SchemaNodeDef::leaf("dhcp", "empty"),
                                    SchemaNodeDef::leaf("static-ip", "ip-address"),
                                ],
                            ),
                        ],
                    )],
                )],
            )
            .with_typedef("ip-address", "string"),
        );
        compose(&[ModuleDescriptor::new("net")], &catalog).unwrap()
    }

    fn eth0() -> DataPath {
        DataPath::root()
            .child("interfaces")
            .entry("interface", "name", "eth0")
    }

    #[test]
    fn test_builtin_coerce_ranges() {
        assert_eq!(BuiltinType::Uint8.coerce(&ScalarValue::Int(255)), Some(ScalarValue::Uint(255)));
        assert_eq!(BuiltinType::Uint8.coerce(&ScalarValue::Int(256)), None);
        assert_eq!(BuiltinType::Int8.coerce(&ScalarValue::Int(-129)), None);
        assert_eq!(BuiltinType::Uint16.parse("007"), Some(ScalarValue::Uint(7)));
        assert_eq!(BuiltinType::Boolean.parse("yes"), None);
        assert_eq!(BuiltinType::Empty.parse(""), Some(ScalarValue::Empty));
    }

    #[test]
    fn test_nodes_are_pre_order() {
        let schema = sample();
        let paths: Vec<String> = schema.nodes().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec![
                "/interfaces",
                "/interfaces/interface",
                "/interfaces/interface/name",
                "/interfaces/interface/mtu",
                "/interfaces/interface/addressing",
                "/interfaces/interface/addressing/dhcp",
                "/interfaces/interface/addressing/static-ip",
            ]
        );
    }

    #[test]
    fn test_lookup_sees_through_choice() {
        let schema = sample();
        let node = schema.lookup(&eth0().child("dhcp")).unwrap();
        assert_eq!(node.kind, NodeKind::Leaf);
        assert_eq!(
            schema.lookup(&eth0().child("static-ip")).unwrap().type_identity(),
            "ip-address"
        );
    }

    #[test]
    fn test_lookup_rejects_unkeyed_traversal_of_list() {
        let schema = sample();
        let bad = DataPath::root().child("interfaces").child("interface").child("mtu");
        assert!(matches!(schema.lookup(&bad), Err(TreespaceError::InvalidPath { .. })));
    }

    #[test]
    fn test_validate_fills_key_leaf_and_coerces() {
        let schema = sample();
        let entry = DataNode::container([("mtu", DataNode::scalar(1500i64))]);
        let conformed = schema.validate(&eth0(), &entry).unwrap();
        assert_eq!(
            conformed,
            DataNode::container([
                ("mtu", DataNode::scalar(1500u64)),
                ("name", DataNode::scalar("eth0")),
            ])
        );
    }

    #[test]
    fn test_validate_rejects_key_mismatch() {
        let schema = sample();
        let entry = DataNode::container([("name", DataNode::scalar("eth1"))]);
        assert!(matches!(
            schema.validate(&eth0(), &entry),
            Err(TreespaceError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_two_choice_cases() {
        let schema = sample();
        let entry = DataNode::container([
            ("dhcp", DataNode::Scalar(ScalarValue::Empty)),
            ("static-ip", DataNode::scalar("10.0.0.1")),
        ]);
        let err = schema.validate(&eth0(), &entry).unwrap_err();
        assert!(err.to_string().contains("addressing"));
    }

    #[test]
    fn test_validate_rejects_keys_equal_after_normalisation() {
        let catalog = ModuleCatalog::new().with_module(ModuleDefinition::new(
            "vlans",
            None,
            vec![SchemaNodeDef::list(
                "vlan",
                "id",
                vec![
                    SchemaNodeDef::leaf("id", "uint16"),
                    SchemaNodeDef::leaf("label", "string"),
                ],
            )],
        ));
        let schema = compose(&[ModuleDescriptor::new("vlans")], &catalog).unwrap();
        let vlans = DataNode::list([
            ("007", DataNode::container([("label", DataNode::scalar("bond"))])),
            ("7", DataNode::container([("label", DataNode::scalar("lab"))])),
        ]);

        let err = schema
            .validate(&DataPath::root().child("vlan"), &vlans)
            .unwrap_err();
        let TreespaceError::SchemaViolation { reason, .. } = err else {
            panic!("expected a schema violation, got {:?}", err);
        };
        assert!(reason.contains("duplicates key '7'"), "{}", reason);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let schema = sample();
        let err = schema
            .validate(&eth0().child("mtu"), &DataNode::scalar(70000u64))
            .unwrap_err();
        assert!(matches!(err, TreespaceError::SchemaViolation { .. }));
    }
}
