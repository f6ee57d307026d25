//! Versioned data tree
//!
//! Updates never touch existing nodes. `with_set` and `with_removed` copy
//! the spine from the root down to the target and share everything else, so
//! any `Arc` handed out earlier keeps describing the tree it came from.

use std::sync::Arc;

use crate::data::node::{Children, DataNode};
use crate::errors::{Result, TreespaceError};
use crate::path::{DataPath, PathSegment};
use crate::schema::{Schema, SchemaNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTree {
    root: Arc<DataNode>,
    version: u64,
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTree {
    /// Empty tree at version 0
    pub fn new() -> Self {
        Self {
            root: Arc::new(DataNode::empty_container()),
            version: 0,
        }
    }

    pub fn from_root(root: DataNode) -> Self {
        Self {
            root: Arc::new(root),
            version: 0,
        }
    }

    pub fn root(&self) -> &Arc<DataNode> {
        &self.root
    }

    /// Immutable snapshot of the whole tree
    pub fn snapshot(&self) -> Arc<DataNode> {
        Arc::clone(&self.root)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Node at `path`, if present
    pub fn get(&self, path: &DataPath) -> Option<Arc<DataNode>> {
        lookup(&self.root, path)
    }

    /// New tree with `node` placed at `path`
    ///
    /// `path` must already be normalised against `schema` and `node`
    /// validated for it. Missing containers and list entries on the way are
    /// created; new entries receive their key leaf.
    pub fn with_set(&self, schema: &Schema, path: &DataPath, node: Arc<DataNode>) -> Result<DataTree> {
        let root = set_in(schema, Some(&self.root), schema.root(), path.segments(), node, path)?;
        Ok(Self {
            root,
            version: self.version + 1,
        })
    }

    /// New tree without the node at `path`
    ///
    /// Removing the root leaves an empty container.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing exists at `path`.
    pub fn with_removed(&self, path: &DataPath) -> Result<DataTree> {
        let root = if path.is_root() {
            Arc::new(DataNode::empty_container())
        } else {
            remove_in(&self.root, path.segments(), path)?
        };
        Ok(Self {
            root,
            version: self.version + 1,
        })
    }
}

/// Resolve a path below an arbitrary snapshot root
pub fn lookup(root: &Arc<DataNode>, path: &DataPath) -> Option<Arc<DataNode>> {
    let mut node = root;
    for segment in path.segments() {
        node = step(node, segment)?;
    }
    Some(Arc::clone(node))
}

fn step<'a>(node: &'a DataNode, segment: &PathSegment) -> Option<&'a Arc<DataNode>> {
    let child = node.child(&segment.name)?;
    match &segment.key {
        Some(key) => child.entry(&key.value),
        None => Some(child),
    }
}

fn set_in(
    schema: &Schema,
    current: Option<&Arc<DataNode>>,
    schema_node: &SchemaNode,
    segments: &[PathSegment],
    value: Arc<DataNode>,
    path: &DataPath,
) -> Result<Arc<DataNode>> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(value);
    };
    let mut children = container_children(current, path)?;
    let child_schema = schema_node
        .data_child(&segment.name)
        .ok_or_else(|| TreespaceError::InvalidPath {
            path: path.to_string(),
            reason: format!("no schema node '{}'", segment.name),
        })?;

    let new_child = match &segment.key {
        None => set_in(schema, children.get(&segment.name), child_schema, rest, value, path)?,
        Some(key) => {
            let mut entries = match children.get(&segment.name).map(Arc::as_ref) {
                Some(DataNode::List(entries)) => entries.clone(),
                Some(other) => {
                    return Err(TreespaceError::InvalidPath {
                        path: path.to_string(),
                        reason: format!("'{}' holds {}, not a list", segment.name, other.kind_name()),
                    })
                }
                None => Children::new(),
            };
            let entry = if rest.is_empty() {
                value
            } else {
                let base = match entries.get(&key.value) {
                    Some(existing) => Arc::clone(existing),
                    None => {
                        let key_value = schema.key_value(child_schema, &key.value)?;
                        Arc::new(DataNode::container([(key.leaf.clone(), DataNode::Scalar(key_value))]))
                    }
                };
                set_in(schema, Some(&base), child_schema, rest, value, path)?
            };
            entries.insert(key.value.clone(), entry);
            Arc::new(DataNode::List(entries))
        }
    };
    children.insert(segment.name.clone(), new_child);
    Ok(Arc::new(DataNode::Container(children)))
}

fn remove_in(current: &Arc<DataNode>, segments: &[PathSegment], path: &DataPath) -> Result<Arc<DataNode>> {
    let not_found = || TreespaceError::NotFound {
        path: path.to_string(),
    };
    let Some((segment, rest)) = segments.split_first() else {
        return Err(not_found());
    };
    let mut children = match current.as_ref() {
        DataNode::Container(children) => children.clone(),
        _ => return Err(not_found()),
    };
    let child = children.get(&segment.name).cloned().ok_or_else(not_found)?;

    match (&segment.key, rest.is_empty()) {
        (None, true) => {
            children.remove(&segment.name);
        }
        (None, false) => {
            children.insert(segment.name.clone(), remove_in(&child, rest, path)?);
        }
        (Some(key), last) => {
            let DataNode::List(entries) = child.as_ref() else {
                return Err(not_found());
            };
            let mut entries = entries.clone();
            let entry = entries.get(&key.value).cloned().ok_or_else(not_found)?;
            if last {
                entries.remove(&key.value);
            } else {
                entries.insert(key.value.clone(), remove_in(&entry, rest, path)?);
            }
            children.insert(segment.name.clone(), Arc::new(DataNode::List(entries)));
        }
    }
    Ok(Arc::new(DataNode::Container(children)))
}

fn container_children(current: Option<&Arc<DataNode>>, path: &DataPath) -> Result<Children> {
    match current.map(Arc::as_ref) {
        None | Some(DataNode::Null) => Ok(Children::new()),
        Some(DataNode::Container(children)) => Ok(children.clone()),
        Some(other) => Err(TreespaceError::InvalidPath {
            path: path.to_string(),
            reason: format!("cannot descend into {}", other.kind_name()),
        }),
    }
}
