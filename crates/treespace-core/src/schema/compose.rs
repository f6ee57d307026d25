//! Schema composition
//!
//! Modules are merged in descriptor order. Every problem found along the
//! way is collected so a caller sees all conflicts in one failure instead of
//! fixing them one at a time.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::errors::{CompositionConflict, Result, TreespaceError};
use crate::schema::module::{ModuleCatalog, ModuleDefinition, ModuleDescriptor, NodeKind, SchemaNodeDef};
use crate::schema::{BuiltinType, LeafType, Schema, SchemaNode};
use crate::{log_op_end, log_op_error, log_op_start};

/// Compose the named modules into a single schema
///
/// Overlapping containers, lists and choices merge their children; the
/// first module to define a node keeps its attributes.
///
/// # Errors
///
/// `SchemaComposition` carrying every detected conflict, in detection order.
pub fn compose(descriptors: &[ModuleDescriptor], catalog: &ModuleCatalog) -> Result<Schema> {
    let start = Instant::now();
    log_op_start!("compose", module_count = descriptors.len());

    let result = compose_inner(descriptors, catalog);
    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(schema) => {
            log_op_end!("compose", duration_ms = duration_ms, node_count = schema.nodes().count());
        }
        Err(err) => {
            log_op_error!("compose", err, duration_ms = duration_ms);
        }
    }
    result
}

fn compose_inner(descriptors: &[ModuleDescriptor], catalog: &ModuleCatalog) -> Result<Schema> {
    let mut conflicts = Vec::new();

    let mut seen = HashSet::new();
    let mut resolved: Vec<&ModuleDefinition> = Vec::new();
    for descriptor in descriptors {
        if !seen.insert(descriptor.name.as_str()) {
            conflicts.push(CompositionConflict::DuplicateModule {
                name: descriptor.name.clone(),
            });
            continue;
        }
        match catalog.resolve(descriptor) {
            Some(module) => resolved.push(module),
            None => conflicts.push(CompositionConflict::UnresolvedModule {
                name: descriptor.name.clone(),
                revision: descriptor.revision.clone(),
            }),
        }
    }

    let typedefs = collect_typedefs(&resolved, &mut conflicts);

    let mut root = SchemaNode::root();
    for module in &resolved {
        let mut merger = Merger {
            typedefs: &typedefs,
            module: &module.name,
            conflicts: &mut conflicts,
        };
        merger.merge_children(&mut root, "", &module.nodes);
    }
    check_data_names(&root, "", &mut conflicts);

    if !conflicts.is_empty() {
        return Err(TreespaceError::composition(conflicts));
    }
    Ok(Schema::new(
        root,
        resolved.iter().map(|m| m.descriptor()).collect(),
    ))
}

/// Typedef name -> (base, defining module)
type TypedefTable = HashMap<String, (BuiltinType, String)>;

fn collect_typedefs(modules: &[&ModuleDefinition], conflicts: &mut Vec<CompositionConflict>) -> TypedefTable {
    let mut table = TypedefTable::new();
    for module in modules {
        for typedef in &module.typedefs {
            let path = format!("typedef:{}", typedef.name);
            let Some(base) = BuiltinType::from_name(&typedef.base) else {
                conflicts.push(CompositionConflict::UnknownType {
                    path,
                    type_name: typedef.base.clone(),
                    module: module.name.clone(),
                });
                continue;
            };
            if BuiltinType::from_name(&typedef.name).is_some() {
                conflicts.push(CompositionConflict::ConflictingDefinition {
                    path,
                    existing_module: "builtin".to_string(),
                    module: module.name.clone(),
                    reason: "typedef shadows a builtin type".to_string(),
                });
                continue;
            }
            match table.get(&typedef.name) {
                Some((existing, owner)) if *existing != base => {
                    conflicts.push(CompositionConflict::ConflictingDefinition {
                        path,
                        existing_module: owner.clone(),
                        module: module.name.clone(),
                        reason: format!("base type '{}' differs from '{}'", base, existing),
                    });
                }
                Some(_) => {}
                None => {
                    table.insert(typedef.name.clone(), (base, module.name.clone()));
                }
            }
        }
    }
    table
}

/// Children of `node` as they appear in data, choices flattened
fn data_children<'a>(node: &'a SchemaNode, path: &str, out: &mut Vec<(String, &'a SchemaNode)>) {
    for child in &node.children {
        let child_path = format!("{}/{}", path, child.name);
        if child.kind == NodeKind::Choice {
            data_children(child, &child_path, out);
        } else {
            out.push((child_path, child));
        }
    }
}

/// Two data-visible nodes under one parent must not share a name
///
/// Choice members live in their parent's namespace, so a member and a
/// sibling of the choice, or members of two choices, can clash even
/// though their schema paths differ.
fn check_data_names(node: &SchemaNode, path: &str, conflicts: &mut Vec<CompositionConflict>) {
    let mut visible = Vec::new();
    data_children(node, path, &mut visible);

    let mut first: HashMap<&str, (&str, &SchemaNode)> = HashMap::new();
    for (child_path, child) in &visible {
        match first.get(child.name.as_str()) {
            Some((_, existing)) if existing.module == child.module => {
                conflicts.push(CompositionConflict::DuplicateNode {
                    path: child_path.clone(),
                    module: child.module.clone(),
                });
            }
            Some((existing_path, existing)) => {
                conflicts.push(CompositionConflict::ConflictingDefinition {
                    path: child_path.clone(),
                    existing_module: existing.module.clone(),
                    module: child.module.clone(),
                    reason: format!("data node '{}' is already defined at {}", child.name, existing_path),
                });
            }
            None => {
                first.insert(child.name.as_str(), (child_path.as_str(), child));
            }
        }
    }
    for (child_path, child) in &visible {
        check_data_names(child, child_path, conflicts);
    }
}

struct Merger<'a> {
    typedefs: &'a TypedefTable,
    module: &'a str,
    conflicts: &'a mut Vec<CompositionConflict>,
}

impl Merger<'_> {
    fn merge_children(&mut self, parent: &mut SchemaNode, parent_path: &str, defs: &[SchemaNodeDef]) {
        let mut seen = HashSet::new();
        for def in defs {
            let path = format!("{}/{}", parent_path, def.name);
            if !seen.insert(def.name.as_str()) {
                self.conflicts.push(CompositionConflict::DuplicateNode {
                    path,
                    module: self.module.to_string(),
                });
                continue;
            }
            match parent.children.iter_mut().find(|c| c.name == def.name) {
                Some(existing) => self.merge_into(existing, &path, def),
                None => {
                    if let Some(node) = self.build(&path, def) {
                        parent.children.push(node);
                    }
                }
            }
        }
    }

    fn build(&mut self, path: &str, def: &SchemaNodeDef) -> Option<SchemaNode> {
        let leaf_type = match def.kind {
            NodeKind::Leaf | NodeKind::LeafList => Some(self.resolve_type(path, def)?),
            _ => None,
        };
        let mut node = SchemaNode {
            name: def.name.clone(),
            kind: def.kind,
            leaf_type,
            key: def.key.clone(),
            description: def.description.clone(),
            module: self.module.to_string(),
            children: Vec::new(),
        };
        self.merge_children(&mut node, path, &def.children);
        if node.kind == NodeKind::List && node.key_leaf().is_none() {
            self.conflicts.push(CompositionConflict::MissingListKey {
                path: path.to_string(),
                key: def.key.clone().unwrap_or_default(),
                module: self.module.to_string(),
            });
        }
        Some(node)
    }

    fn merge_into(&mut self, existing: &mut SchemaNode, path: &str, def: &SchemaNodeDef) {
        if existing.kind != def.kind {
            self.conflict(path, existing, format!("{} redefined as {}", existing.kind, def.kind));
            return;
        }
        match def.kind {
            NodeKind::Leaf | NodeKind::LeafList => {
                let Some(ty) = self.resolve_type(path, def) else {
                    return;
                };
                if existing.leaf_type.as_ref().map(|t| t.name.as_str()) != Some(ty.name.as_str()) {
                    let before = existing.type_identity().to_string();
                    self.conflict(path, existing, format!("type '{}' differs from '{}'", ty.name, before));
                }
            }
            NodeKind::List => {
                if def.key.is_some() && def.key != existing.key {
                    let reason = format!(
                        "key '{}' differs from '{}'",
                        def.key.as_deref().unwrap_or(""),
                        existing.key.as_deref().unwrap_or("")
                    );
                    self.conflict(path, existing, reason);
                    return;
                }
                self.merge_children(existing, path, &def.children);
            }
            NodeKind::Container | NodeKind::Choice => {
                self.merge_children(existing, path, &def.children);
            }
        }
    }

    fn resolve_type(&mut self, path: &str, def: &SchemaNodeDef) -> Option<LeafType> {
        let name = def.type_name.as_deref().unwrap_or("");
        let base = BuiltinType::from_name(name).or_else(|| self.typedefs.get(name).map(|(b, _)| *b));
        match base {
            Some(base) => Some(LeafType {
                name: name.to_string(),
                base,
            }),
            None => {
                self.conflicts.push(CompositionConflict::UnknownType {
                    path: path.to_string(),
                    type_name: name.to_string(),
                    module: self.module.to_string(),
                });
                None
            }
        }
    }

    fn conflict(&mut self, path: &str, existing: &SchemaNode, reason: String) {
        self.conflicts.push(CompositionConflict::ConflictingDefinition {
            path: path.to_string(),
            existing_module: existing.module.clone(),
            module: self.module.to_string(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_module(name: &str, revision: Option<&str>, leaf_type: &str) -> ModuleDefinition {
        ModuleDefinition::new(
            name,
            revision,
            vec![SchemaNodeDef::container(
                "system",
                vec![SchemaNodeDef::leaf("hostname", leaf_type)],
            )],
        )
    }

    #[test]
    fn test_overlapping_containers_merge() {
        let catalog = ModuleCatalog::new()
            .with_module(system_module("core", Some("1.0"), "string"))
            .with_module(ModuleDefinition::new(
                "ext",
                None,
                vec![SchemaNodeDef::container(
                    "system",
                    vec![SchemaNodeDef::leaf("contact", "string")],
                )],
            ));

        let schema = compose(
            &[ModuleDescriptor::with_revision("core", "1.0"), ModuleDescriptor::new("ext")],
            &catalog,
        )
        .unwrap();

        let system = schema.root().child("system").unwrap();
        assert_eq!(system.module, "core");
        let names: Vec<&str> = system.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["hostname", "contact"]);
        assert_eq!(system.child("contact").unwrap().module, "ext");
        assert_eq!(schema.modules().len(), 2);
    }

    #[test]
    fn test_all_conflicts_reported() {
        let catalog = ModuleCatalog::new()
            .with_module(system_module("core", None, "string"))
            .with_module(system_module("other", None, "boolean"));

        let err = compose(
            &[
                ModuleDescriptor::new("core"),
                ModuleDescriptor::new("core"),
                ModuleDescriptor::with_revision("missing", "9"),
                ModuleDescriptor::new("other"),
            ],
            &catalog,
        )
        .unwrap_err();

        let TreespaceError::SchemaComposition { conflicts, .. } = err else {
            panic!("expected composition error");
        };
        assert_eq!(conflicts.len(), 3);
        assert!(matches!(conflicts[0], CompositionConflict::DuplicateModule { .. }));
        assert!(matches!(conflicts[1], CompositionConflict::UnresolvedModule { .. }));
        assert!(matches!(
            &conflicts[2],
            CompositionConflict::ConflictingDefinition { path, .. } if path == "/system/hostname"
        ));
    }

    #[test]
    fn test_unknown_type_and_missing_key() {
        let catalog = ModuleCatalog::new().with_module(ModuleDefinition::new(
            "bad",
            None,
            vec![
                SchemaNodeDef::leaf("speed", "float"),
                SchemaNodeDef::list("ports", "id", vec![SchemaNodeDef::leaf("label", "string")]),
                SchemaNodeDef::leaf("speed", "string"),
            ],
        ));

        let err = compose(&[ModuleDescriptor::new("bad")], &catalog).unwrap_err();
        let TreespaceError::SchemaComposition { conflicts, .. } = err else {
            panic!("expected composition error");
        };
        assert_eq!(
            conflicts,
            vec![
                CompositionConflict::UnknownType {
                    path: "/speed".to_string(),
                    type_name: "float".to_string(),
                    module: "bad".to_string(),
                },
                CompositionConflict::MissingListKey {
                    path: "/ports".to_string(),
                    key: "id".to_string(),
                    module: "bad".to_string(),
                },
                CompositionConflict::DuplicateNode {
                    path: "/speed".to_string(),
                    module: "bad".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_choice_member_clashing_with_sibling_in_one_module() {
        let catalog = ModuleCatalog::new().with_module(ModuleDefinition::new(
            "clock",
            None,
            vec![SchemaNodeDef::container(
                "system",
                vec![
                    SchemaNodeDef::leaf("server", "string"),
                    SchemaNodeDef::choice(
                        "src",
                        vec![SchemaNodeDef::choice("remote", vec![SchemaNodeDef::leaf("server", "uint8")])],
                    ),
                ],
            )],
        ));

        let err = compose(&[ModuleDescriptor::new("clock")], &catalog).unwrap_err();
        let TreespaceError::SchemaComposition { conflicts, .. } = err else {
            panic!("expected composition error");
        };
        assert_eq!(
            conflicts,
            vec![CompositionConflict::DuplicateNode {
                path: "/system/src/remote/server".to_string(),
                module: "clock".to_string(),
            }]
        );
    }

    #[test]
    fn test_typedef_keeps_identity() {
        let catalog = ModuleCatalog::new().with_module(
            system_module("core", None, "host-name").with_typedef("host-name", "string"),
        );
        let schema = compose(&[ModuleDescriptor::new("core")], &catalog).unwrap();
        let leaf = schema.root().child("system").unwrap().child("hostname").unwrap();
        let ty = leaf.leaf_type.as_ref().unwrap();
        assert_eq!(ty.name, "host-name");
        assert_eq!(ty.base, BuiltinType::String);
    }

    #[test]
    fn test_conflicting_typedefs() {
        let catalog = ModuleCatalog::new()
            .with_module(ModuleDefinition::new("a", None, vec![]).with_typedef("port", "uint16"))
            .with_module(ModuleDefinition::new("b", None, vec![]).with_typedef("port", "string"));
        let err = compose(
            &[ModuleDescriptor::new("a"), ModuleDescriptor::new("b")],
            &catalog,
        )
        .unwrap_err();
        assert!(err.details()[0].contains("typedef:port"));
    }
}
