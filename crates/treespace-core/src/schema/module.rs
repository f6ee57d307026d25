//! Module sources for schema composition
//!
//! A module is a named, optionally revisioned bundle of schema node
//! definitions. Definitions are plain serde structs so they can be loaded
//! from JSON or TOML files found on the module search paths.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TreespaceError};

/// Reference to a module by name and optional revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    #[serde(default)]
    pub revision: Option<String>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: None,
        }
    }

    pub fn with_revision(name: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: Some(revision.into()),
        }
    }

    /// Parse the `name` or `name@revision` shorthand
    pub fn parse(spec: &str) -> Self {
        match spec.split_once('@') {
            Some((name, rev)) if !rev.is_empty() => Self::with_revision(name, rev),
            Some((name, _)) => Self::new(name),
            None => Self::new(spec),
        }
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}@{}", self.name, rev),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Structural kind of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    Choice,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Container => "container",
            NodeKind::List => "list",
            NodeKind::Leaf => "leaf",
            NodeKind::LeafList => "leaf-list",
            NodeKind::Choice => "choice",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named alias for a builtin leaf type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedefDef {
    pub name: String,
    pub base: String,
}

/// Uncomposed schema node as written in a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNodeDef {
    pub name: String,
    pub kind: NodeKind,
    /// Leaf / leaf-list type: a builtin name or a typedef
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    /// Key leaf name for lists
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub children: Vec<SchemaNodeDef>,
}

impl SchemaNodeDef {
    fn bare(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            type_name: None,
            key: None,
            description: None,
            children: Vec::new(),
        }
    }

    pub fn container(name: impl Into<String>, children: Vec<SchemaNodeDef>) -> Self {
        Self {
            children,
            ..Self::bare(name, NodeKind::Container)
        }
    }

    pub fn list(name: impl Into<String>, key: impl Into<String>, children: Vec<SchemaNodeDef>) -> Self {
        Self {
            key: Some(key.into()),
            children,
            ..Self::bare(name, NodeKind::List)
        }
    }

    pub fn leaf(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::bare(name, NodeKind::Leaf)
        }
    }

    pub fn leaf_list(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::bare(name, NodeKind::LeafList)
        }
    }

    /// A choice whose direct children are mutually exclusive alternatives
    pub fn choice(name: impl Into<String>, alternatives: Vec<SchemaNodeDef>) -> Self {
        Self {
            children: alternatives,
            ..Self::bare(name, NodeKind::Choice)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A complete module source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub typedefs: Vec<TypedefDef>,
    #[serde(default)]
    pub nodes: Vec<SchemaNodeDef>,
}

impl ModuleDefinition {
    pub fn new(name: impl Into<String>, revision: Option<&str>, nodes: Vec<SchemaNodeDef>) -> Self {
        Self {
            name: name.into(),
            revision: revision.map(str::to_string),
            typedefs: Vec::new(),
            nodes,
        }
    }

    pub fn with_typedef(mut self, name: impl Into<String>, base: impl Into<String>) -> Self {
        self.typedefs.push(TypedefDef {
            name: name.into(),
            base: base.into(),
        });
        self
    }

    pub fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor {
            name: self.name.clone(),
            revision: self.revision.clone(),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TreespaceError::Serialization {
            message: format!("TOML module parse error: {}", e),
        })
    }
}

/// Available module definitions, keyed by name then revision
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    // revision "" stands for an unrevisioned module
    modules: BTreeMap<String, BTreeMap<String, ModuleDefinition>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, returning the one it replaced, if any
    pub fn insert(&mut self, module: ModuleDefinition) -> Option<ModuleDefinition> {
        let revision = module.revision.clone().unwrap_or_default();
        self.modules
            .entry(module.name.clone())
            .or_default()
            .insert(revision, module)
    }

    pub fn with_module(mut self, module: ModuleDefinition) -> Self {
        self.insert(module);
        self
    }

    /// Resolve a descriptor
    ///
    /// An explicit revision must match exactly; without one the greatest
    /// revision wins.
    pub fn resolve(&self, descriptor: &ModuleDescriptor) -> Option<&ModuleDefinition> {
        let revisions = self.modules.get(&descriptor.name)?;
        match &descriptor.revision {
            Some(rev) => revisions.get(rev),
            None => revisions.values().next_back(),
        }
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Load every `*.json` and `*.toml` module file in a directory
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be read and `Serialization` for
    /// a file that is not a valid module definition.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
        entries.sort_by_key(|e| e.path());
        for entry in entries {
            let path = entry.path();
            let module = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => ModuleDefinition::from_json_str(&fs::read_to_string(&path)?)?,
                Some("toml") => ModuleDefinition::from_toml_str(&fs::read_to_string(&path)?)?,
                _ => continue,
            };
            tracing::debug!(module = %module.descriptor(), file = %path.display(), "loaded module");
            self.insert(module);
            loaded += 1;
        }
        Ok(loaded)
    }
}
