//! Engine configuration
//!
//! ```toml
//! module_paths = ["/etc/treespace/modules"]
//!
//! [logging]
//! profile = "production"
//!
//! [[treespace]]
//! name = "controller"
//! modules = ["core@1.0", { name = "interfaces" }]
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Result, TreespaceError};
use crate::logging_facility::{self, Profile};
use crate::schema::{ModuleCatalog, ModuleDescriptor};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub profile: Profile,
}

impl LoggingConfig {
    /// Install the process-wide subscriber for the configured profile
    pub fn init(&self) {
        logging_facility::init(self.profile);
    }
}

/// Module reference as written in config: `"name@rev"` or a table
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ModuleEntry {
    Shorthand(String),
    Table(ModuleDescriptor),
}

impl From<ModuleEntry> for ModuleDescriptor {
    fn from(entry: ModuleEntry) -> Self {
        match entry {
            ModuleEntry::Shorthand(spec) => ModuleDescriptor::parse(&spec),
            ModuleEntry::Table(descriptor) => descriptor,
        }
    }
}

fn deserialize_modules<'de, D>(deserializer: D) -> std::result::Result<Vec<ModuleDescriptor>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries = Vec::<ModuleEntry>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(ModuleDescriptor::from).collect())
}

/// One treespace to compose at startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreespaceConfig {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_modules")]
    pub modules: Vec<ModuleDescriptor>,
}

impl TreespaceConfig {
    pub fn new(name: impl Into<String>, modules: Vec<ModuleDescriptor>) -> Self {
        Self {
            name: name.into(),
            modules,
        }
    }

    /// # Errors
    ///
    /// `InvalidConfig` for a malformed treespace name or an unnamed module.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(TreespaceError::InvalidConfig {
                reason: format!(
                    "treespace name '{}' must match [A-Za-z_][A-Za-z0-9_\\-.]*",
                    self.name
                ),
            });
        }
        if let Some(i) = self.modules.iter().position(|m| m.name.trim().is_empty()) {
            return Err(TreespaceError::InvalidConfig {
                reason: format!("treespace '{}': module #{} has no name", self.name, i + 1),
            });
        }
        Ok(())
    }

    /// Append the modules of `other` not already listed
    pub fn merge(&mut self, other: &TreespaceConfig) {
        for module in &other.modules {
            if !self.modules.contains(module) {
                self.modules.push(module.clone());
            }
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Directories scanned for module definition files
    #[serde(default)]
    pub module_paths: Vec<PathBuf>,
    #[serde(default, rename = "treespace")]
    pub treespaces: Vec<TreespaceConfig>,
}

impl EngineConfig {
    /// Parse and validate
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for malformed TOML or a failed validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| TreespaceError::InvalidConfig {
            reason: format!("TOML parse error: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `Io` if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// # Errors
    ///
    /// `InvalidConfig` for duplicate treespace names or any invalid
    /// treespace entry.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for treespace in &self.treespaces {
            treespace.validate()?;
            if !seen.insert(treespace.name.as_str()) {
                return Err(TreespaceError::InvalidConfig {
                    reason: format!("treespace '{}' configured more than once", treespace.name),
                });
            }
        }
        Ok(())
    }

    /// Fold `other` into this config
    ///
    /// Treespaces with the same name merge their module lists; new names
    /// are appended. Module paths are appended. `other`'s logging wins.
    pub fn merge(&mut self, other: EngineConfig) {
        self.logging = other.logging;
        for path in other.module_paths {
            if !self.module_paths.contains(&path) {
                self.module_paths.push(path);
            }
        }
        for treespace in other.treespaces {
            match self.treespaces.iter_mut().find(|t| t.name == treespace.name) {
                Some(existing) => existing.merge(&treespace),
                None => self.treespaces.push(treespace),
            }
        }
    }

    /// Catalog of every module found on the configured module paths
    ///
    /// # Errors
    ///
    /// Any error from [`ModuleCatalog::load_dir`].
    pub fn catalog(&self) -> Result<ModuleCatalog> {
        let mut catalog = ModuleCatalog::new();
        for dir in &self.module_paths {
            let loaded = catalog.load_dir(dir)?;
            tracing::debug!(dir = %dir.display(), loaded, "module path scanned");
        }
        Ok(catalog)
    }
}
