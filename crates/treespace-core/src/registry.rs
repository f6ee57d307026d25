//! Process-wide set of named treespaces
//!
//! The registry is an explicitly constructed context object. It is filled
//! at startup (or module reload) and read by every request afterwards.
//! A treespace is fully built before the write lock is taken, so a reader
//! sees either nothing or the complete entry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::data::DataTree;
use crate::errors::{Result, TreespaceError};
use crate::hooks::HookRegistry;
use crate::schema::{compose, ModuleCatalog, Schema};
use crate::treespace::Treespace;
use crate::{log_op_end, log_op_error, log_op_start};

#[derive(Debug, Default)]
pub struct TreespaceRegistry {
    treespaces: RwLock<HashMap<String, Arc<Treespace>>>,
}

impl TreespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose and register every treespace in `config`
    ///
    /// Each starts with an empty data tree and no hooks.
    ///
    /// # Errors
    ///
    /// The first composition or registration failure.
    pub fn bootstrap(config: &EngineConfig, catalog: &ModuleCatalog) -> Result<Self> {
        let start = Instant::now();
        log_op_start!("bootstrap", treespace_count = config.treespaces.len());

        let result = Self::bootstrap_inner(config, catalog);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(registry) => {
                log_op_end!("bootstrap", duration_ms = duration_ms, registered = registry.len());
            }
            Err(err) => {
                log_op_error!("bootstrap", err, duration_ms = duration_ms);
            }
        }
        result
    }

    fn bootstrap_inner(config: &EngineConfig, catalog: &ModuleCatalog) -> Result<Self> {
        config.validate()?;
        let registry = Self::new();
        for treespace in &config.treespaces {
            let schema = compose(&treespace.modules, catalog)?;
            registry.register(&treespace.name, Arc::new(schema), DataTree::new(), HookRegistry::new())?;
        }
        Ok(registry)
    }

    /// Publish a new treespace under `name`
    ///
    /// # Errors
    ///
    /// `TreespaceAlreadyRegistered` if the name is taken, or
    /// `SchemaViolation` if `data` does not fit `schema`.
    pub fn register(
        &self,
        name: &str,
        schema: Arc<Schema>,
        data: DataTree,
        hooks: HookRegistry,
    ) -> Result<Arc<Treespace>> {
        let start = Instant::now();
        log_op_start!("register_treespace", treespace = name);

        let result = self.register_inner(name, schema, data, hooks);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("register_treespace", duration_ms = duration_ms, treespace = name);
            }
            Err(err) => {
                log_op_error!("register_treespace", err, duration_ms = duration_ms, treespace = name);
            }
        }
        result
    }

    fn register_inner(
        &self,
        name: &str,
        schema: Arc<Schema>,
        data: DataTree,
        hooks: HookRegistry,
    ) -> Result<Arc<Treespace>> {
        let already = || TreespaceError::TreespaceAlreadyRegistered {
            name: name.to_string(),
        };
        if self.contains(name) {
            return Err(already());
        }
        let treespace = Arc::new(Treespace::new(name, schema, data, hooks)?);

        let mut treespaces = self.treespaces.write().unwrap_or_else(PoisonError::into_inner);
        // a concurrent register may have won while we were building
        if treespaces.contains_key(name) {
            return Err(already());
        }
        treespaces.insert(name.to_string(), Arc::clone(&treespace));
        Ok(treespace)
    }

    /// # Errors
    ///
    /// `TreespaceNotFound` when nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<Treespace>> {
        self.treespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| {
                tracing::debug!(treespace = name, "treespace lookup missed");
                TreespaceError::TreespaceNotFound {
                    name: name.to_string(),
                }
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.treespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .treespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.treespaces.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreespaceConfig;
    use crate::data::DataNode;
    use crate::schema::{ModuleDefinition, ModuleDescriptor, SchemaNodeDef};

    fn catalog() -> ModuleCatalog {
        ModuleCatalog::new().with_module(ModuleDefinition::new(
            "core",
            Some("1.0"),
            vec![SchemaNodeDef::container(
                "system",
                vec![SchemaNodeDef::leaf("hostname", "string")],
            )],
        ))
    }

    #[test]
    fn test_register_then_get() {
        let registry = TreespaceRegistry::new();
        let schema = Arc::new(compose(&[ModuleDescriptor::new("core")], &catalog()).unwrap());
        registry
            .register("controller", schema, DataTree::new(), HookRegistry::new())
            .unwrap();

        assert_eq!(registry.get("controller").unwrap().name(), "controller");
        assert_eq!(
            registry.get("missing").unwrap_err(),
            TreespaceError::TreespaceNotFound {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = TreespaceRegistry::new();
        let schema = Arc::new(Schema::empty());
        registry
            .register("t", Arc::clone(&schema), DataTree::new(), HookRegistry::new())
            .unwrap();
        let first = registry.get("t").unwrap();

        let err = registry
            .register("t", schema, DataTree::new(), HookRegistry::new())
            .unwrap_err();
        assert!(matches!(err, TreespaceError::TreespaceAlreadyRegistered { .. }));
        assert!(Arc::ptr_eq(&first, &registry.get("t").unwrap()));
    }

    #[test]
    fn test_initial_data_validated() {
        let registry = TreespaceRegistry::new();
        let schema = Arc::new(compose(&[ModuleDescriptor::new("core")], &catalog()).unwrap());
        let bogus = DataTree::from_root(DataNode::container([("nosuch", DataNode::scalar(1i64))]));

        assert!(registry
            .register("t", schema, bogus, HookRegistry::new())
            .is_err());
        assert!(!registry.contains("t"));
    }

    #[test]
    fn test_bootstrap_from_config() {
        let config = EngineConfig {
            treespaces: vec![
                TreespaceConfig::new("controller", vec![ModuleDescriptor::parse("core@1.0")]),
                TreespaceConfig::new("empty", vec![]),
            ],
            ..EngineConfig::default()
        };
        let registry = TreespaceRegistry::bootstrap(&config, &catalog()).unwrap();
        assert_eq!(registry.names(), vec!["controller", "empty"]);

        let broken = EngineConfig {
            treespaces: vec![TreespaceConfig::new("x", vec![ModuleDescriptor::parse("core@9")])],
            ..EngineConfig::default()
        };
        assert!(matches!(
            TreespaceRegistry::bootstrap(&broken, &catalog()),
            Err(TreespaceError::SchemaComposition { .. })
        ));
    }
}
