use std::sync::{Arc, Mutex};

use treespace_core::{
    compose, DataPath, HookRegistry, ModuleCatalog, ModuleDefinition, ModuleDescriptor, MutationEvent,
    NotificationConsumer, Result, Schema, SchemaNodeDef, Treespace, TreespaceRegistry,
};
use treespace_core::DataTree;

/// `core@1.0`: a system container with a read-only and a writable area,
/// plus a keyed interface list
#[allow(dead_code)]
pub fn core_module() -> ModuleDefinition {
    ModuleDefinition::new(
        "core",
        Some("1.0"),
        vec![
            SchemaNodeDef::container(
                "system",
                vec![
                    SchemaNodeDef::leaf("hostname", "string"),
                    SchemaNodeDef::container("readonly", vec![SchemaNodeDef::leaf("flag", "boolean")]),
                    SchemaNodeDef::container("writable", vec![SchemaNodeDef::leaf("flag", "boolean")]),
                ],
            ),
            SchemaNodeDef::container(
                "interfaces",
                vec![SchemaNodeDef::list(
                    "interface",
                    "name",
                    vec![
                        SchemaNodeDef::leaf("name", "string"),
                        SchemaNodeDef::leaf("mtu", "uint16"),
                        SchemaNodeDef::leaf("enabled", "boolean"),
                        SchemaNodeDef::leaf("rx-packets", "counter64"),
                    ],
                )],
            ),
        ],
    )
    .with_typedef("counter64", "uint64")
}

#[allow(dead_code)]
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new().with_module(core_module())
}

#[allow(dead_code)]
pub fn core_schema() -> Arc<Schema> {
    Arc::new(compose(&[ModuleDescriptor::with_revision("core", "1.0")], &catalog()).unwrap())
}

/// Registry holding one empty "controller" treespace over `core@1.0`
#[allow(dead_code)]
pub fn controller() -> (TreespaceRegistry, Arc<Treespace>) {
    let registry = TreespaceRegistry::new();
    let treespace = registry
        .register("controller", core_schema(), DataTree::new(), HookRegistry::new())
        .unwrap();
    (registry, treespace)
}

#[allow(dead_code)]
pub fn readonly_flag() -> DataPath {
    DataPath::root().child("system").child("readonly").child("flag")
}

#[allow(dead_code)]
pub fn writable_flag() -> DataPath {
    DataPath::root().child("system").child("writable").child("flag")
}

#[allow(dead_code)]
pub fn interface(name: &str) -> DataPath {
    DataPath::root().child("interfaces").entry("interface", "name", name)
}

/// Consumer that keeps every event it receives
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingConsumer {
    events: Mutex<Vec<MutationEvent>>,
}

#[allow(dead_code)]
impl RecordingConsumer {
    pub fn events(&self) -> Vec<MutationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl NotificationConsumer for RecordingConsumer {
    fn notify(&self, event: &MutationEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
