//! Per-treespace hook and consumer lists

use std::sync::{Arc, PoisonError, RwLock};

use crate::hooks::{AuthorizationHook, FilterHook, NotificationConsumer, ValidationHook};
use crate::path::DataPath;

struct Registered<T: ?Sized> {
    name: String,
    scope: Option<DataPath>,
    target: Arc<T>,
}

impl<T: ?Sized> Registered<T> {
    fn applies_to(&self, path: &DataPath) -> bool {
        self.scope.as_ref().map_or(true, |scope| scope.overlaps(path))
    }
}

type Slot<T> = RwLock<Vec<Registered<T>>>;

fn push<T: ?Sized>(slot: &Slot<T>, name: String, scope: Option<DataPath>, target: Arc<T>) {
    slot.write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(Registered { name, scope, target });
}

/// Drop every entry called `name`; true when something was removed
fn remove<T: ?Sized>(slot: &Slot<T>, kind: &str, name: &str) -> bool {
    let mut entries = slot.write().unwrap_or_else(PoisonError::into_inner);
    let before = entries.len();
    entries.retain(|e| e.name != name);
    let removed = entries.len() != before;
    if removed {
        tracing::debug!(kind = kind, name = %name, "unregistered");
    }
    removed
}

fn len<T: ?Sized>(slot: &Slot<T>) -> usize {
    slot.read().unwrap_or_else(PoisonError::into_inner).len()
}

/// Ordered hooks and notification consumers
///
/// Order is registration order, with scoped and global entries
/// interleaved as registered. A scoped entry only sees mutations whose
/// path overlaps its scope. Each kind keeps its own list, so a name can be
/// reused across kinds and unregistering one kind leaves the others alone.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Slot<dyn AuthorizationHook>,
    query_hooks: Slot<dyn AuthorizationHook>,
    validators: Slot<dyn ValidationHook>,
    filters: Slot<dyn FilterHook>,
    consumers: Slot<dyn NotificationConsumer>,
}

/// Hook name paired with the hook, as handed to the pipeline
pub type NamedHook = (String, Arc<dyn AuthorizationHook>);

/// Query authorization hook with its optional scope
pub type ScopedHook = (String, Option<DataPath>, Arc<dyn AuthorizationHook>);

/// Validation hook with the path it validates
pub type NamedValidator = (String, DataPath, Arc<dyn ValidationHook>);

/// Filter hook with the list it filters
pub type NamedFilter = (String, DataPath, Arc<dyn FilterHook>);

/// Consumer name paired with the consumer
pub type NamedConsumer = (String, Arc<dyn NotificationConsumer>);

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize every mutation
    pub fn register_hook(&self, name: impl Into<String>, hook: Arc<dyn AuthorizationHook>) {
        self.push_hook(name.into(), None, hook);
    }

    pub fn register_scoped_hook(&self, name: impl Into<String>, scope: DataPath, hook: Arc<dyn AuthorizationHook>) {
        self.push_hook(name.into(), Some(scope), hook);
    }

    /// Authorize every query match; hooks see `Operation::Query`
    pub fn register_query_hook(&self, name: impl Into<String>, hook: Arc<dyn AuthorizationHook>) {
        self.push_query_hook(name.into(), None, hook);
    }

    pub fn register_scoped_query_hook(
        &self,
        name: impl Into<String>,
        scope: DataPath,
        hook: Arc<dyn AuthorizationHook>,
    ) {
        self.push_query_hook(name.into(), Some(scope), hook);
    }

    /// Validate the proposed node at `scope` whenever a mutation overlaps it
    ///
    /// Register at the root to see every mutation.
    pub fn register_validation_hook(&self, name: impl Into<String>, scope: DataPath, hook: Arc<dyn ValidationHook>) {
        let name = name.into();
        tracing::debug!(hook = %name, scope = %scope, "validation hook registered");
        push(&self.validators, name, Some(scope), hook);
    }

    /// Filter the entries of `list`
    ///
    /// The filter applies to that list wherever it occurs, so keys on
    /// ancestors of `list` are ignored.
    pub fn register_filter_hook(&self, name: impl Into<String>, list: DataPath, hook: Arc<dyn FilterHook>) {
        let name = name.into();
        tracing::debug!(hook = %name, list = %list, "filter hook registered");
        push(&self.filters, name, Some(list), hook);
    }

    pub fn register_consumer(&self, name: impl Into<String>, consumer: Arc<dyn NotificationConsumer>) {
        self.push_consumer(name.into(), None, consumer);
    }

    pub fn register_scoped_consumer(
        &self,
        name: impl Into<String>,
        scope: DataPath,
        consumer: Arc<dyn NotificationConsumer>,
    ) {
        self.push_consumer(name.into(), Some(scope), consumer);
    }

    /// Builder form of [`HookRegistry::register_hook`]
    pub fn with_hook(self, name: impl Into<String>, hook: Arc<dyn AuthorizationHook>) -> Self {
        self.register_hook(name, hook);
        self
    }

    /// Builder form of [`HookRegistry::register_consumer`]
    pub fn with_consumer(self, name: impl Into<String>, consumer: Arc<dyn NotificationConsumer>) -> Self {
        self.register_consumer(name, consumer);
        self
    }

    /// Remove the mutation authorization hooks called `name`
    ///
    /// Returns false when none was registered. Mutations already past
    /// authorization are unaffected.
    pub fn unregister_hook(&self, name: &str) -> bool {
        remove(&self.hooks, "authorization hook", name)
    }

    pub fn unregister_query_hook(&self, name: &str) -> bool {
        remove(&self.query_hooks, "query hook", name)
    }

    pub fn unregister_validation_hook(&self, name: &str) -> bool {
        remove(&self.validators, "validation hook", name)
    }

    pub fn unregister_filter_hook(&self, name: &str) -> bool {
        remove(&self.filters, "filter hook", name)
    }

    pub fn unregister_consumer(&self, name: &str) -> bool {
        remove(&self.consumers, "notification consumer", name)
    }

    fn push_hook(&self, name: String, scope: Option<DataPath>, target: Arc<dyn AuthorizationHook>) {
        tracing::debug!(hook = %name, scope = ?scope.as_ref().map(ToString::to_string), "authorization hook registered");
        push(&self.hooks, name, scope, target);
    }

    fn push_query_hook(&self, name: String, scope: Option<DataPath>, target: Arc<dyn AuthorizationHook>) {
        tracing::debug!(hook = %name, scope = ?scope.as_ref().map(ToString::to_string), "query hook registered");
        push(&self.query_hooks, name, scope, target);
    }

    fn push_consumer(&self, name: String, scope: Option<DataPath>, target: Arc<dyn NotificationConsumer>) {
        tracing::debug!(consumer = %name, scope = ?scope.as_ref().map(ToString::to_string), "notification consumer registered");
        push(&self.consumers, name, scope, target);
    }

    /// Hooks applying to `path`, in order; a snapshot so no lock is held
    /// while they run
    pub fn hooks_for(&self, path: &DataPath) -> Vec<NamedHook> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|h| h.applies_to(path))
            .map(|h| (h.name.clone(), Arc::clone(&h.target)))
            .collect()
    }

    /// Every query hook with its scope; a query checks scopes per match
    pub fn query_hooks(&self) -> Vec<ScopedHook> {
        self.query_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|h| (h.name.clone(), h.scope.clone(), Arc::clone(&h.target)))
            .collect()
    }

    /// Validation hooks whose scope overlaps `path`
    pub fn validators_for(&self, path: &DataPath) -> Vec<NamedValidator> {
        self.validators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|v| v.applies_to(path))
            .filter_map(|v| Some((v.name.clone(), v.scope.clone()?, Arc::clone(&v.target))))
            .collect()
    }

    pub fn filters(&self) -> Vec<NamedFilter> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|f| Some((f.name.clone(), f.scope.clone()?, Arc::clone(&f.target))))
            .collect()
    }

    pub fn consumers_for(&self, path: &DataPath) -> Vec<NamedConsumer> {
        self.consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.applies_to(path))
            .map(|c| (c.name.clone(), Arc::clone(&c.target)))
            .collect()
    }

    /// Mutation authorization hooks registered
    pub fn hook_count(&self) -> usize {
        len(&self.hooks)
    }

    pub fn consumer_count(&self) -> usize {
        len(&self.consumers)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hook_count())
            .field("query_hooks", &len(&self.query_hooks))
            .field("validators", &len(&self.validators))
            .field("filters", &len(&self.filters))
            .field("consumers", &self.consumer_count())
            .finish()
    }
}
