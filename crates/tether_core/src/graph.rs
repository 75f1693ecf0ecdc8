//! The registry of module nodes, keyed by canonical location.
//!
//! Nodes live in an arena and refer to each other (and to entries) by index,
//! never by ownership. A node is created the first time anything references
//! its location and is never evicted.

use std::collections::HashMap;

use serde_json::Value;

use crate::define::Factory;
use crate::entry::EntryId;

/// Lifecycle of a module node. Ordering is meaningful: the engine compares
/// statuses with `<` and `>=`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    /// Referenced but nothing requested yet.
    Unsaved = 0,
    /// The resource is being fetched.
    Fetching = 1,
    /// Metadata (id, dependencies, factory) has been registered.
    Saved = 2,
    /// Dependencies are being resolved and loaded.
    Loading = 3,
    /// Watchers released; ready to execute.
    Loaded = 4,
    /// The factory is running.
    Executing = 5,
    /// Exports are final.
    Executed = 6,
    /// The fetch failed.
    Error = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub usize);

pub struct Module {
    pub(crate) id: ModuleId,
    pub(crate) location: String,
    pub(crate) name: Option<String>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) edges: HashMap<String, ModuleId>,
    pub(crate) status: Status,
    pub(crate) factory: Option<Factory>,
    pub(crate) exports: Option<Value>,
    pub(crate) entries: Vec<EntryId>,
    pub(crate) placeholder: bool,
}

impl Module {
    fn new(id: ModuleId, location: String) -> Self {
        Self {
            id,
            location,
            name: None,
            dependencies: Vec::new(),
            edges: HashMap::new(),
            status: Status::Unsaved,
            factory: None,
            exports: None,
            entries: Vec::new(),
            placeholder: false,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// The declared id, or the location when the definition had none.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Dependency identifiers as declared or extracted.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// The node a declared identifier resolved to, once loading began.
    pub fn edge(&self, id: &str) -> Option<ModuleId> {
        self.edges.get(id).copied()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Exports so far; during execution this is the in-progress container.
    pub fn exports(&self) -> Option<&Value> {
        self.exports.as_ref()
    }

    /// Whether a factory is still held (registered, not yet executed).
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// True once execution found no factory: the location was never backed
    /// by a definition.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn is_watched_by(&self, entry: EntryId) -> bool {
        self.entries.contains(&entry)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("status", &self.status)
            .field("dependencies", &self.dependencies)
            .field("watchers", &self.entries.len())
            .finish()
    }
}

/// Identity map from canonical location to module node.
#[derive(Default)]
pub struct Registry {
    modules: Vec<Module>,
    by_location: HashMap<String, ModuleId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node for `location`, created on first reference.
    pub fn get_or_create(&mut self, location: &str) -> ModuleId {
        if let Some(id) = self.by_location.get(location) {
            return *id;
        }
        let id = ModuleId(self.modules.len());
        self.modules.push(Module::new(id, location.to_string()));
        self.by_location.insert(location.to_string(), id);
        id
    }

    pub fn find(&self, location: &str) -> Option<ModuleId> {
        self.by_location.get(location).copied()
    }

    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)
    }

    pub fn by_location(&self, location: &str) -> Option<&Module> {
        self.find(location).and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    /// Resolved dependency nodes of `id`, in declaration order.
    pub fn dependencies_of(&self, id: ModuleId) -> Vec<ModuleId> {
        let module = &self[id];
        module
            .dependencies
            .iter()
            .filter_map(|dep| module.edges.get(dep).copied())
            .collect()
    }
}

impl std::ops::Index<ModuleId> for Registry {
    type Output = Module;

    fn index(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }
}

impl std::ops::IndexMut<ModuleId> for Registry {
    fn index_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0]
    }
}
