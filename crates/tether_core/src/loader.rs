//! The loading engine.
//!
//! A [`Loader`] owns the registry, the entries, the fetch bookkeeping and the
//! transport. Everything runs on the caller's thread: requests walk the graph
//! synchronously, fetches are dispatched at the end of each walk, and
//! completions are applied when the caller pumps or awaits the completion
//! channel.

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::{ConfigUpdate, LoaderConfig};
use crate::define::{Definition, Factory, Meta};
use crate::entry::{self, Entries, Entry, EntryCallback};
use crate::error::{LoaderError, Result};
use crate::fetch::{FetchStart, FetchState, RequestBatch};
use crate::graph::{Module, ModuleId, Registry, Status};
use crate::hooks::Hook;
use crate::parser::{DependencyExtractor, SourceScanner};
use crate::resolver::Resolver;
use crate::transport::{Completion, CompletionReceiver, FetchRequest, Payload, Transport};

pub struct Loader {
    resolver: Resolver,
    registry: Registry,
    entries: Entries,
    fetches: FetchState,
    transport: Box<dyn Transport>,
    completions: CompletionReceiver,
    extractor: Box<dyn DependencyExtractor>,
    hooks: Vec<Box<dyn Hook>>,
    // Set by an anonymous define; claimed by the next completed fetch.
    anonymous: Option<Meta>,
    next_cid: usize,
}

impl Loader {
    pub fn new(
        config: LoaderConfig,
        transport: impl Transport + 'static,
        completions: CompletionReceiver,
    ) -> Self {
        Self {
            resolver: Resolver::new(config),
            registry: Registry::new(),
            entries: Entries::default(),
            fetches: FetchState::default(),
            transport: Box::new(transport),
            completions,
            extractor: Box::new(SourceScanner),
            hooks: Vec::new(),
            anonymous: None,
            next_cid: 0,
        }
    }

    pub fn with_extractor(mut self, extractor: impl DependencyExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn with_hook(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        self.resolver.config()
    }

    pub fn configure(&mut self, update: ConfigUpdate) {
        self.resolver.configure(update);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn module(&self, location: &str) -> Option<&Module> {
        self.registry.by_location(location)
    }

    /// Request locations dispatched and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.fetches.in_flight()
    }

    pub fn is_fetched(&self, request_location: &str) -> bool {
        self.fetches.is_fetched(request_location)
    }

    pub fn is_idle(&self) -> bool {
        self.fetches.in_flight() == 0
    }

    /// Entries whose callback has not fired yet.
    pub fn pending_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn resolve(&self, id: &str, referrer: Option<&str>) -> String {
        for hook in &self.hooks {
            if let Some(location) = hook.resolve(id, referrer) {
                return location;
            }
        }
        self.resolver.resolve(id, referrer)
    }

    /// Load `ids` and everything they depend on, then call `callback` with
    /// their exports in the same order.
    pub fn request<I, S, F>(&mut self, ids: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&mut Loader, Vec<Option<Value>>) + 'static,
    {
        let cid = self.cid();
        let location = format!("{}_use_{cid}", self.config().cwd);
        let ids = ids.into_iter().map(Into::into).collect();
        self.request_at(location, ids, Box::new(callback));
    }

    /// Register a definition. Named definitions are saved at once; anonymous
    /// ones wait for the next completed fetch. The first save of a location
    /// wins.
    pub fn define(&mut self, definition: Definition) {
        let Definition {
            id,
            dependencies,
            factory,
            source,
        } = definition;

        let dependencies = match (dependencies, source) {
            (Some(dependencies), _) => dependencies,
            (None, Some(source)) => self.extractor.extract(&source),
            (None, None) => Vec::new(),
        };

        let mut location = match &id {
            Some(id) => self.resolve(id, None),
            None => String::new(),
        };
        for hook in &self.hooks {
            hook.define(&mut location);
        }

        let meta = Meta {
            name: id,
            dependencies,
            factory,
        };
        if location.is_empty() {
            if self.anonymous.is_some() {
                debug!("replacing unsaved anonymous definition");
            }
            self.anonymous = Some(meta);
        } else {
            self.save(&location, meta);
        }
    }

    /// Execute the module `id` names right now, forcing it through the rest of
    /// its lifecycle. Fails with `NotLoaded` if its definition has not arrived.
    pub fn require_sync(&mut self, id: &str) -> Result<Option<Value>> {
        let location = self.resolve(id, None);
        let module = self.registry.get_or_create(&location);
        let status = self.registry[module].status;
        match status {
            Status::Error => Err(LoaderError::Broken { location }),
            _ => self.execute(module),
        }
    }

    /// Apply one transport completion.
    pub fn complete(&mut self, completion: Completion) {
        let Completion { location, outcome } = completion;
        let Some(waiters) = self.fetches.finish(&location) else {
            warn!(%location, "completion for a location that is not in flight");
            return;
        };

        let failed = match outcome {
            Ok(payload) => {
                self.evaluate(payload);
                false
            }
            Err(err) => {
                warn!(%location, error = %err, "fetch failed");
                true
            }
        };

        if let Some(meta) = self.anonymous.take() {
            match waiters.first() {
                Some(&first) => {
                    let initiator = self.registry[first].location.clone();
                    self.save(&initiator, meta);
                }
                None => self.anonymous = Some(meta),
            }
        }

        debug!(%location, waiters = waiters.len(), failed, "fetch completed");
        for module in waiters {
            if failed {
                self.mark_error(module);
            } else {
                self.load(module);
            }
        }
    }

    /// Apply every completion already queued, including ones queued while
    /// applying. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.complete(completion);
            applied += 1;
        }
        applied
    }

    /// Apply completions as they arrive until nothing is in flight.
    pub async fn run(&mut self) -> Result<()> {
        while self.fetches.in_flight() > 0 {
            match self.completions.recv().await {
                Some(completion) => self.complete(completion),
                None => {
                    return Err(LoaderError::Disconnected {
                        in_flight: self.fetches.in_flight(),
                    })
                }
            }
        }
        Ok(())
    }

    fn cid(&mut self) -> usize {
        let cid = self.next_cid;
        self.next_cid += 1;
        cid
    }

    fn request_at(&mut self, location: String, ids: Vec<String>, callback: EntryCallback) {
        let module = self.registry.get_or_create(&location);
        self.registry[module].dependencies = ids;
        let entry = self.entries.open(module, callback);
        self.registry[module].entries.push(entry);
        debug!(%location, "request opened");
        self.load(module);
    }

    fn evaluate(&mut self, payload: Payload) {
        match payload {
            Payload::Definitions(definitions) => {
                for definition in definitions {
                    self.define(definition);
                }
            }
            Payload::Text(text) => {
                self.define(Definition::value(Value::String(text.clone())).with_source(text));
            }
            Payload::Json(value) => self.define(Definition::value(value)),
        }
    }

    fn save(&mut self, location: &str, meta: Meta) {
        let module = self.registry.get_or_create(location);
        let node = &mut self.registry[module];
        if node.status >= Status::Saved {
            debug!(%location, "already saved; definition ignored");
            return;
        }
        node.name = Some(meta.name.unwrap_or_else(|| location.to_string()));
        node.dependencies = meta.dependencies;
        node.factory = Some(meta.factory);
        node.status = Status::Saved;
        debug!(%location, dependencies = node.dependencies.len(), "saved");

        for hook in &self.hooks {
            hook.save(location);
        }
    }

    fn resolve_dependencies(&self, module: ModuleId) -> Vec<String> {
        let node = &self.registry[module];
        node.dependencies
            .iter()
            .map(|id| self.resolve(id, Some(node.location.as_str())))
            .collect()
    }

    fn load(&mut self, module: ModuleId) {
        if self.registry[module].status >= Status::Loading {
            return;
        }
        self.registry[module].status = Status::Loading;

        let locations = self.resolve_dependencies(module);
        for hook in &self.hooks {
            hook.load(&locations);
        }

        let declared = self.registry[module].dependencies.clone();
        let mut targets = Vec::with_capacity(locations.len());
        for (id, location) in declared.into_iter().zip(&locations) {
            let dep = self.registry.get_or_create(location);
            self.registry[module].edges.insert(id, dep);
            targets.push(dep);
        }

        let ready = entry::resolve_node(&mut self.registry, &mut self.entries, module);

        let mut batch = RequestBatch::default();
        for dep in targets {
            let status = self.registry[dep].status;
            match status {
                Status::Unsaved => self.fetch(dep, Some(&mut batch)),
                Status::Saved => self.load(dep),
                _ => {}
            }
        }

        for request in batch.into_requests() {
            debug!(location = %request.request_location, "dispatching");
            self.transport.request(request);
        }

        for entry in ready {
            self.fire(entry);
        }
    }

    fn fetch(&mut self, module: ModuleId, batch: Option<&mut RequestBatch>) {
        let location = self.registry[module].location.clone();
        self.registry[module].status = Status::Fetching;

        let request_location = self
            .hooks
            .iter()
            .find_map(|hook| hook.fetch(&location))
            .unwrap_or_else(|| location.clone());

        match self.fetches.begin(&request_location, module) {
            FetchStart::Ready => self.load(module),
            FetchStart::Joined => {}
            FetchStart::Dispatch => {
                let config = self.resolver.config();
                let request = FetchRequest {
                    location,
                    request_location,
                    charset: config.charset.clone(),
                    cors: config.cors,
                };
                match batch {
                    Some(batch) => batch.push(request),
                    None => self.transport.request(request),
                }
            }
        }
    }

    // The node is broken before its watchers hear about it, so an entry that
    // fires now sees it as such. A node that already resolved through another
    // definition keeps it.
    fn mark_error(&mut self, module: ModuleId) {
        if entry::is_resolved(self.registry[module].status) {
            return;
        }
        self.registry[module].status = Status::Error;
        let ready = entry::resolve_node(&mut self.registry, &mut self.entries, module);
        for entry in ready {
            self.fire(entry);
        }
    }

    fn fire(&mut self, entry: Entry) {
        let Entry {
            module,
            history,
            callback,
            ..
        } = entry;

        // The whole closure has resolved, so every node in it is loaded.
        for node in history {
            if self.registry[node].status == Status::Loading {
                self.registry[node].status = Status::Loaded;
            }
        }

        let targets = self.registry.dependencies_of(module);
        let mut exports = Vec::with_capacity(targets.len());
        for dep in targets {
            match self.execute(dep) {
                Ok(value) => exports.push(value),
                Err(err) => {
                    error!(error = %err, "execution failed while completing a request");
                    exports.push(None);
                }
            }
        }

        debug!(location = %self.registry[module].location, "request complete");
        if let Some(callback) = callback {
            callback(self, exports);
        }
    }

    fn execute(&mut self, module: ModuleId) -> Result<Option<Value>> {
        match self.registry[module].status {
            Status::Unsaved | Status::Fetching => {
                return Err(LoaderError::NotLoaded {
                    location: self.registry[module].location.clone(),
                })
            }
            Status::Saved => self.load(module),
            _ => {}
        }

        let (location, factory) = {
            let node = &mut self.registry[module];
            if node.status >= Status::Executing {
                return Ok(node.exports.clone());
            }
            node.status = Status::Executing;

            let Some(factory) = node.factory.take() else {
                node.placeholder = true;
                return Ok(None);
            };
            node.exports = Some(Value::Object(Map::new()));
            (node.location.clone(), factory)
        };

        let returned = match factory {
            Factory::Value(value) => Some(value),
            Factory::Function(f) => {
                let mut scope = Scope {
                    loader: self,
                    module,
                };
                f(&mut scope).map_err(|source| LoaderError::Factory {
                    location: location.clone(),
                    source,
                })?
            }
        };

        let node = &mut self.registry[module];
        if returned.is_some() {
            node.exports = returned;
        }
        node.status = Status::Executed;
        debug!(%location, "executed");

        for hook in &self.hooks {
            hook.exec(&location, self.registry[module].exports.as_ref());
        }
        Ok(self.registry[module].exports.clone())
    }
}

/// What a running factory sees: lookups relative to its own module.
pub struct Scope<'l> {
    loader: &'l mut Loader,
    module: ModuleId,
}

impl Scope<'_> {
    pub fn location(&self) -> &str {
        &self.loader.registry[self.module].location
    }

    pub fn resolve(&self, id: &str) -> String {
        self.loader.resolve(id, Some(self.location()))
    }

    /// Execute a dependency and return its exports. A module that is already
    /// executing (a cycle) yields its exports as they stand.
    pub fn require(&mut self, id: &str) -> Result<Option<Value>> {
        let dep = match self.loader.registry[self.module].edge(id) {
            Some(dep) => dep,
            None => {
                let location = self.resolve(id);
                self.loader.registry.get_or_create(&location)
            }
        };

        if self.loader.registry[dep].status == Status::Error {
            return Err(LoaderError::Broken {
                location: self.loader.registry[dep].location.clone(),
            });
        }
        self.loader.execute(dep)
    }

    /// Start a separate request for `ids`, relative to this module.
    pub fn require_async<I, S, F>(&mut self, ids: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&mut Loader, Vec<Option<Value>>) + 'static,
    {
        let cid = self.loader.cid();
        let location = format!("{}_async_{cid}", self.location());
        let ids = ids.into_iter().map(Into::into).collect();
        self.loader.request_at(location, ids, Box::new(callback));
    }

    /// This module's exports container, visible to cyclic requirers while the
    /// factory runs.
    pub fn exports(&mut self) -> &mut Value {
        self.loader.registry[self.module]
            .exports
            .get_or_insert_with(|| Value::Object(Map::new()))
    }
}
