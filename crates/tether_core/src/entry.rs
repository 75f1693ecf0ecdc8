//! Entries and the tracking of what each one still waits for.
//!
//! An entry is the bookkeeping for one top-level request. Its `history` is the
//! part of the dependency closure discovered so far, and `remain` counts the
//! nodes in it that have not resolved yet. A node resolves when its own
//! dependencies become known (LOADING and later) or when its fetch fails
//! (ERROR). Resolving a node extends every entry watching it over the node's
//! dependencies. When `remain` reaches zero the whole closure is resolved and
//! the entry fires.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::graph::{ModuleId, Registry, Status};
use crate::loader::Loader;

/// Invoked with the exports of the request's identifiers, in order. `None`
/// stands for a module that produced nothing (never defined, broken, or a
/// factory that failed).
pub type EntryCallback = Box<dyn FnOnce(&mut Loader, Vec<Option<Value>>)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

pub(crate) struct Entry {
    pub module: ModuleId,
    pub history: HashSet<ModuleId>,
    pub remain: usize,
    pub callback: Option<EntryCallback>,
}

#[derive(Default)]
pub(crate) struct Entries {
    next: u64,
    live: HashMap<EntryId, Entry>,
}

impl Entries {
    /// Open an entry rooted at `module`. The caller makes `module` watch it.
    pub fn open(&mut self, module: ModuleId, callback: EntryCallback) -> EntryId {
        let id = EntryId(self.next);
        self.next += 1;
        self.live.insert(
            id,
            Entry {
                module,
                history: HashSet::from([module]),
                remain: 1,
                callback: Some(callback),
            },
        );
        id
    }

    #[cfg(test)]
    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.live.get(&id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }
}

/// Whether the node's outgoing edges are final.
pub(crate) fn is_resolved(status: Status) -> bool {
    status >= Status::Loading
}

/// `node` just resolved. Count it as done for every entry watching it and
/// extend those entries over its dependencies. Returns the entries that are
/// now complete, removed from the table.
pub(crate) fn resolve_node(
    registry: &mut Registry,
    entries: &mut Entries,
    node: ModuleId,
) -> Vec<Entry> {
    let watchers = std::mem::take(&mut registry[node].entries);
    let mut ready = Vec::new();

    for entry_id in watchers {
        let Some(entry) = entries.live.get_mut(&entry_id) else {
            continue;
        };
        entry.remain = entry.remain.saturating_sub(1);
        extend(registry, entry, entry_id, node);

        if entry.remain == 0 {
            ready.extend(entries.live.remove(&entry_id));
        }
    }
    ready
}

// Walks the dependencies of `from` that the entry has not seen. Resolved nodes
// are walked through; pending ones are watched and counted.
fn extend(registry: &mut Registry, entry: &mut Entry, entry_id: EntryId, from: ModuleId) {
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        for dep in registry.dependencies_of(node) {
            if !entry.history.insert(dep) {
                continue;
            }
            if is_resolved(registry[dep].status) {
                stack.push(dep);
            } else {
                registry[dep].entries.push(entry_id);
                entry.remain += 1;
            }
        }
    }
}
