//! Baseline query: did a path exist in the previously persisted record?
//!
//! The storage engine behind this query is external and is mutated
//! independently of the engine (GUI-driven copy/delete/freeze/thaw), so the
//! engine only ever asks, never caches.

use crate::status::ItemKind;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Baseline-existence capability, injected into the engine.
pub trait Baseline: Send {
    fn existed_in_baseline(&self, kind: ItemKind, path: &str) -> bool;
}

impl<T: Baseline + Sync> Baseline for Arc<T> {
    fn existed_in_baseline(&self, kind: ItemKind, path: &str) -> bool {
        (**self).existed_in_baseline(kind, path)
    }
}

/// Baseline that knows nothing. Every item is new.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBaseline;

impl Baseline for EmptyBaseline {
    fn existed_in_baseline(&self, _kind: ItemKind, _path: &str) -> bool {
        false
    }
}

#[derive(Default)]
struct Entries {
    folders: HashSet<String>,
    files: HashSet<String>,
}

/// In-memory baseline for testing. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryBaseline {
    entries: Arc<RwLock<Entries>>,
}

impl InMemoryBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a normalized folder path as baseline-known.
    pub fn add_folder(&self, path: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.folders.insert(path.to_string());
    }

    /// Record a normalized file path as baseline-known.
    pub fn add_file(&self, path: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.files.insert(path.to_string());
    }

    pub fn remove(&self, kind: ItemKind, path: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match kind {
            ItemKind::Folder => entries.folders.remove(path),
            ItemKind::File => entries.files.remove(path),
        };
    }
}

impl Baseline for InMemoryBaseline {
    fn existed_in_baseline(&self, kind: ItemKind, path: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match kind {
            ItemKind::Folder => entries.folders.contains(path),
            ItemKind::File => entries.files.contains(path),
        }
    }
}
