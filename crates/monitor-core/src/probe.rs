//! Path probing: what is on disk at a path right now.
//!
//! The classifier needs to know whether an event target is a folder, a
//! regular visible file, or something to skip. `NativeProbe` stats the real
//! filesystem; `InMemoryProbe` is the test double.

use crate::path;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// What a path currently refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Folder,
    /// Regular, non-hidden file
    File,
    /// Regular file following the hidden-name convention
    Hidden,
    /// Nothing on disk
    Missing,
    /// Socket, device, dangling link, ...
    Other,
}

/// Stat capability, injected into the engine.
pub trait PathProbe: Send {
    fn probe(&self, path: &str) -> PathKind;
}

/// Probe backed by `std::fs::metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProbe;

impl PathProbe for NativeProbe {
    fn probe(&self, path: &str) -> PathKind {
        match std::fs::metadata(Path::new(path)) {
            Ok(meta) if meta.is_dir() => PathKind::Folder,
            Ok(meta) if meta.is_file() => file_kind(path),
            Ok(_) => PathKind::Other,
            Err(_) => PathKind::Missing,
        }
    }
}

fn file_kind(path: &str) -> PathKind {
    if path::is_hidden_name(path::leaf_name(path)) {
        PathKind::Hidden
    } else {
        PathKind::File
    }
}

/// In-memory probe for testing. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryProbe {
    entries: Arc<RwLock<HashMap<String, bool>>>,
}

impl InMemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &str) -> String {
        let trimmed = path.trim_end_matches(path::SEPARATOR);
        if trimmed.is_empty() {
            path.to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn add_folder(&self, path: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(Self::key(path), true);
    }

    pub fn add_file(&self, path: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(Self::key(path), false);
    }

    pub fn remove(&self, path: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&Self::key(path));
    }

    /// Move an entry, as a rename on disk would.
    pub fn rename(&self, from: &str, to: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(is_dir) = entries.remove(&Self::key(from)) {
            entries.insert(Self::key(to), is_dir);
        }
    }
}

impl PathProbe for InMemoryProbe {
    fn probe(&self, path: &str) -> PathKind {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(&Self::key(path)) {
            Some(true) => PathKind::Folder,
            Some(false) => file_kind(path),
            None => PathKind::Missing,
        }
    }
}
