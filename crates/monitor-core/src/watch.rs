//! Watch Table: folder path to OS watch handle.
//!
//! The table delegates installation to an [`EventSource`] (the OS event
//! source, or [`InMemorySource`] in tests) and keeps the reverse mapping
//! needed to find a folder's handle again.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Opaque identifier issued by the event source for one installed watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for WatchHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("Path unavailable: {0}")]
    PathUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unknown watch handle: {0}")]
    UnknownHandle(WatchHandle),

    #[error("Event source error: {0}")]
    Backend(String),
}

/// Watch control interface of the OS event source.
///
/// Implementations must be `Send`: the engine, and with it the source, moves
/// onto the monitor worker thread.
pub trait EventSource: Send {
    /// Start observing `path`. Fails if the path no longer exists.
    fn install(&mut self, path: &Path, recursive: bool) -> Result<WatchHandle, WatchError>;

    /// Stop observing the folder behind `handle`.
    fn uninstall(&mut self, handle: WatchHandle) -> Result<(), WatchError>;

    /// Whether an installed watch keeps reporting correctly after its folder is
    /// renamed (descriptor/inode keyed sources). Path-keyed sources return false
    /// and the engine re-registers the watch at the new path.
    fn follows_renames(&self) -> bool {
        false
    }
}

/// Mapping from normalized folder path to watch handle.
pub struct WatchTable<S> {
    source: S,
    by_path: HashMap<String, WatchHandle>,
}

impl<S: EventSource> WatchTable<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            by_path: HashMap::new(),
        }
    }

    /// Install a non-recursive watch on a normalized folder path.
    ///
    /// Idempotent: a folder that is already watched keeps its existing handle.
    pub fn install(&mut self, path: &str) -> Result<WatchHandle, WatchError> {
        if let Some(handle) = self.by_path.get(path) {
            return Ok(*handle);
        }
        let handle = self.source.install(Path::new(path), false)?;
        self.by_path.insert(path.to_string(), handle);
        Ok(handle)
    }

    /// Remove a watch. The table entry is dropped even if the source fails.
    pub fn uninstall(&mut self, handle: WatchHandle) -> Result<(), WatchError> {
        self.by_path.retain(|_, h| *h != handle);
        self.source.uninstall(handle)
    }

    pub fn handle_for(&self, path: &str) -> Option<WatchHandle> {
        self.by_path.get(path).copied()
    }

    /// Move a table entry to a new path without touching the source.
    pub fn rekey(&mut self, from: &str, to: &str) -> Option<WatchHandle> {
        let handle = self.by_path.remove(from)?;
        self.by_path.insert(to.to_string(), handle);
        Some(handle)
    }

    pub fn follows_renames(&self) -> bool {
        self.source.follows_renames()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Uninstall every watch. Returns the failures so teardown can log them.
    pub fn uninstall_all(&mut self) -> Vec<(String, WatchError)> {
        let mut failures = Vec::new();
        for (path, handle) in std::mem::take(&mut self.by_path) {
            if let Err(e) = self.source.uninstall(handle) {
                failures.push((path, e));
            }
        }
        failures
    }
}

#[derive(Default)]
struct InMemoryState {
    next_id: u64,
    active: HashMap<WatchHandle, String>,
    installs: Vec<String>,
    uninstalls: Vec<WatchHandle>,
    unavailable: HashSet<String>,
    follows_renames: bool,
}

/// In-memory event source for testing.
///
/// Clones share state, so a test can keep one clone for assertions while the
/// engine owns the other.
#[derive(Clone, Default)]
pub struct InMemorySource {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose handles survive folder renames.
    pub fn following_renames() -> Self {
        let source = Self::new();
        source.lock().follows_renames = true;
        source
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make future installs of `path` fail with `PathUnavailable`.
    pub fn fail_on(&self, path: &str) {
        self.lock().unavailable.insert(path.to_string());
    }

    /// Paths passed to `install`, in call order.
    pub fn installs(&self) -> Vec<String> {
        self.lock().installs.clone()
    }

    /// Handles passed to `uninstall`, in call order.
    pub fn uninstalls(&self) -> Vec<WatchHandle> {
        self.lock().uninstalls.clone()
    }

    /// Currently active watches as `(handle, path)`, sorted by handle.
    pub fn active(&self) -> Vec<(WatchHandle, String)> {
        let mut active: Vec<_> = self
            .lock()
            .active
            .iter()
            .map(|(h, p)| (*h, p.clone()))
            .collect();
        active.sort();
        active
    }
}

impl EventSource for InMemorySource {
    fn install(&mut self, path: &Path, _recursive: bool) -> Result<WatchHandle, WatchError> {
        let path = path.to_string_lossy().to_string();
        let mut state = self.lock();
        state.installs.push(path.clone());
        if state.unavailable.contains(&path) {
            return Err(WatchError::PathUnavailable(path));
        }
        state.next_id += 1;
        let handle = WatchHandle::new(state.next_id);
        state.active.insert(handle, path);
        Ok(handle)
    }

    fn uninstall(&mut self, handle: WatchHandle) -> Result<(), WatchError> {
        let mut state = self.lock();
        state.uninstalls.push(handle);
        match state.active.remove(&handle) {
            Some(_) => Ok(()),
            None => Err(WatchError::UnknownHandle(handle)),
        }
    }

    fn follows_renames(&self) -> bool {
        self.lock().follows_renames
    }
}
