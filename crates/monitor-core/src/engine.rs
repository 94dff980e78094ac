//! Reconciliation Engine: the single consumer of the raw event stream.
//!
//! For every raw event the engine:
//!
//! 1. Resolves the affected path(s) into normalized form and probes the target
//! 2. Classifies the observation (see [`classifier`](crate::classifier))
//! 3. Applies the resulting store and watch mutation
//! 4. Emits at most one notification on the [`EventBus`]
//!
//! Events are processed strictly in arrival order. The engine lives on the
//! monitor worker, which is the only writer to the store and the watch table.

use crate::baseline::Baseline;
use crate::classifier::{self, Decision, Observation, RenameOutcome};
use crate::events::{EventBus, MonitorEvent, RawEvent};
use crate::path;
use crate::probe::PathProbe;
use crate::status::{ItemKind, ItemStatus, StatusSnapshot, StatusStore};
use crate::watch::{EventSource, WatchHandle, WatchTable};

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Control messages accepted by the engine besides raw events.
#[derive(Debug)]
pub enum Command {
    /// Discard raw events until `Resume`
    Pause,
    Resume,
    /// Resolve one more prediction target at runtime
    Track(PathBuf),
    /// Forget a folder or file record
    Untrack(PathBuf),
    /// The pending change of an item has been stored by the versioning side
    MarkPersisted(PathBuf),
    /// Reply with a copy of the store
    Snapshot(oneshot::Sender<StatusSnapshot>),
    Shutdown,
}

/// Whether the worker loop should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct Engine<S, B, P> {
    pub(crate) store: StatusStore,
    pub(crate) watches: WatchTable<S>,
    baseline: B,
    pub(crate) probe: P,
    bus: Arc<EventBus>,
    paused: bool,
}

impl<S: EventSource, B: Baseline, P: PathProbe> Engine<S, B, P> {
    pub fn new(source: S, baseline: B, probe: P, bus: Arc<EventBus>) -> Self {
        Self {
            store: StatusStore::new(),
            watches: WatchTable::new(source),
            baseline,
            probe,
            bus,
            paused: false,
        }
    }

    /// Start from a previously persisted store instead of an empty one.
    ///
    /// Watches are not restored; call [`reattach_restored`](Self::reattach_restored).
    pub fn with_store(mut self, store: StatusStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn watches(&self) -> &WatchTable<S> {
        &self.watches
    }

    pub(crate) fn emit(&self, event: MonitorEvent) {
        self.bus.emit(event);
    }

    /// Process one raw event. Returns the decision taken, `None` while paused.
    pub fn handle(&mut self, event: RawEvent) -> Option<Decision> {
        if self.paused {
            debug!("Monitor paused, discarding {:?}", event);
            return None;
        }

        let observation = self.observe(event);
        let decision = classifier::classify(&observation, &self.store, &self.baseline);
        self.apply(decision.clone());
        Some(decision)
    }

    fn observe(&self, event: RawEvent) -> Observation {
        match event {
            RawEvent::Add { name, dir } => {
                let path = path::join(&dir, &name);
                let target = self.probe.probe(&path);
                Observation::Added { path, target }
            }
            RawEvent::Delete { name, dir } => Observation::Deleted {
                path: path::join(&dir, &name),
            },
            RawEvent::Modify { name, dir } => Observation::Modified {
                path: path::join(&dir, &name),
            },
            RawEvent::Move { name, old_name, dir } => {
                let to = path::join(&dir, &name);
                let target = self.probe.probe(&to);
                Observation::Moved {
                    from: path::join(&dir, &old_name),
                    to,
                    target,
                }
            }
        }
    }

    fn apply(&mut self, decision: Decision) {
        match decision {
            Decision::AddFolder { path, status } => match self.watches.install(&path) {
                Ok(handle) => {
                    self.store.upsert(ItemKind::Folder, &path, |r| {
                        r.status = status;
                        r.watch = Some(handle);
                        r.clear_rename();
                    });
                    debug!("Folder added: {} ({:?}, {})", path, status, handle);
                    self.emit(MonitorEvent::FolderAdded { path, status });
                }
                Err(e) => self.watch_failed(path, e.to_string()),
            },

            Decision::AddFile { path, status } => {
                self.store.upsert(ItemKind::File, &path, |r| {
                    r.status = status;
                    r.clear_rename();
                });
                debug!("File added: {} ({:?})", path, status);
                self.emit(MonitorEvent::FileAdded { path, status });
            }

            Decision::PurgeFolder { path } => {
                if let Some(record) = self.store.remove(ItemKind::Folder, &path) {
                    self.release_watch(&path, record.watch);
                }
                self.retire_subtree(&path);
                debug!("Purged new folder: {}", path);
            }

            Decision::PurgeFile { path } => {
                self.store.remove(ItemKind::File, &path);
                debug!("Purged new file: {}", path);
            }

            Decision::DeleteFolder { path } => {
                let mut released = None;
                self.store.upsert(ItemKind::Folder, &path, |r| {
                    r.status = ItemStatus::Deleted;
                    released = r.watch.take();
                });
                self.release_watch(&path, released);
                self.retire_subtree(&path);
                debug!("Folder deleted: {}", path);
                self.emit(MonitorEvent::FolderDeleted { path });
            }

            Decision::DeleteFile { path } => {
                self.store.upsert(ItemKind::File, &path, |r| r.status = ItemStatus::Deleted);
                debug!("File deleted: {}", path);
                self.emit(MonitorEvent::FileDeleted { path });
            }

            Decision::ModifyFile { path, status } => {
                self.store.upsert(ItemKind::File, &path, |r| r.status = status);
                debug!("File modified: {} ({:?})", path, status);
                self.emit(MonitorEvent::FileModified { path, status });
            }

            Decision::RenameFile { from, to, outcome } => self.rename_file(from, to, outcome),

            Decision::RenameFolder { from, to, outcome } => self.rename_folder(from, to, outcome),

            Decision::Ignore(reason) => {
                debug!("Ignored event: {:?}", reason);
            }
        }
    }

    /// Records below a removed folder: new items are purged, the rest marked
    /// `Deleted`. Their watches are released without further notifications.
    fn retire_subtree(&mut self, folder: &str) {
        for kind in [ItemKind::Folder, ItemKind::File] {
            for key in self.store.descendants(kind, folder) {
                let released = if self.store.get(kind, &key) == Some(ItemStatus::NewAdded) {
                    self.store.remove(kind, &key).and_then(|r| r.watch)
                } else {
                    let mut released = None;
                    self.store.upsert(kind, &key, |r| {
                        r.status = ItemStatus::Deleted;
                        released = r.watch.take();
                    });
                    released
                };
                self.release_watch(&key, released);
            }
        }
    }

    fn rename_file(&mut self, from: String, to: String, outcome: Option<RenameOutcome>) {
        if !self.store.rekey(ItemKind::File, &from, &to) {
            warn!("Failed to move file record {} -> {}", from, to);
            return;
        }

        let Some(outcome) = outcome else {
            debug!("New file re-keyed: {} -> {}", from, to);
            return;
        };

        let status = outcome.status;
        let old_name = outcome.old_name.clone();
        self.store.upsert(ItemKind::File, &to, |r| {
            r.status = outcome.status;
            r.set_rename(outcome.old_name, outcome.new_name);
        });
        debug!("File renamed: {} -> {} ({:?})", from, to, status);

        let event = if status == ItemStatus::UpdatedAndRenamed {
            MonitorEvent::FileRenamedAndModified { path: to, old_name }
        } else {
            MonitorEvent::FileRenamed { path: to, old_name }
        };
        self.emit(event);
    }

    fn rename_folder(&mut self, from: String, to: String, outcome: Option<RenameOutcome>) {
        if !self.store.rekey(ItemKind::Folder, &from, &to) {
            warn!("Failed to move folder record {} -> {}", from, to);
            return;
        }
        self.follow_watch(&from, &to);

        for (old, new) in self.store.rekey_descendants(&from, &to) {
            self.follow_watch(&old, &new);
        }

        let Some(outcome) = outcome else {
            debug!("New folder re-keyed: {} -> {}", from, to);
            return;
        };

        let old_name = outcome.old_name.clone();
        self.store.upsert(ItemKind::Folder, &to, |r| {
            r.status = outcome.status;
            r.set_rename(outcome.old_name, outcome.new_name);
        });
        debug!("Folder renamed: {} -> {}", from, to);
        self.emit(MonitorEvent::FolderRenamed { path: to, old_name });
    }

    /// Keep the watch of a folder record (already re-keyed to `to`) pointing at it.
    fn follow_watch(&mut self, from: &str, to: &str) {
        let Some(handle) = self.store.record(ItemKind::Folder, to).and_then(|r| r.watch) else {
            return;
        };

        if self.watches.follows_renames() {
            self.watches.rekey(from, to);
            return;
        }

        // Path-keyed source: the old registration is stale
        self.release_watch(from, Some(handle));
        match self.watches.install(to) {
            Ok(new_handle) => {
                self.store.upsert(ItemKind::Folder, to, |r| r.watch = Some(new_handle));
            }
            Err(e) => {
                self.store.upsert(ItemKind::Folder, to, |r| r.watch = None);
                self.watch_failed(to.to_string(), e.to_string());
            }
        }
    }

    pub(crate) fn release_watch(&mut self, path: &str, handle: Option<WatchHandle>) {
        if let Some(handle) = handle {
            if let Err(e) = self.watches.uninstall(handle) {
                warn!("Failed to remove {} for {}: {}", handle, path, e);
            }
        }
    }

    pub(crate) fn watch_failed(&self, path: String, reason: String) {
        warn!("Failed to watch {}: {}", path, reason);
        self.emit(MonitorEvent::WatchInstallFailed { path, reason });
    }

    /// Apply a control command.
    pub fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Pause => {
                info!("Monitor paused");
                self.paused = true;
            }
            Command::Resume => {
                info!("Monitor resumed");
                self.paused = false;
            }
            Command::Track(target) => {
                self.resolve_target(&target);
            }
            Command::Untrack(target) => self.untrack(&target),
            Command::MarkPersisted(target) => self.mark_persisted(&target),
            Command::Snapshot(reply) => {
                if reply.send(self.store.snapshot()).is_err() {
                    debug!("Snapshot requester went away");
                }
            }
            Command::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    fn untrack(&mut self, target: &std::path::Path) {
        let folder = path::normalize_folder(target);
        if let Some(record) = self.store.remove(ItemKind::Folder, &folder) {
            self.release_watch(&folder, record.watch);

            // Files directly inside get no more events without the folder watch
            let orphans: Vec<String> = self
                .store
                .iter(ItemKind::File)
                .filter(|r| path::parent_folder(&r.path).as_deref() == Some(folder.as_str()))
                .map(|r| r.path.clone())
                .collect();
            for file in orphans {
                self.store.remove(ItemKind::File, &file);
            }

            info!("Stopped tracking folder {}", folder);
            self.emit(MonitorEvent::TrackingStopped { path: folder });
            return;
        }

        let file = path::normalize_file(target);
        if self.store.remove(ItemKind::File, &file).is_some() {
            info!("Stopped tracking file {}", file);
            self.emit(MonitorEvent::TrackingStopped { path: file });
        } else {
            debug!("Untrack ignored, not tracked: {:?}", target);
        }
    }

    fn mark_persisted(&mut self, target: &std::path::Path) {
        let folder = path::normalize_folder(target);
        let (kind, key) = if self.store.exists(ItemKind::Folder, &folder) {
            (ItemKind::Folder, folder)
        } else {
            (ItemKind::File, path::normalize_file(target))
        };

        match self.store.get(kind, &key) {
            Some(ItemStatus::Deleted) => {
                self.store.remove(kind, &key);
                debug!("Persisted deletion of {}", key);
            }
            Some(_) => {
                self.store.upsert(kind, &key, |r| {
                    r.status = ItemStatus::Undefined;
                    r.clear_rename();
                });
                debug!("Persisted {}", key);
            }
            None => debug!("MarkPersisted ignored, not tracked: {}", key),
        }
    }

    /// The OS event source can deliver nothing more.
    pub fn source_closed(&self, reason: &str) {
        error!("Event source terminated: {}", reason);
        self.emit(MonitorEvent::SourceTerminated {
            reason: reason.to_string(),
        });
    }

    /// Uninstall every watch. Store statuses are left as they are.
    pub fn shutdown(&mut self) {
        let count = self.watches.len();
        for (path, e) in self.watches.uninstall_all() {
            warn!("Failed to remove watch for {}: {}", path, e);
        }

        let watched: Vec<String> = self
            .store
            .iter(ItemKind::Folder)
            .filter(|r| r.watch.is_some())
            .map(|r| r.path.clone())
            .collect();
        for folder in watched {
            self.store.upsert(ItemKind::Folder, &folder, |r| r.watch = None);
        }
        info!("Monitor stopped, {} watch(es) removed", count);
    }
}
