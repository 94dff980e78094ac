//! Event infrastructure for the monitor.
//!
//! - `RawEvent`: the four low-level shapes delivered by the OS event source.
//! - `MonitorEvent`: domain notifications emitted by the engine.
//! - `EventBus`: fan-out of notifications to subscribers. Each subscriber owns a
//!   FIFO channel and drains it on its own schedule, so emission never runs
//!   subscriber code on the worker thread.

use crate::path;
use crate::status::ItemStatus;

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::mpsc;

/// Raw filesystem event. `dir` is the parent directory, names are leaf names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    Add { name: String, dir: String },
    Delete { name: String, dir: String },
    Modify { name: String, dir: String },
    Move { name: String, old_name: String, dir: String },
}

impl RawEvent {
    /// Build an `Add` from a full path. `None` for a filesystem root.
    pub fn add(full_path: &str) -> Option<Self> {
        path::split(full_path).map(|(dir, name)| RawEvent::Add { name, dir })
    }

    pub fn delete(full_path: &str) -> Option<Self> {
        path::split(full_path).map(|(dir, name)| RawEvent::Delete { name, dir })
    }

    pub fn modify(full_path: &str) -> Option<Self> {
        path::split(full_path).map(|(dir, name)| RawEvent::Modify { name, dir })
    }

    /// Build a `Move` between two full paths in the same folder.
    ///
    /// Returns `None` when the parents differ; such moves reach the engine as a
    /// delete plus an add.
    pub fn rename(from: &str, to: &str) -> Option<Self> {
        let (from_dir, old_name) = path::split(from)?;
        let (to_dir, name) = path::split(to)?;
        if from_dir != to_dir {
            return None;
        }
        Some(RawEvent::Move {
            name,
            old_name,
            dir: to_dir,
        })
    }

    /// Full path targeted by the event (the new path for moves).
    pub fn target(&self) -> String {
        match self {
            RawEvent::Add { name, dir }
            | RawEvent::Delete { name, dir }
            | RawEvent::Modify { name, dir }
            | RawEvent::Move { name, dir, .. } => path::join(dir, name),
        }
    }
}

/// Domain notification emitted once per meaningfully classified event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    /// Folder discovered and watched.
    FolderAdded { path: String, status: ItemStatus },
    /// Baseline-known folder removed.
    FolderDeleted { path: String },
    /// Baseline-known folder renamed. `path` is the new path.
    FolderRenamed {
        path: String,
        #[serde(rename = "oldName")]
        old_name: String,
    },
    /// File appeared (`NewAdded`, or `Updated` when baseline-known).
    FileAdded { path: String, status: ItemStatus },
    /// Baseline-known file removed.
    FileDeleted { path: String },
    /// Tracked file content changed.
    FileModified { path: String, status: ItemStatus },
    /// Baseline-known file renamed.
    FileRenamed {
        path: String,
        #[serde(rename = "oldName")]
        old_name: String,
    },
    /// Updated file renamed.
    FileRenamedAndModified {
        path: String,
        #[serde(rename = "oldName")]
        old_name: String,
    },
    /// A watch could not be installed; the folder is not tracked.
    WatchInstallFailed { path: String, reason: String },
    /// A prediction target has no existing folder on disk.
    PredictionTargetNotFound { path: String },
    /// A record was dropped on request.
    TrackingStopped { path: String },
    /// The OS event source can deliver no further events.
    SourceTerminated { reason: String },
}

impl MonitorEvent {
    /// Primary path the notification refers to.
    pub fn path(&self) -> Option<&str> {
        match self {
            MonitorEvent::FolderAdded { path, .. }
            | MonitorEvent::FolderDeleted { path }
            | MonitorEvent::FolderRenamed { path, .. }
            | MonitorEvent::FileAdded { path, .. }
            | MonitorEvent::FileDeleted { path }
            | MonitorEvent::FileModified { path, .. }
            | MonitorEvent::FileRenamed { path, .. }
            | MonitorEvent::FileRenamedAndModified { path, .. }
            | MonitorEvent::WatchInstallFailed { path, .. }
            | MonitorEvent::PredictionTargetNotFound { path }
            | MonitorEvent::TrackingStopped { path } => Some(path),
            MonitorEvent::SourceTerminated { .. } => None,
        }
    }
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Notifications queue in emission order until drained with [`recv`](Self::recv)
/// or [`try_recv`](Self::try_recv).
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
    rx: mpsc::UnboundedReceiver<MonitorEvent>,
}

impl Subscription {
    /// Wait for the next notification. `None` once the bus is gone and drained.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        self.rx.recv().await
    }

    /// Next queued notification, if any.
    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<MonitorEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus for publishing monitor notifications to subscribers.
///
/// Thread-safe; wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    subscribers: RwLock<Vec<(usize, mpsc::UnboundedSender<MonitorEvent>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to notifications emitted from now on.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, tx));
        Subscription {
            bus: Arc::downgrade(self),
            id,
            rx,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while emit holds the lock
        if let Ok(mut guard) = self.subscribers.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Queue a notification for every live subscriber. Never blocks.
    ///
    /// With no subscribers the notification is dropped; closed subscribers are pruned.
    pub fn emit(&self, event: MonitorEvent) {
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            for (id, tx) in subscribers.iter() {
                if tx.send(event.clone()).is_err() {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            self.subscribers
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| !closed.contains(id));
        }
    }
}
