//! OS event source backed by `notify`.
//!
//! Each monitored folder gets its own non-recursive watch. A bridge thread
//! turns notify events into the four raw event shapes and feeds them into the
//! monitor inbox.
//!
//! Watches are registered by path, so after a folder rename the engine must
//! re-register them (`follows_renames() == false`).

use monitor_core::worker::InboxSender;
use monitor_core::{EventSource, RawEvent, WatchError, WatchHandle};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Upper bound on the bridge thread's idle wait.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Rename-from events waiting for their rename-to half.
const MAX_PENDING_RENAMES: usize = 512;

/// `EventSource` over `notify::RecommendedWatcher`.
pub struct NotifySource {
    watcher: notify::RecommendedWatcher,
    next_id: u64,
    handles: HashMap<WatchHandle, PathBuf>,
}

impl NotifySource {
    /// Create the watcher and start its bridge thread.
    ///
    /// Unpaired rename-from events older than `rename_window` are reported as deletes.
    pub fn new(inbox: InboxSender, rename_window: Duration) -> Result<Self, WatchError> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let watcher = notify::recommended_watcher(raw_tx).map_err(|e| map_error(e, Path::new("")))?;

        std::thread::Builder::new()
            .name("notify-bridge".into())
            .spawn(move || bridge(raw_rx, inbox, EventNormalizer::new(rename_window)))
            .map_err(|e| WatchError::Backend(e.to_string()))?;

        Ok(Self {
            watcher,
            next_id: 0,
            handles: HashMap::new(),
        })
    }
}

impl EventSource for NotifySource {
    fn install(&mut self, path: &Path, recursive: bool) -> Result<WatchHandle, WatchError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watcher.watch(path, mode).map_err(|e| map_error(e, path))?;

        self.next_id += 1;
        let handle = WatchHandle::new(self.next_id);
        self.handles.insert(handle, path.to_path_buf());
        debug!("Watching {:?} as {}", path, handle);
        Ok(handle)
    }

    fn uninstall(&mut self, handle: WatchHandle) -> Result<(), WatchError> {
        let path = self
            .handles
            .remove(&handle)
            .ok_or(WatchError::UnknownHandle(handle))?;
        self.watcher.unwatch(&path).map_err(|e| map_error(e, &path))
    }
}

fn map_error(error: notify::Error, path: &Path) -> WatchError {
    let shown = path.to_string_lossy().to_string();
    match error.kind {
        notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => {
            WatchError::PathUnavailable(shown)
        }
        notify::ErrorKind::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound => {
            WatchError::PathUnavailable(shown)
        }
        notify::ErrorKind::Io(ref io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            WatchError::PermissionDenied(shown)
        }
        _ => WatchError::Backend(format!("{}: {}", shown, error)),
    }
}

/// Bridge loop: notify channel in, monitor inbox out.
fn bridge(
    raw_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    inbox: InboxSender,
    mut normalizer: EventNormalizer,
) {
    loop {
        let now = Instant::now();
        let wait = normalizer
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(IDLE_WAIT);

        let events = match raw_rx.recv_timeout(wait) {
            Ok(Ok(event)) => normalizer.push(event, Instant::now()),
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => normalizer.flush(Instant::now()),
            Err(RecvTimeoutError::Disconnected) => {
                for event in normalizer.flush_all() {
                    inbox.raw(event);
                }
                debug!("Notify channel closed");
                inbox.source_closed("notify event channel closed");
                return;
            }
        };

        for event in events {
            if !inbox.raw(event) {
                debug!("Monitor inbox closed, stopping bridge");
                return;
            }
        }
    }
}

#[derive(Debug)]
struct PendingRename {
    tracker: Option<usize>,
    path: PathBuf,
    at: Instant,
}

/// Turns notify events into raw monitor events.
///
/// - create → `Add`, remove → `Delete`, data modify → `Modify`
/// - rename pairs in one folder → `Move`, across folders → `Delete` + `Add`
/// - unpaired rename-from past the window → `Delete`, unpaired rename-to → `Add`
/// - metadata and access events are dropped
#[derive(Debug)]
pub struct EventNormalizer {
    window: Duration,
    pending: VecDeque<PendingRename>,
    /// Trackers already emitted from a From/To pair, so the follow-up `Both` is skipped
    paired: VecDeque<(usize, Instant)>,
}

impl EventNormalizer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: VecDeque::new(),
            paired: VecDeque::new(),
        }
    }

    /// When the oldest pending rename-from expires.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|p| p.at + self.window)
    }

    pub fn push(&mut self, event: notify::Event, now: Instant) -> Vec<RawEvent> {
        let mut out = self.flush(now);

        if event.need_rescan() {
            warn!("File watcher dropped events, rescan needed: {:?}", event.paths);
        }
        let tracker = event.tracker();

        match event.kind {
            EventKind::Create(_) => {
                out.extend(event.paths.iter().filter_map(|p| RawEvent::add(&display(p))))
            }
            EventKind::Remove(_) => {
                out.extend(event.paths.iter().filter_map(|p| RawEvent::delete(&display(p))))
            }
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                out.extend(event.paths.iter().filter_map(|p| RawEvent::modify(&display(p))))
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.push_rename(mode, tracker, event.paths, now, &mut out)
            }
            EventKind::Modify(_) | EventKind::Access(_) => {}
            EventKind::Any | EventKind::Other => {
                debug!("Unclassified watcher event: {:?}", event.kind);
            }
        }

        out
    }

    fn push_rename(
        &mut self,
        mode: RenameMode,
        tracker: Option<usize>,
        paths: Vec<PathBuf>,
        now: Instant,
        out: &mut Vec<RawEvent>,
    ) {
        match mode {
            RenameMode::From => {
                for path in paths {
                    self.pending.push_back(PendingRename { tracker, path, at: now });
                }
                out.extend(self.evict_overflow());
            }
            RenameMode::To => {
                for to in paths {
                    match self.take_pending(tracker) {
                        Some(from) => {
                            if let Some(t) = tracker {
                                self.paired.push_back((t, now));
                            }
                            out.extend(moved(&from, &to));
                        }
                        None => out.extend(RawEvent::add(&display(&to))),
                    }
                }
            }
            RenameMode::Both => {
                let paired = tracker.and_then(|t| self.paired.iter().position(|(p, _)| *p == t));
                if let Some(pos) = paired {
                    self.paired.remove(pos);
                    return;
                }
                if let [from, to] = paths.as_slice() {
                    out.extend(moved(from, to));
                }
            }
            // No pairing information: report by what is on disk now
            RenameMode::Any | RenameMode::Other => {
                for path in paths {
                    let shown = display(&path);
                    let event = if path.exists() {
                        RawEvent::add(&shown)
                    } else {
                        RawEvent::delete(&shown)
                    };
                    out.extend(event);
                }
            }
        }
    }

    fn take_pending(&mut self, tracker: Option<usize>) -> Option<PathBuf> {
        let pos = match tracker {
            Some(t) => self.pending.iter().position(|p| p.tracker == Some(t))?,
            None => self.pending.iter().position(|p| p.tracker.is_none())?,
        };
        self.pending.remove(pos).map(|p| p.path)
    }

    fn evict_overflow(&mut self) -> Vec<RawEvent> {
        let mut out = Vec::new();
        while self.pending.len() > MAX_PENDING_RENAMES {
            if let Some(expired) = self.pending.pop_front() {
                out.extend(RawEvent::delete(&display(&expired.path)));
            }
        }
        out
    }

    /// Report rename-froms whose window has passed as deletes.
    pub fn flush(&mut self, now: Instant) -> Vec<RawEvent> {
        let mut out = Vec::new();
        while let Some(front) = self.pending.front() {
            if now.saturating_duration_since(front.at) < self.window {
                break;
            }
            if let Some(expired) = self.pending.pop_front() {
                out.extend(RawEvent::delete(&display(&expired.path)));
            }
        }
        self.paired
            .retain(|(_, at)| now.saturating_duration_since(*at) < self.window);
        out
    }

    /// Report every pending rename-from as a delete.
    pub fn flush_all(&mut self) -> Vec<RawEvent> {
        self.paired.clear();
        self.pending
            .drain(..)
            .filter_map(|p| RawEvent::delete(&display(&p.path)))
            .collect()
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Same-folder renames become a move; anything else a delete plus an add.
fn moved(from: &Path, to: &Path) -> Vec<RawEvent> {
    let (from, to) = (display(from), display(to));
    match RawEvent::rename(&from, &to) {
        Some(event) => vec![event],
        None => RawEvent::delete(&from).into_iter().chain(RawEvent::add(&to)).collect(),
    }
}
