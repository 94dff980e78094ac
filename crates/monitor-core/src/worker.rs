//! Monitor worker: a dedicated thread that owns the engine.
//!
//! The event source and the handle both feed one inbox; the worker is its only
//! reader, so raw events and commands are applied in the order they arrive.
//! Bootstrap runs on the worker before the inbox is read.

use crate::baseline::Baseline;
use crate::engine::{Command, Engine, Flow};
use crate::events::RawEvent;
use crate::probe::PathProbe;
use crate::status::StatusSnapshot;
use crate::watch::EventSource;

use std::path::PathBuf;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to spawn monitor thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Monitor thread panicked")]
    WorkerPanicked,

    #[error("Monitor worker is not running")]
    Disconnected,
}

/// Message read by the worker.
#[derive(Debug)]
pub enum WorkerInput {
    Raw(RawEvent),
    Command(Command),
    /// The event source cannot deliver further events
    SourceClosed(String),
}

/// Sending half of the worker inbox. Cheap to clone.
#[derive(Clone)]
pub struct InboxSender {
    tx: mpsc::UnboundedSender<WorkerInput>,
}

impl InboxSender {
    /// Queue a raw event. Returns false once the worker is gone.
    pub fn raw(&self, event: RawEvent) -> bool {
        self.tx.send(WorkerInput::Raw(event)).is_ok()
    }

    /// Report that the event source is exhausted.
    pub fn source_closed(&self, reason: impl Into<String>) -> bool {
        self.tx.send(WorkerInput::SourceClosed(reason.into())).is_ok()
    }

    fn command(&self, command: Command) -> Result<(), MonitorError> {
        self.tx
            .send(WorkerInput::Command(command))
            .map_err(|_| MonitorError::Disconnected)
    }
}

/// Receiving half of the worker inbox.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<WorkerInput>,
}

/// Create the inbox before the engine so the event source can hold a sender.
pub fn inbox() -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender { tx }, Inbox { rx })
}

/// Why the worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Shutdown,
    SourceExhausted(String),
}

/// Final state handed back when the worker thread is joined.
#[derive(Debug)]
pub struct WorkerExit {
    pub reason: ExitReason,
    pub snapshot: StatusSnapshot,
}

/// Start the worker thread.
///
/// The thread re-attaches restored folders, bootstraps `predictions`, then
/// processes the inbox until `Shutdown` or `SourceClosed`.
pub fn spawn<S, B, P>(
    engine: Engine<S, B, P>,
    predictions: Vec<PathBuf>,
    (sender, inbox): (InboxSender, Inbox),
) -> Result<MonitorHandle, MonitorError>
where
    S: EventSource + 'static,
    B: Baseline + 'static,
    P: PathProbe + 'static,
{
    let thread = std::thread::Builder::new()
        .name("file-monitor".into())
        .spawn(move || run(engine, predictions, inbox))?;

    Ok(MonitorHandle {
        inbox: sender,
        thread: Some(thread),
    })
}

fn run<S, B, P>(
    mut engine: Engine<S, B, P>,
    predictions: Vec<PathBuf>,
    mut inbox: Inbox,
) -> WorkerExit
where
    S: EventSource,
    B: Baseline,
    P: PathProbe,
{
    engine.reattach_restored();
    engine.bootstrap(&predictions);
    info!("Monitor worker started");

    let reason = loop {
        match inbox.rx.blocking_recv() {
            Some(WorkerInput::Raw(event)) => {
                engine.handle(event);
            }
            Some(WorkerInput::Command(command)) => {
                if engine.execute(command) == Flow::Stop {
                    break ExitReason::Shutdown;
                }
            }
            Some(WorkerInput::SourceClosed(reason)) => {
                engine.source_closed(&reason);
                break ExitReason::SourceExhausted(reason);
            }
            None => {
                debug!("Monitor inbox closed");
                break ExitReason::Shutdown;
            }
        }
    };

    engine.shutdown();
    WorkerExit {
        reason,
        snapshot: engine.store().snapshot(),
    }
}

/// Control handle for a running worker.
///
/// Dropping the handle asks the worker to stop without waiting for it.
pub struct MonitorHandle {
    inbox: InboxSender,
    thread: Option<JoinHandle<WorkerExit>>,
}

impl MonitorHandle {
    pub fn pause(&self) -> Result<(), MonitorError> {
        self.inbox.command(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), MonitorError> {
        self.inbox.command(Command::Resume)
    }

    pub fn track(&self, path: impl Into<PathBuf>) -> Result<(), MonitorError> {
        self.inbox.command(Command::Track(path.into()))
    }

    pub fn untrack(&self, path: impl Into<PathBuf>) -> Result<(), MonitorError> {
        self.inbox.command(Command::Untrack(path.into()))
    }

    pub fn mark_persisted(&self, path: impl Into<PathBuf>) -> Result<(), MonitorError> {
        self.inbox.command(Command::MarkPersisted(path.into()))
    }

    /// Copy of the store, taken after everything queued before this call.
    pub async fn snapshot(&self) -> Result<StatusSnapshot, MonitorError> {
        let (tx, rx) = oneshot::channel();
        self.inbox.command(Command::Snapshot(tx))?;
        rx.await.map_err(|_| MonitorError::Disconnected)
    }

    /// Sender for event sources started after the worker.
    pub fn inbox(&self) -> InboxSender {
        self.inbox.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stop the worker and wait for it. Blocks until teardown completes.
    pub fn shutdown(mut self) -> Result<WorkerExit, MonitorError> {
        // The worker may already have stopped on its own
        let _ = self.inbox.command(Command::Shutdown);
        let thread = self.thread.take().ok_or(MonitorError::Disconnected)?;
        thread.join().map_err(|_| MonitorError::WorkerPanicked)
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.inbox.command(Command::Shutdown);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::baseline::EmptyBaseline;
    use crate::events::{EventBus, MonitorEvent};
    use crate::probe::InMemoryProbe;
    use crate::status::ItemStatus;
    use crate::watch::InMemorySource;
    use std::sync::Arc;
    use std::time::Duration;

    fn start(
        probe: &InMemoryProbe,
        source: &InMemorySource,
        predictions: Vec<PathBuf>,
    ) -> (MonitorHandle, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let engine = Engine::new(source.clone(), EmptyBaseline, probe.clone(), Arc::clone(&bus));
        let handle = spawn(engine, predictions, inbox()).unwrap();
        (handle, bus)
    }

    #[tokio::test]
    async fn test_bootstrap_runs_before_events() {
        let probe = InMemoryProbe::new();
        probe.add_folder("/docs");
        probe.add_file("/docs/a.txt");
        let source = InMemorySource::new();
        let (handle, _bus) = start(&probe, &source, vec![PathBuf::from("/docs/a.txt")]);

        handle.inbox().raw(RawEvent::modify("/docs/a.txt").unwrap());
        let snapshot = handle.snapshot().await.unwrap();

        let file = snapshot.files.iter().find(|r| r.path == "/docs/a.txt").unwrap();
        assert_eq!(file.status, ItemStatus::Updated);

        let exit = tokio::task::spawn_blocking(move || handle.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::Shutdown);
        assert!(source.active().is_empty());
        assert!(exit.snapshot.folders.iter().all(|r| r.watch.is_none()));
    }

    #[tokio::test]
    async fn test_notifications_arrive_in_order() {
        let probe = InMemoryProbe::new();
        probe.add_folder("/docs");
        let source = InMemorySource::new();
        let (handle, bus) = start(&probe, &source, vec![PathBuf::from("/docs")]);
        let mut sub = bus.subscribe();

        let sender = handle.inbox();
        for i in 0..20 {
            let path = format!("/docs/{}.txt", i);
            probe.add_file(&path);
            sender.raw(RawEvent::add(&path).unwrap());
        }

        let mut received = Vec::new();
        while received.len() < 20 {
            let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(event.path().unwrap_or_default().to_string());
        }
        let expected: Vec<String> = (0..20).map(|i| format!("/docs/{}.txt", i)).collect();
        assert_eq!(received, expected);

        drop(handle);
    }

    #[tokio::test]
    async fn test_source_closed_ends_worker() {
        let probe = InMemoryProbe::new();
        let source = InMemorySource::new();
        let (handle, bus) = start(&probe, &source, Vec::new());
        let mut sub = bus.subscribe();

        handle.inbox().source_closed("channel disconnected");

        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            MonitorEvent::SourceTerminated {
                reason: "channel disconnected".into()
            }
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let exit = tokio::task::spawn_blocking(move || handle.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::SourceExhausted("channel disconnected".into()));
        assert!(exit.snapshot.files.is_empty());
        assert!(exit.snapshot.folders.is_empty());
    }

    #[tokio::test]
    async fn test_commands_apply_in_inbox_order() {
        let probe = InMemoryProbe::new();
        probe.add_folder("/docs");
        probe.add_file("/docs/a.txt");
        probe.add_file("/docs/b.txt");
        probe.add_file("/docs/c.txt");
        let source = InMemorySource::new();
        let (handle, _bus) = start(&probe, &source, vec![PathBuf::from("/docs")]);
        let sender = handle.inbox();

        handle.pause().unwrap();
        sender.raw(RawEvent::add("/docs/b.txt").unwrap());
        handle.resume().unwrap();
        sender.raw(RawEvent::add("/docs/c.txt").unwrap());
        handle.track("/docs/a.txt").unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        let files: Vec<(&str, ItemStatus)> = snapshot
            .files
            .iter()
            .map(|r| (r.path.as_str(), r.status))
            .collect();
        assert_eq!(
            files,
            vec![
                ("/docs/a.txt", ItemStatus::Undefined),
                ("/docs/c.txt", ItemStatus::NewAdded),
            ]
        );

        handle.mark_persisted("/docs/c.txt").unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.pending().count(), 0);

        handle.untrack("/docs/").unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.folders.is_empty());
        assert!(snapshot.files.is_empty());
        assert!(source.active().is_empty());

        let exit = tokio::task::spawn_blocking(move || handle.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::Shutdown);
    }
}
