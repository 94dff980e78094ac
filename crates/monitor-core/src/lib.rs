//! monitor-core: change-status reconciliation for monitored files and folders.
//!
//! This crate provides:
//! - A Status Store tracking each item's change relative to a baseline
//! - A Watch Table over a pluggable OS event source
//! - The pure Event Classifier and the Reconciliation Engine applying it
//! - Bootstrap from a prediction list, and a dedicated worker thread
//! - EventSource, Baseline and PathProbe traits with in-memory test doubles

pub mod baseline;
pub mod bootstrap;
pub mod classifier;
pub mod engine;
pub mod events;
pub mod path;
pub mod probe;
pub mod status;
pub mod watch;
pub mod worker;

pub use baseline::{Baseline, EmptyBaseline, InMemoryBaseline};
pub use bootstrap::{BootstrapReport, TargetOutcome};
pub use classifier::{Decision, Ignored, Observation};
pub use engine::{Command, Engine, Flow};
pub use events::{EventBus, MonitorEvent, RawEvent, Subscription};
pub use probe::{InMemoryProbe, NativeProbe, PathKind, PathProbe};
pub use status::{ItemKind, ItemRecord, ItemStatus, StatusSnapshot, StatusStore};
pub use watch::{EventSource, InMemorySource, WatchError, WatchHandle, WatchTable};
pub use worker::{ExitReason, InboxSender, MonitorError, MonitorHandle, WorkerExit};
