//! monitor-daemon library: Exposes the daemon components for testing.
//!
//! This is a thin library layer over the notify-backed event source and the
//! JSON-file baseline, config and persistence used by the `fs-monitor` binary.

pub mod baseline;
pub mod config;
pub mod persistence;
pub mod watcher;

// Re-export key types for convenience
pub use baseline::FileBaseline;
pub use config::Config;
pub use persistence::StatusStorage;
pub use watcher::{EventNormalizer, NotifySource};
