//! Bootstrap: re-attach the monitor to the paths a previous session watched.
//!
//! For each prediction target the containing folder (the target itself for a
//! folder, its parent for a file) gets a watch and an `Undefined` record. A
//! file target additionally gets an `Undefined` file record. A target whose
//! folder is gone is reported and skipped; one failing target never aborts
//! the rest.

use crate::baseline::Baseline;
use crate::engine::Engine;
use crate::events::MonitorEvent;
use crate::path;
use crate::probe::{PathKind, PathProbe};
use crate::status::{ItemKind, ItemStatus};
use crate::watch::EventSource;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of resolving one prediction target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Folder target watched
    Folder(String),
    /// File target: parent watched, file seeded
    File { folder: String, file: String },
    /// Nothing on disk to attach to
    NotFound(String),
    /// Watch installation failed for this folder
    Failed(String),
}

/// Summary of a bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Folders watched, in first-seen order
    pub watched: Vec<String>,
    pub seeded_files: Vec<String>,
    pub not_found: Vec<String>,
    pub failed: Vec<String>,
}

impl BootstrapReport {
    fn record(&mut self, outcome: TargetOutcome) {
        match outcome {
            TargetOutcome::Folder(folder) => self.push_watched(folder),
            TargetOutcome::File { folder, file } => {
                self.push_watched(folder);
                self.seeded_files.push(file);
            }
            TargetOutcome::NotFound(path) => self.not_found.push(path),
            TargetOutcome::Failed(path) => self.failed.push(path),
        }
    }

    fn push_watched(&mut self, folder: String) {
        if !self.watched.contains(&folder) {
            self.watched.push(folder);
        }
    }
}

impl<S: EventSource, B: Baseline, P: PathProbe> Engine<S, B, P> {
    /// Resolve the prediction list. Must run before the first raw event.
    pub fn bootstrap(&mut self, predictions: &[PathBuf]) -> BootstrapReport {
        let mut report = BootstrapReport::default();
        for target in predictions {
            report.record(self.resolve_target(target));
        }

        info!(
            "Bootstrap: {} folder(s) watched, {} file(s) seeded, {} not found, {} failed",
            report.watched.len(),
            report.seeded_files.len(),
            report.not_found.len(),
            report.failed.len()
        );
        report
    }

    /// Resolve a single prediction target.
    pub fn resolve_target(&mut self, target: &Path) -> TargetOutcome {
        let file = path::normalize_file(target);

        match self.probe.probe(&file) {
            PathKind::Folder => {
                let folder = path::normalize_folder(target);
                if self.seed_folder(&folder) {
                    TargetOutcome::Folder(folder)
                } else {
                    TargetOutcome::Failed(folder)
                }
            }
            PathKind::File | PathKind::Hidden | PathKind::Other => self.seed_file_target(file),
            // A missing file is still attached through its folder
            PathKind::Missing
                if !path::has_trailing_separator(target) && self.parent_exists(&file) =>
            {
                debug!("Prediction target {} missing, attaching via parent", file);
                self.seed_file_target(file)
            }
            PathKind::Missing => {
                let missing = if path::has_trailing_separator(target) {
                    path::normalize_folder(target)
                } else {
                    file
                };
                warn!("Prediction target not found: {}", missing);
                self.emit(MonitorEvent::PredictionTargetNotFound {
                    path: missing.clone(),
                });
                TargetOutcome::NotFound(missing)
            }
        }
    }

    fn parent_exists(&self, file: &str) -> bool {
        path::parent_folder(file)
            .is_some_and(|parent| self.probe.probe(&parent) == PathKind::Folder)
    }

    fn seed_file_target(&mut self, file: String) -> TargetOutcome {
        let Some(folder) = path::parent_folder(&file) else {
            return TargetOutcome::NotFound(file);
        };
        if !self.seed_folder(&folder) {
            return TargetOutcome::Failed(folder);
        }
        self.store.upsert(ItemKind::File, &file, |_| {});
        TargetOutcome::File { folder, file }
    }

    /// Install the folder's watch and make sure it has a record.
    ///
    /// An existing record keeps its status. On failure nothing is recorded.
    fn seed_folder(&mut self, folder: &str) -> bool {
        match self.watches.install(folder) {
            Ok(handle) => {
                self.store.upsert(ItemKind::Folder, folder, |r| r.watch = Some(handle));
                debug!("Attached {} to {}", handle, folder);
                true
            }
            Err(e) => {
                self.watch_failed(folder.to_string(), e.to_string());
                false
            }
        }
    }

    /// Install watches for restored folder records that are live but unwatched.
    pub fn reattach_restored(&mut self) -> BootstrapReport {
        let mut detached: Vec<String> = self
            .store
            .iter(ItemKind::Folder)
            .filter(|r| r.status != ItemStatus::Deleted && r.watch.is_none())
            .map(|r| r.path.clone())
            .collect();
        detached.sort();

        let mut report = BootstrapReport::default();
        for folder in detached {
            if self.seed_folder(&folder) {
                report.record(TargetOutcome::Folder(folder));
            } else {
                report.record(TargetOutcome::Failed(folder));
            }
        }

        if !report.watched.is_empty() || !report.failed.is_empty() {
            info!(
                "Re-attached {} restored folder(s), {} failed",
                report.watched.len(),
                report.failed.len()
            );
        }
        report
    }
}
