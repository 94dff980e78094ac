//! Persistence for the status store.
//!
//! Pending statuses survive restarts as a JSON snapshot. Watch handles are
//! session-bound and are not stored; restored folders are re-attached at start.

use anyhow::{Context, Result};
use monitor_core::StatusSnapshot;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for status snapshots.
pub struct StatusStorage {
    /// Path to the storage file.
    path: PathBuf,
}

impl StatusStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last snapshot, if one was saved.
    pub fn load(&self) -> Result<Option<StatusSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {:?}", self.path))?;
        let snapshot: StatusSnapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse state file: {:?}", self.path))?;
        Ok(Some(snapshot))
    }

    /// Save a snapshot. Written to a sibling temp file first, then renamed over.
    pub fn save(&self, snapshot: &StatusSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state file: {:?}", self.path))?;

        debug!(
            "Saved {} folder(s), {} file(s) to {:?}",
            snapshot.folders.len(),
            snapshot.files.len(),
            self.path
        );
        Ok(())
    }
}
