//! Baseline backed by a JSON file.
//!
//! The file lists the folders and files the storage engine has persisted:
//!
//! ```json
//! { "folders": ["/docs/"], "files": ["/docs/report.txt"] }
//! ```
//!
//! The storage engine rewrites it on its own schedule, so the daemon calls
//! [`FileBaseline::reload`] periodically.

use anyhow::{Context, Result};
use monitor_core::{path, Baseline, ItemKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

/// On-disk form of the baseline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineRecord {
    #[serde(default)]
    pub folders: Vec<PathBuf>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct Entries {
    folders: HashSet<String>,
    files: HashSet<String>,
}

impl From<BaselineRecord> for Entries {
    fn from(record: BaselineRecord) -> Self {
        Self {
            folders: record.folders.iter().map(path::normalize_folder).collect(),
            files: record.files.iter().map(path::normalize_file).collect(),
        }
    }
}

/// `Baseline` answered from a JSON file.
#[derive(Debug, Default)]
pub struct FileBaseline {
    path: Option<PathBuf>,
    entries: RwLock<Entries>,
}

impl FileBaseline {
    /// Baseline with no file behind it. Every item counts as new.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file yields an empty baseline.
    pub fn load(path: &Path) -> Result<Self> {
        let baseline = Self {
            path: Some(path.to_path_buf()),
            entries: RwLock::new(Entries::default()),
        };
        baseline.reload()?;
        info!("Baseline loaded from {:?}: {} entries", path, baseline.len());
        Ok(baseline)
    }

    /// Re-read the file.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let record = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read baseline file: {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse baseline file: {:?}", path))?
        } else {
            debug!("No baseline file at {:?}", path);
            BaselineRecord::default()
        };

        let entries = Entries::from(record);
        let (folders, files) = (entries.folders.len(), entries.files.len());
        *self.entries.write().unwrap_or_else(|e| e.into_inner()) = entries;
        debug!("Baseline read: {} folder(s), {} file(s)", folders, files);
        Ok(())
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.folders.len() + entries.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Baseline for FileBaseline {
    fn existed_in_baseline(&self, kind: ItemKind, path: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match kind {
            ItemKind::Folder => entries.folders.contains(path),
            ItemKind::File => entries.files.contains(path),
        }
    }
}
