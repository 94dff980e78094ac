//! Event Classifier: decides the next status of an item for one observation.
//!
//! Pure policy. Given an observation (raw event already resolved to normalized
//! paths and probed on disk), the current store and the baseline query, return
//! a [`Decision`] for the engine to apply. Nothing here mutates state.
//!
//! The rules treat `NewAdded` items as session-transient: they never become
//! `Deleted`, their renames are not reportable, and modifies do not promote
//! them to `Updated`. Only baseline-known items produce reportable outcomes.

use crate::baseline::Baseline;
use crate::path;
use crate::probe::PathKind;
use crate::status::{ItemKind, ItemStatus, StatusStore};

/// A raw event resolved to full paths, with the target probed on disk.
///
/// Paths are in file form (no trailing separator); the classifier derives
/// folder keys itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Added { path: String, target: PathKind },
    Deleted { path: String },
    Modified { path: String },
    Moved {
        from: String,
        to: String,
        target: PathKind,
    },
}

/// Status and names recorded by a reportable rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    pub status: ItemStatus,
    pub old_name: String,
    pub new_name: String,
}

/// Why an observation produced no mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// No record for the referenced path
    Untracked,
    /// Hidden files are excluded from file-event processing
    Hidden,
    /// Neither a folder nor a regular file
    Unsupported,
    /// Target disappeared before it could be classified
    Vanished,
    /// Move destination is already tracked
    RenameCollision,
    /// Modify on a `NewAdded` file
    Absorbed,
    /// Delete for a record that is already `Deleted`
    AlreadyDeleted,
}

/// Mutation to apply for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Install (or keep) a watch on the folder, then record `status`.
    AddFolder { path: String, status: ItemStatus },
    AddFile { path: String, status: ItemStatus },
    /// Drop a `NewAdded` folder record and its watch without trace.
    PurgeFolder { path: String },
    PurgeFile { path: String },
    /// Mark a folder `Deleted` and uninstall its watch.
    DeleteFolder { path: String },
    DeleteFile { path: String },
    ModifyFile { path: String, status: ItemStatus },
    /// Migrate the record from `from` to `to`. `None` outcome is a silent re-key.
    RenameFolder {
        from: String,
        to: String,
        outcome: Option<RenameOutcome>,
    },
    RenameFile {
        from: String,
        to: String,
        outcome: Option<RenameOutcome>,
    },
    Ignore(Ignored),
}

/// Classify one observation against the current store and baseline.
pub fn classify(
    observation: &Observation,
    store: &StatusStore,
    baseline: &dyn Baseline,
) -> Decision {
    match observation {
        Observation::Added { path, target } => classify_add(path, *target, store, baseline),
        Observation::Deleted { path } => classify_delete(path, store),
        Observation::Modified { path } => classify_modify(path, store),
        Observation::Moved { from, to, target } => classify_move(from, to, *target, store),
    }
}

fn classify_add(
    path: &str,
    target: PathKind,
    store: &StatusStore,
    baseline: &dyn Baseline,
) -> Decision {
    match target {
        PathKind::Folder => {
            let key = path::folder_key(path);
            let status = match store.get(ItemKind::Folder, &key) {
                Some(ItemStatus::NewAdded) => ItemStatus::NewAdded,
                Some(_) => ItemStatus::Updated,
                None if baseline.existed_in_baseline(ItemKind::Folder, &key) => ItemStatus::Updated,
                None => ItemStatus::NewAdded,
            };
            Decision::AddFolder { path: key, status }
        }
        PathKind::File => {
            let status = if baseline.existed_in_baseline(ItemKind::File, path) {
                ItemStatus::Updated
            } else {
                ItemStatus::NewAdded
            };
            Decision::AddFile {
                path: path.to_string(),
                status,
            }
        }
        PathKind::Hidden => Decision::Ignore(Ignored::Hidden),
        PathKind::Missing => Decision::Ignore(Ignored::Vanished),
        PathKind::Other => Decision::Ignore(Ignored::Unsupported),
    }
}

fn classify_delete(path: &str, store: &StatusStore) -> Decision {
    let key = path::folder_key(path);
    let folder = store.get(ItemKind::Folder, &key);
    match folder {
        Some(ItemStatus::NewAdded) => return Decision::PurgeFolder { path: key },
        // A file may have taken the place of the deleted folder
        Some(ItemStatus::Deleted) | None => {}
        Some(_) => return Decision::DeleteFolder { path: key },
    }

    match store.get(ItemKind::File, path) {
        Some(ItemStatus::NewAdded) => Decision::PurgeFile {
            path: path.to_string(),
        },
        Some(ItemStatus::Deleted) => Decision::Ignore(Ignored::AlreadyDeleted),
        Some(_) => Decision::DeleteFile {
            path: path.to_string(),
        },
        None if folder.is_some() => Decision::Ignore(Ignored::AlreadyDeleted),
        None => Decision::Ignore(Ignored::Untracked),
    }
}

fn classify_modify(path: &str, store: &StatusStore) -> Decision {
    let status = match store.get(ItemKind::File, path) {
        None => return Decision::Ignore(Ignored::Untracked),
        Some(ItemStatus::NewAdded) => return Decision::Ignore(Ignored::Absorbed),
        // Modify never downgrades a pending rename
        Some(ItemStatus::Renamed) | Some(ItemStatus::UpdatedAndRenamed) => {
            ItemStatus::UpdatedAndRenamed
        }
        Some(_) => ItemStatus::Updated,
    };
    Decision::ModifyFile {
        path: path.to_string(),
        status,
    }
}

fn classify_move(from: &str, to: &str, target: PathKind, store: &StatusStore) -> Decision {
    let kind = match target {
        PathKind::Folder => ItemKind::Folder,
        PathKind::File => ItemKind::File,
        PathKind::Hidden => return Decision::Ignore(Ignored::Hidden),
        PathKind::Other => return Decision::Ignore(Ignored::Unsupported),
        // Renamed and gone again: fall back to what the old path was known as
        PathKind::Missing => {
            if store.exists(ItemKind::Folder, &path::folder_key(from)) {
                ItemKind::Folder
            } else if store.exists(ItemKind::File, from) {
                ItemKind::File
            } else {
                return Decision::Ignore(Ignored::Untracked);
            }
        }
    };

    let (from_key, to_key) = match kind {
        ItemKind::Folder => (path::folder_key(from), path::folder_key(to)),
        ItemKind::File => (from.to_string(), to.to_string()),
    };

    let Some(record) = store.record(kind, &from_key) else {
        return Decision::Ignore(Ignored::Untracked);
    };
    if store.exists(kind, &to_key) {
        return Decision::Ignore(Ignored::RenameCollision);
    }

    let outcome = if record.status == ItemStatus::NewAdded {
        None
    } else {
        let status = match (kind, record.status) {
            (ItemKind::File, ItemStatus::Updated)
            | (ItemKind::File, ItemStatus::UpdatedAndRenamed) => {
                ItemStatus::UpdatedAndRenamed
            }
            _ => ItemStatus::Renamed,
        };
        // A chain of renames keeps the name the baseline knows
        let old_name = match (&record.old_name, record.status.is_renamed()) {
            (Some(name), true) => name.clone(),
            _ => path::leaf_name(from).to_string(),
        };
        Some(RenameOutcome {
            status,
            old_name,
            new_name: path::leaf_name(to).to_string(),
        })
    };

    match kind {
        ItemKind::Folder => Decision::RenameFolder {
            from: from_key,
            to: to_key,
            outcome,
        },
        ItemKind::File => Decision::RenameFile {
            from: from_key,
            to: to_key,
            outcome,
        },
    }
}
