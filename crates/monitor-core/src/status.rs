//! Status Store: in-memory record of each monitored item's change status.
//!
//! Pure data plus accessors. All policy lives in the classifier and all
//! mutations come from the engine; the store never emits notifications.

use crate::path;
use crate::watch::WatchHandle;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of monitored item. Folders and files live in separate maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Folder,
    File,
}

/// Change status of an item relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    /// Known item, no pending change
    #[default]
    Undefined,
    /// Appeared this session with no baseline counterpart
    NewAdded,
    /// Content changed (or re-appeared with a baseline counterpart)
    Updated,
    /// Removed from disk
    Deleted,
    /// Baseline-known item under a new name
    Renamed,
    /// Renamed file whose content also changed (files only)
    UpdatedAndRenamed,
}

impl ItemStatus {
    /// Whether the status records a pending rename.
    pub fn is_renamed(self) -> bool {
        matches!(self, ItemStatus::Renamed | ItemStatus::UpdatedAndRenamed)
    }
}

/// A monitored folder or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    /// Normalized path (store key)
    pub path: String,
    /// Current change status
    pub status: ItemStatus,
    /// Leaf name before a pending rename
    pub old_name: Option<String>,
    /// Leaf name after a pending rename
    pub new_name: Option<String>,
    /// Watch handle, folders only. Session-bound, never serialized.
    #[serde(skip)]
    pub watch: Option<WatchHandle>,
}

impl ItemRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ItemStatus::Undefined,
            old_name: None,
            new_name: None,
            watch: None,
        }
    }

    /// Record a rename. Both names are always set together.
    pub fn set_rename(&mut self, old_name: String, new_name: String) {
        self.old_name = Some(old_name);
        self.new_name = Some(new_name);
    }

    pub fn clear_rename(&mut self) {
        self.old_name = None;
        self.new_name = None;
    }
}

/// Serializable view of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub folders: Vec<ItemRecord>,
    pub files: Vec<ItemRecord>,
}

impl StatusSnapshot {
    /// Records that carry a pending change (anything but `Undefined`).
    pub fn pending(&self) -> impl Iterator<Item = &ItemRecord> {
        self.folders
            .iter()
            .chain(self.files.iter())
            .filter(|r| r.status != ItemStatus::Undefined)
    }
}

/// Hash-keyed store of folder and file records.
#[derive(Debug, Default)]
pub struct StatusStore {
    folders: HashMap<String, ItemRecord>,
    files: HashMap<String, ItemRecord>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: ItemKind) -> &HashMap<String, ItemRecord> {
        match kind {
            ItemKind::Folder => &self.folders,
            ItemKind::File => &self.files,
        }
    }

    fn map_mut(&mut self, kind: ItemKind) -> &mut HashMap<String, ItemRecord> {
        match kind {
            ItemKind::Folder => &mut self.folders,
            ItemKind::File => &mut self.files,
        }
    }

    /// Status of an item, if tracked.
    pub fn get(&self, kind: ItemKind, path: &str) -> Option<ItemStatus> {
        self.map(kind).get(path).map(|r| r.status)
    }

    /// Full record of an item, if tracked.
    pub fn record(&self, kind: ItemKind, path: &str) -> Option<&ItemRecord> {
        self.map(kind).get(path)
    }

    pub fn exists(&self, kind: ItemKind, path: &str) -> bool {
        self.map(kind).contains_key(path)
    }

    /// Insert the record if missing (status `Undefined`), then apply `mutation`.
    pub fn upsert<F>(&mut self, kind: ItemKind, path: &str, mutation: F)
    where
        F: FnOnce(&mut ItemRecord),
    {
        let record = self
            .map_mut(kind)
            .entry(path.to_string())
            .or_insert_with(|| ItemRecord::new(path));
        mutation(record);
    }

    pub fn remove(&mut self, kind: ItemKind, path: &str) -> Option<ItemRecord> {
        self.map_mut(kind).remove(path)
    }

    /// Move a record to a new key. Returns false if `from` is untracked or `to` is taken.
    pub fn rekey(&mut self, kind: ItemKind, from: &str, to: &str) -> bool {
        let map = self.map_mut(kind);
        if map.contains_key(to) {
            return false;
        }
        match map.remove(from) {
            Some(mut record) => {
                record.path = to.to_string();
                map.insert(to.to_string(), record);
                true
            }
            None => false,
        }
    }

    /// Re-key every record strictly below folder `from` to live below folder `to`.
    ///
    /// Both arguments are folder-form paths. Statuses are untouched. Returns the
    /// `(old, new)` keys of migrated folder records so watches can follow.
    pub fn rekey_descendants(&mut self, from: &str, to: &str) -> Vec<(String, String)> {
        let mut moved_folders = Vec::new();

        for kind in [ItemKind::Folder, ItemKind::File] {
            let map = self.map_mut(kind);
            let keys: Vec<String> = map
                .keys()
                .filter(|k| path::is_descendant(k, from))
                .cloned()
                .collect();

            for old_key in keys {
                let new_key = format!("{}{}", to, &old_key[from.len()..]);
                if map.contains_key(&new_key) {
                    continue;
                }
                if let Some(mut record) = map.remove(&old_key) {
                    record.path = new_key.clone();
                    map.insert(new_key.clone(), record);
                    if kind == ItemKind::Folder {
                        moved_folders.push((old_key, new_key));
                    }
                }
            }
        }

        moved_folders
    }

    /// Keys of the records of `kind` strictly below folder `folder`, sorted.
    pub fn descendants(&self, kind: ItemKind, folder: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .map(kind)
            .keys()
            .filter(|k| path::is_descendant(k, folder))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn iter(&self, kind: ItemKind) -> impl Iterator<Item = &ItemRecord> {
        self.map(kind).values()
    }

    pub fn len(&self, kind: ItemKind) -> usize {
        self.map(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }

    /// Copy of all records, sorted by path for stable output.
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut folders: Vec<ItemRecord> = self.folders.values().cloned().collect();
        let mut files: Vec<ItemRecord> = self.files.values().cloned().collect();
        folders.sort_by(|a, b| a.path.cmp(&b.path));
        files.sort_by(|a, b| a.path.cmp(&b.path));
        StatusSnapshot { folders, files }
    }

    /// Rebuild a store from a snapshot. Watch handles start out empty.
    pub fn restore(snapshot: StatusSnapshot) -> Self {
        let mut store = Self::new();
        for mut record in snapshot.folders {
            record.watch = None;
            store.folders.insert(record.path.clone(), record);
        }
        for mut record in snapshot.files {
            record.watch = None;
            store.files.insert(record.path.clone(), record);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_undefined_record() {
        let mut store = StatusStore::new();
        store.upsert(ItemKind::File, "/docs/a.txt", |_| {});

        assert!(store.exists(ItemKind::File, "/docs/a.txt"));
        assert_eq!(store.get(ItemKind::File, "/docs/a.txt"), Some(ItemStatus::Undefined));
        assert!(!store.exists(ItemKind::Folder, "/docs/a.txt"));
    }

    #[test]
    fn test_upsert_mutates_existing() {
        let mut store = StatusStore::new();
        store.upsert(ItemKind::File, "/docs/a.txt", |r| r.status = ItemStatus::NewAdded);
        store.upsert(ItemKind::File, "/docs/a.txt", |r| r.status = ItemStatus::Updated);

        assert_eq!(store.len(ItemKind::File), 1);
        assert_eq!(store.get(ItemKind::File, "/docs/a.txt"), Some(ItemStatus::Updated));
    }

    #[test]
    fn test_remove() {
        let mut store = StatusStore::new();
        store.upsert(ItemKind::Folder, "/docs/", |_| {});

        let removed = store.remove(ItemKind::Folder, "/docs/").unwrap();
        assert_eq!(removed.path, "/docs/");
        assert!(store.is_empty());
        assert!(store.remove(ItemKind::Folder, "/docs/").is_none());
    }

    #[test]
    fn test_rekey_refuses_collision() {
        let mut store = StatusStore::new();
        store.upsert(ItemKind::File, "/a.txt", |_| {});
        store.upsert(ItemKind::File, "/b.txt", |_| {});

        assert!(!store.rekey(ItemKind::File, "/a.txt", "/b.txt"));
        assert!(!store.rekey(ItemKind::File, "/missing.txt", "/c.txt"));
        assert!(store.rekey(ItemKind::File, "/a.txt", "/c.txt"));
        assert_eq!(store.record(ItemKind::File, "/c.txt").unwrap().path, "/c.txt");
        assert!(!store.exists(ItemKind::File, "/a.txt"));
    }

    #[test]
    fn test_descendants() {
        let mut store = StatusStore::new();
        store.upsert(ItemKind::Folder, "/docs/", |_| {});
        store.upsert(ItemKind::Folder, "/docs/sub/inner/", |_| {});
        store.upsert(ItemKind::Folder, "/docs/sub/", |_| {});
        store.upsert(ItemKind::File, "/docs/sub/a.txt", |_| {});
        store.upsert(ItemKind::File, "/documents/b.txt", |_| {});

        assert_eq!(
            store.descendants(ItemKind::Folder, "/docs/"),
            vec!["/docs/sub/".to_string(), "/docs/sub/inner/".to_string()]
        );
        assert_eq!(
            store.descendants(ItemKind::File, "/docs/"),
            vec!["/docs/sub/a.txt".to_string()]
        );
        assert!(store.descendants(ItemKind::Folder, "/docs/sub/inner/").is_empty());
    }

    #[test]
    fn test_rekey_descendants() {
        let mut store = StatusStore::new();
        store.upsert(ItemKind::Folder, "/docs/", |_| {});
        store.upsert(ItemKind::Folder, "/docs/sub/", |_| {});
        store.upsert(ItemKind::File, "/docs/sub/a.txt", |r| r.status = ItemStatus::Updated);
        store.upsert(ItemKind::File, "/documents/b.txt", |_| {});

        let moved = store.rekey_descendants("/docs/", "/papers/");

        assert_eq!(moved, vec![("/docs/sub/".to_string(), "/papers/sub/".to_string())]);
        assert!(store.exists(ItemKind::Folder, "/docs/"));
        assert!(store.exists(ItemKind::Folder, "/papers/sub/"));
        assert_eq!(
            store.get(ItemKind::File, "/papers/sub/a.txt"),
            Some(ItemStatus::Updated)
        );
        assert!(store.exists(ItemKind::File, "/documents/b.txt"));
    }

    #[test]
    fn test_snapshot_restore_drops_watches() {
        let mut store = StatusStore::new();
        store.upsert(ItemKind::Folder, "/docs/", |r| r.watch = Some(WatchHandle::new(7)));
        store.upsert(ItemKind::File, "/docs/a.txt", |r| {
            r.status = ItemStatus::Renamed;
            r.set_rename("old.txt".into(), "a.txt".into());
        });

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let snapshot: StatusSnapshot = serde_json::from_str(&json).unwrap();
        let restored = StatusStore::restore(snapshot);

        assert!(restored.record(ItemKind::Folder, "/docs/").unwrap().watch.is_none());
        let file = restored.record(ItemKind::File, "/docs/a.txt").unwrap();
        assert_eq!(file.status, ItemStatus::Renamed);
        assert_eq!(file.old_name.as_deref(), Some("old.txt"));
        assert_eq!(file.new_name.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_snapshot_pending() {
        let mut store = StatusStore::new();
        store.upsert(ItemKind::Folder, "/docs/", |_| {});
        store.upsert(ItemKind::File, "/docs/a.txt", |r| r.status = ItemStatus::Deleted);

        let snapshot = store.snapshot();
        let pending: Vec<_> = snapshot.pending().map(|r| r.path.as_str()).collect();
        assert_eq!(pending, vec!["/docs/a.txt"]);
    }
}
