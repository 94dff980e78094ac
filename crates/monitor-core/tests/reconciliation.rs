//! Reconciliation tests for monitor-core.
//!
//! Drives the engine through its public API with in-memory doubles for the
//! event source, the baseline and the filesystem probe.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;

use monitor_core::{
    Command, Decision, Engine, EventBus, Ignored, InMemoryBaseline, InMemoryProbe, InMemorySource,
    ItemKind, ItemStatus, MonitorEvent, RawEvent, StatusStore, Subscription,
};

/// Engine wired to in-memory doubles, with a subscription opened up front.
struct Harness {
    engine: Engine<InMemorySource, InMemoryBaseline, InMemoryProbe>,
    source: InMemorySource,
    baseline: InMemoryBaseline,
    probe: InMemoryProbe,
    sub: Subscription,
}

impl Harness {
    fn new() -> Self {
        Self::with_source(InMemorySource::new())
    }

    fn with_source(source: InMemorySource) -> Self {
        let baseline = InMemoryBaseline::new();
        let probe = InMemoryProbe::new();
        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe();
        let engine = Engine::new(source.clone(), baseline.clone(), probe.clone(), bus);
        Self {
            engine,
            source,
            baseline,
            probe,
            sub,
        }
    }

    /// Bootstrap a watched `/docs/` folder.
    fn with_docs() -> Self {
        let mut h = Self::new();
        h.probe.add_folder("/docs");
        h.engine.bootstrap(&[PathBuf::from("/docs/")]);
        h
    }

    fn add_file(&mut self, path: &str) -> Option<Decision> {
        self.probe.add_file(path);
        self.engine.handle(RawEvent::add(path).unwrap())
    }

    fn add_folder(&mut self, path: &str) -> Option<Decision> {
        self.probe.add_folder(path);
        self.engine.handle(RawEvent::add(path).unwrap())
    }

    fn delete(&mut self, path: &str) -> Option<Decision> {
        self.probe.remove(path);
        self.engine.handle(RawEvent::delete(path).unwrap())
    }

    fn modify(&mut self, path: &str) -> Option<Decision> {
        self.engine.handle(RawEvent::modify(path).unwrap())
    }

    fn rename(&mut self, from: &str, to: &str) -> Option<Decision> {
        self.probe.rename(from, to);
        self.engine.handle(RawEvent::rename(from, to).unwrap())
    }

    fn file_status(&self, path: &str) -> Option<ItemStatus> {
        self.engine.store().get(ItemKind::File, path)
    }

    fn folder_status(&self, path: &str) -> Option<ItemStatus> {
        self.engine.store().get(ItemKind::Folder, path)
    }

    fn events(&mut self) -> Vec<MonitorEvent> {
        self.sub.drain()
    }
}

// ==================== Classification properties ====================

#[test]
fn test_redundant_add_is_idempotent() {
    let mut once = Harness::with_docs();
    once.add_file("/docs/a.txt");

    let mut twice = Harness::with_docs();
    twice.add_file("/docs/a.txt");
    twice.add_file("/docs/a.txt");

    assert_eq!(once.file_status("/docs/a.txt"), Some(ItemStatus::NewAdded));
    assert_eq!(twice.file_status("/docs/a.txt"), once.file_status("/docs/a.txt"));
}

#[test]
fn test_new_file_add_then_delete_is_purged() {
    let mut h = Harness::with_docs();
    h.add_file("/docs/tmp.txt");
    h.events();

    h.delete("/docs/tmp.txt");

    assert!(!h.engine.store().exists(ItemKind::File, "/docs/tmp.txt"));
    assert!(h.events().is_empty(), "purge must not notify");
}

#[test]
fn test_baseline_known_add_is_updated() {
    let mut h = Harness::with_docs();
    h.baseline.add_file("/docs/report.txt");

    h.add_file("/docs/report.txt");

    assert_eq!(h.file_status("/docs/report.txt"), Some(ItemStatus::Updated));
    assert_eq!(
        h.events(),
        vec![MonitorEvent::FileAdded {
            path: "/docs/report.txt".into(),
            status: ItemStatus::Updated,
        }]
    );
}

#[test]
fn test_modify_absorbed_into_new_file() {
    let mut h = Harness::with_docs();
    h.add_file("/docs/a.txt");
    h.events();

    let decision = h.modify("/docs/a.txt");

    assert_eq!(decision, Some(Decision::Ignore(Ignored::Absorbed)));
    assert_eq!(h.file_status("/docs/a.txt"), Some(ItemStatus::NewAdded));
    assert!(h.events().is_empty());
}

#[test]
fn test_rename_escalation_of_updated_file() {
    let mut h = Harness::new();
    h.probe.add_folder("/docs");
    h.probe.add_file("/docs/a.txt");
    h.engine.bootstrap(&[PathBuf::from("/docs/a.txt")]);
    h.modify("/docs/a.txt");
    h.events();

    h.rename("/docs/a.txt", "/docs/b.txt");

    assert!(h.file_status("/docs/a.txt").is_none());
    let record = h.engine.store().record(ItemKind::File, "/docs/b.txt").unwrap();
    assert_eq!(record.status, ItemStatus::UpdatedAndRenamed);
    assert_eq!(record.old_name.as_deref(), Some("a.txt"));
    assert_eq!(record.new_name.as_deref(), Some("b.txt"));
    assert_eq!(
        h.events(),
        vec![MonitorEvent::FileRenamedAndModified {
            path: "/docs/b.txt".into(),
            old_name: "a.txt".into(),
        }]
    );
}

#[test]
fn test_rename_of_unchanged_file() {
    let mut h = Harness::new();
    h.probe.add_folder("/docs");
    h.probe.add_file("/docs/a.txt");
    h.engine.bootstrap(&[PathBuf::from("/docs/a.txt")]);

    h.rename("/docs/a.txt", "/docs/b.txt");
    h.modify("/docs/b.txt");

    let record = h.engine.store().record(ItemKind::File, "/docs/b.txt").unwrap();
    assert_eq!(record.status, ItemStatus::UpdatedAndRenamed);
    assert_eq!(
        h.events(),
        vec![
            MonitorEvent::FileRenamed {
                path: "/docs/b.txt".into(),
                old_name: "a.txt".into(),
            },
            MonitorEvent::FileModified {
                path: "/docs/b.txt".into(),
                status: ItemStatus::UpdatedAndRenamed,
            },
        ]
    );
}

#[test]
fn test_transient_rename_is_silent() {
    let mut h = Harness::with_docs();
    h.add_file("/docs/a.txt");
    h.events();

    h.rename("/docs/a.txt", "/docs/b.txt");

    let record = h.engine.store().record(ItemKind::File, "/docs/b.txt").unwrap();
    assert_eq!(record.status, ItemStatus::NewAdded);
    assert!(record.old_name.is_none());
    assert!(record.new_name.is_none());
    assert!(h.events().is_empty());
}

#[test]
fn test_folder_watch_lifecycle() {
    let mut h = Harness::with_docs();
    h.baseline.add_folder("/docs/sub/");

    h.add_folder("/docs/sub");

    let installs: Vec<String> = h
        .source
        .installs()
        .into_iter()
        .filter(|p| p == "/docs/sub/")
        .collect();
    assert_eq!(installs.len(), 1);
    let handle = h.engine.store().record(ItemKind::Folder, "/docs/sub/").unwrap().watch.unwrap();
    assert_eq!(h.folder_status("/docs/sub/"), Some(ItemStatus::Updated));

    h.delete("/docs/sub");
    h.delete("/docs/sub");

    assert_eq!(h.folder_status("/docs/sub/"), Some(ItemStatus::Deleted));
    assert_eq!(h.source.uninstalls(), vec![handle]);
    assert!(h.engine.watches().handle_for("/docs/sub/").is_none());

    let deletes = h
        .events()
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::FolderDeleted { .. }))
        .count();
    assert_eq!(deletes, 1);
}

#[test]
fn test_redundant_folder_add_keeps_one_watch() {
    let mut h = Harness::with_docs();
    h.add_folder("/docs/sub");
    h.add_folder("/docs/sub");

    assert_eq!(h.source.active().len(), 2);
    assert_eq!(h.folder_status("/docs/sub/"), Some(ItemStatus::NewAdded));
}

#[test]
fn test_new_folder_delete_is_purged() {
    let mut h = Harness::with_docs();
    h.add_folder("/docs/tmp");
    let handle = h.engine.watches().handle_for("/docs/tmp/").unwrap();
    h.events();

    h.delete("/docs/tmp");

    assert!(h.folder_status("/docs/tmp/").is_none());
    assert_eq!(h.source.uninstalls(), vec![handle]);
    assert!(h.events().is_empty());
}

#[test]
fn test_folder_delete_retires_subtree() {
    let mut h = Harness::with_docs();
    h.baseline.add_folder("/docs/sub/");
    h.baseline.add_file("/docs/sub/inner/x.txt");
    h.add_folder("/docs/sub");
    h.add_folder("/docs/sub/inner");
    h.add_file("/docs/sub/inner/x.txt");
    h.add_file("/docs/sub/new.txt");
    let docs = h.engine.watches().handle_for("/docs/").unwrap();
    h.events();

    h.delete("/docs/sub");

    assert_eq!(h.source.active(), vec![(docs, "/docs/".to_string())]);
    assert_eq!(h.engine.watches().len(), 1);
    assert_eq!(h.folder_status("/docs/sub/"), Some(ItemStatus::Deleted));
    assert!(h.folder_status("/docs/sub/inner/").is_none());
    assert_eq!(h.file_status("/docs/sub/inner/x.txt"), Some(ItemStatus::Deleted));
    assert!(h.file_status("/docs/sub/new.txt").is_none());
    assert_eq!(
        h.events(),
        vec![MonitorEvent::FolderDeleted {
            path: "/docs/sub/".into()
        }]
    );
}

#[test]
fn test_new_folder_purge_releases_nested_watches() {
    let mut h = Harness::with_docs();
    h.add_folder("/docs/tmp");
    h.add_folder("/docs/tmp/nested");
    h.events();

    h.delete("/docs/tmp");

    assert!(h.folder_status("/docs/tmp/nested/").is_none());
    assert_eq!(h.source.active().len(), 1);
    assert!(h.engine.watches().handle_for("/docs/tmp/nested/").is_none());
    assert!(h.events().is_empty());
}

#[test]
fn test_file_replacing_deleted_folder_is_purged() {
    let mut h = Harness::with_docs();
    h.baseline.add_folder("/docs/build/");
    h.add_folder("/docs/build");
    h.delete("/docs/build");
    h.add_file("/docs/build");
    assert_eq!(h.file_status("/docs/build"), Some(ItemStatus::NewAdded));
    h.events();

    let decision = h.delete("/docs/build");

    assert_eq!(
        decision,
        Some(Decision::PurgeFile {
            path: "/docs/build".into()
        })
    );
    assert!(h.file_status("/docs/build").is_none());
    assert_eq!(h.folder_status("/docs/build/"), Some(ItemStatus::Deleted));

    // With nothing left at the path the folder stays already deleted
    assert_eq!(h.delete("/docs/build"), Some(Decision::Ignore(Ignored::AlreadyDeleted)));
    assert!(h.events().is_empty());
}

#[test]
fn test_rename_collision_changes_nothing() {
    let mut h = Harness::new();
    h.probe.add_folder("/docs");
    h.probe.add_file("/docs/a.txt");
    h.probe.add_file("/docs/b.txt");
    h.engine
        .bootstrap(&[PathBuf::from("/docs/a.txt"), PathBuf::from("/docs/b.txt")]);
    h.modify("/docs/a.txt");
    h.events();
    let before = h.engine.store().snapshot();

    let decision = h.engine.handle(RawEvent::rename("/docs/a.txt", "/docs/b.txt").unwrap());

    assert_eq!(decision, Some(Decision::Ignore(Ignored::RenameCollision)));
    assert_eq!(h.engine.store().snapshot(), before);
    assert!(h.events().is_empty());
}

#[test]
fn test_untracked_events_are_dropped() {
    let mut h = Harness::with_docs();
    h.events();

    assert_eq!(h.delete("/docs/x.txt"), Some(Decision::Ignore(Ignored::Untracked)));
    assert_eq!(h.modify("/docs/x.txt"), Some(Decision::Ignore(Ignored::Untracked)));
    h.probe.add_file("/docs/x.txt");
    assert_eq!(
        h.rename("/docs/x.txt", "/docs/y.txt"),
        Some(Decision::Ignore(Ignored::Untracked))
    );
    assert!(h.events().is_empty());
}

#[test]
fn test_hidden_files_are_ignored() {
    let mut h = Harness::with_docs();
    h.events();

    assert_eq!(h.add_file("/docs/.a.txt.swp"), Some(Decision::Ignore(Ignored::Hidden)));
    assert!(!h.engine.store().exists(ItemKind::File, "/docs/.a.txt.swp"));
    assert!(h.events().is_empty());
}

#[test]
fn test_vanished_add_is_ignored() {
    let mut h = Harness::with_docs();

    // Created and removed again before the event was processed
    let decision = h.engine.handle(RawEvent::add("/docs/gone.txt").unwrap());

    assert_eq!(decision, Some(Decision::Ignore(Ignored::Vanished)));
}

// ==================== Watches ====================

#[test]
fn test_watch_install_failure_leaves_store_untouched() {
    let mut h = Harness::with_docs();
    h.source.fail_on("/docs/locked/");
    h.events();

    h.add_folder("/docs/locked");

    assert!(h.folder_status("/docs/locked/").is_none());
    match h.events().as_slice() {
        [MonitorEvent::WatchInstallFailed { path, .. }] => assert_eq!(path, "/docs/locked/"),
        other => panic!("unexpected events: {:?}", other),
    }
}

#[test]
fn test_folder_rename_reregisters_path_keyed_watches() {
    let mut h = Harness::with_docs();
    h.baseline.add_folder("/docs/sub/");
    h.add_folder("/docs/sub");
    h.add_folder("/docs/sub/inner");
    h.add_file("/docs/sub/x.txt");
    let old_handle = h.engine.watches().handle_for("/docs/sub/").unwrap();
    h.events();

    h.rename("/docs/sub", "/docs/renamed");

    let record = h.engine.store().record(ItemKind::Folder, "/docs/renamed/").unwrap();
    assert_eq!(record.status, ItemStatus::Renamed);
    assert_eq!(record.old_name.as_deref(), Some("sub"));
    assert_eq!(record.new_name.as_deref(), Some("renamed"));
    assert_ne!(record.watch, Some(old_handle));
    assert_eq!(h.engine.watches().handle_for("/docs/renamed/"), record.watch);

    // Subtree migrates with the folder, statuses untouched
    assert!(h.folder_status("/docs/sub/").is_none());
    assert_eq!(h.folder_status("/docs/renamed/inner/"), Some(ItemStatus::NewAdded));
    assert!(h.engine.watches().handle_for("/docs/renamed/inner/").is_some());
    assert_eq!(h.file_status("/docs/renamed/x.txt"), Some(ItemStatus::NewAdded));

    let active: Vec<String> = h.source.active().into_iter().map(|(_, p)| p).collect();
    assert!(active.contains(&"/docs/renamed/".to_string()));
    assert!(!active.iter().any(|p| p.starts_with("/docs/sub/")));

    assert_eq!(
        h.events(),
        vec![MonitorEvent::FolderRenamed {
            path: "/docs/renamed/".into(),
            old_name: "sub".into(),
        }]
    );
}

#[test]
fn test_folder_rename_keeps_handle_when_source_follows() {
    let mut h = Harness::with_source(InMemorySource::following_renames());
    h.probe.add_folder("/docs");
    h.engine.bootstrap(&[PathBuf::from("/docs/")]);
    h.baseline.add_folder("/docs/sub/");
    h.add_folder("/docs/sub");
    let handle = h.engine.watches().handle_for("/docs/sub/").unwrap();

    h.rename("/docs/sub", "/docs/renamed");

    assert_eq!(h.engine.watches().handle_for("/docs/renamed/"), Some(handle));
    assert!(h.source.uninstalls().is_empty());
}

#[test]
fn test_new_folder_rename_is_silent() {
    let mut h = Harness::with_docs();
    h.add_folder("/docs/tmp");
    h.events();

    h.rename("/docs/tmp", "/docs/tmp2");

    assert_eq!(h.folder_status("/docs/tmp2/"), Some(ItemStatus::NewAdded));
    let record = h.engine.store().record(ItemKind::Folder, "/docs/tmp2/").unwrap();
    assert!(record.old_name.is_none());
    assert!(h.events().is_empty());
}

// ==================== Bootstrap ====================

#[test]
fn test_bootstrap_missing_file_attaches_via_parent() {
    let mut h = Harness::new();
    h.probe.add_folder("/docs");

    let report = h.engine.bootstrap(&[PathBuf::from("/docs/report.txt")]);

    assert_eq!(h.source.installs(), vec!["/docs/".to_string()]);
    assert_eq!(h.file_status("/docs/report.txt"), Some(ItemStatus::Undefined));
    assert_eq!(h.folder_status("/docs/"), Some(ItemStatus::Undefined));
    assert!(report.not_found.is_empty());
    assert!(
        !h.events()
            .iter()
            .any(|e| matches!(e, MonitorEvent::PredictionTargetNotFound { .. }))
    );
}

#[test]
fn test_bootstrap_continues_after_failures() {
    let mut h = Harness::new();
    h.probe.add_folder("/locked");
    h.probe.add_folder("/docs");
    h.source.fail_on("/locked/");

    let report = h.engine.bootstrap(&[
        PathBuf::from("/missing/"),
        PathBuf::from("/locked"),
        PathBuf::from("/docs"),
    ]);

    assert_eq!(report.not_found, vec!["/missing/".to_string()]);
    assert_eq!(report.failed, vec!["/locked/".to_string()]);
    assert_eq!(report.watched, vec!["/docs/".to_string()]);
    assert!(h.folder_status("/locked/").is_none());
    assert_eq!(
        h.events(),
        vec![
            MonitorEvent::PredictionTargetNotFound {
                path: "/missing/".into()
            },
            MonitorEvent::WatchInstallFailed {
                path: "/locked/".into(),
                reason: "Path unavailable: /locked/".into(),
            },
        ]
    );
}

// ==================== Commands ====================

#[test]
fn test_mark_persisted() {
    let mut h = Harness::new();
    h.probe.add_folder("/docs");
    h.probe.add_file("/docs/a.txt");
    h.probe.add_file("/docs/b.txt");
    h.engine
        .bootstrap(&[PathBuf::from("/docs/a.txt"), PathBuf::from("/docs/b.txt")]);
    h.rename("/docs/a.txt", "/docs/c.txt");
    h.delete("/docs/b.txt");

    h.engine.execute(Command::MarkPersisted(PathBuf::from("/docs/c.txt")));
    h.engine.execute(Command::MarkPersisted(PathBuf::from("/docs/b.txt")));

    let record = h.engine.store().record(ItemKind::File, "/docs/c.txt").unwrap();
    assert_eq!(record.status, ItemStatus::Undefined);
    assert!(record.old_name.is_none() && record.new_name.is_none());
    assert!(h.file_status("/docs/b.txt").is_none());
}

#[test]
fn test_untrack_folder_releases_watch() {
    let mut h = Harness::new();
    h.probe.add_folder("/docs");
    h.probe.add_file("/docs/a.txt");
    h.engine.bootstrap(&[PathBuf::from("/docs/a.txt")]);
    let handle = h.engine.watches().handle_for("/docs/").unwrap();
    h.events();

    h.engine.execute(Command::Untrack(PathBuf::from("/docs")));

    assert!(h.engine.store().is_empty());
    assert_eq!(h.source.uninstalls(), vec![handle]);
    assert_eq!(
        h.events(),
        vec![MonitorEvent::TrackingStopped {
            path: "/docs/".into()
        }]
    );
}

#[test]
fn test_track_at_runtime() {
    let mut h = Harness::new();
    h.probe.add_folder("/later");

    h.engine.execute(Command::Track(PathBuf::from("/later")));

    assert!(h.engine.watches().handle_for("/later/").is_some());
}

#[test]
fn test_restored_store_resumes_tracking() {
    let mut previous = StatusStore::new();
    previous.upsert(ItemKind::Folder, "/docs/", |_| {});
    previous.upsert(ItemKind::File, "/docs/a.txt", |r| r.status = ItemStatus::Updated);
    let snapshot = previous.snapshot();

    let source = InMemorySource::new();
    let probe = InMemoryProbe::new();
    probe.add_folder("/docs");
    probe.add_file("/docs/b.txt");
    let bus = Arc::new(EventBus::new());
    let mut engine = Engine::new(source.clone(), InMemoryBaseline::new(), probe.clone(), bus)
        .with_store(StatusStore::restore(snapshot));

    engine.reattach_restored();
    engine.handle(RawEvent::rename("/docs/a.txt", "/docs/b.txt").unwrap());

    assert_eq!(source.installs(), vec!["/docs/".to_string()]);
    assert_eq!(
        engine.store().get(ItemKind::File, "/docs/b.txt"),
        Some(ItemStatus::UpdatedAndRenamed)
    );
}

#[test]
fn test_shutdown_uninstalls_everything() {
    let mut h = Harness::with_docs();
    h.add_folder("/docs/sub");
    h.add_file("/docs/sub/a.txt");

    h.engine.shutdown();

    assert!(h.source.active().is_empty());
    assert!(h.engine.watches().is_empty());
    assert!(
        h.engine
            .store()
            .iter(ItemKind::Folder)
            .all(|r| r.watch.is_none())
    );
    assert_eq!(h.file_status("/docs/sub/a.txt"), Some(ItemStatus::NewAdded));
}
