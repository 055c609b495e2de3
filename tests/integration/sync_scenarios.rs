//! Integration tests for change-set computation and application

use super::test_utils::{hash_only_config, tracked, tracked_with, write_all, FailingReadAdapter};
use dbafs::adapter::{StorageAdapter, WriteOptions};
use dbafs::config::SyncConfig;
use dbafs::hasher::{compute_content_hash, compute_directory_hash};
use dbafs::{
    ChangeSet, CreateItem, Dbafs, ItemType, MountManager, SledRecordStore, UpdateDelta, VfsError,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

const FIXTURE: &[(&str, &str)] = &[
    ("file1", "content1"),
    ("file2", "content2"),
    ("foo/file3", "content3"),
    ("bar/file4", "content4"),
    ("bar/file5a", ""),
    ("bar/file5b", ""),
];

/// Test that an unchanged tree yields an empty change set, twice
#[test]
fn test_unchanged_tree_is_empty() {
    let t = tracked(&[("file1", "a"), ("file2", "b")]);
    t.dbafs.sync(&[]).unwrap();

    for _ in 0..2 {
        let change_set = t.dbafs.compute_change_set(&[]).unwrap();
        assert!(change_set.is_empty(true));
        assert_eq!(change_set.len(), 0);
    }
}

/// Test that applying a computed change set and recomputing yields nothing
#[test]
fn test_round_trip_after_mixed_changes() {
    let t = tracked(FIXTURE);
    t.dbafs.sync(&[]).unwrap();

    t.adapter.delete("file1").unwrap();
    t.adapter
        .write("file2", b"changed", &WriteOptions::new())
        .unwrap();
    t.adapter
        .write("new/dir/file6", b"content6", &WriteOptions::new())
        .unwrap();
    t.adapter
        .rename("bar/file4", "foo/file4", &WriteOptions::new())
        .unwrap();

    let applied = t.dbafs.sync(&[]).unwrap();
    assert!(!applied.is_empty(true));
    assert!(t.dbafs.compute_change_set(&[]).unwrap().is_empty(true));
}

/// Test the move of foo/file3 into an existing directory
#[test]
fn test_move_between_directories_is_one_update() {
    let t = tracked(FIXTURE);
    t.dbafs.sync(&[]).unwrap();
    let before = t.dbafs.find_record("foo/file3").unwrap().unwrap();

    t.adapter
        .rename("foo/file3", "bar/file3", &WriteOptions::new())
        .unwrap();
    let change_set = t.dbafs.compute_change_set(&[]).unwrap();

    assert!(change_set.items_to_create().is_empty());
    assert!(change_set.items_to_delete().is_empty());
    let updates = change_set.items_to_update(false);
    assert_eq!(
        updates.keys().cloned().collect::<Vec<_>>(),
        vec!["bar", "foo", "foo/file3"]
    );
    assert_eq!(updates["foo/file3"].path.as_deref(), Some("bar/file3"));
    assert_eq!(updates["foo/file3"].hash, None);
    assert!(updates["foo"].hash.is_some());
    assert!(updates["bar"].hash.is_some());

    t.dbafs.apply_change_set(&change_set).unwrap();
    let after = t.dbafs.find_record("bar/file3").unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.uuid, before.uuid);
    assert!(t.dbafs.find_record("foo/file3").unwrap().is_none());
}

/// Test that identical empty files keep their identities when moved together
#[test]
fn test_identical_files_move_without_recreation() {
    let t = tracked(FIXTURE);
    t.dbafs.sync(&[]).unwrap();
    let uuid_a = t.dbafs.find_record("bar/file5a").unwrap().unwrap().uuid;
    let uuid_b = t.dbafs.find_record("bar/file5b").unwrap().unwrap().uuid;

    for name in ["file5a", "file5b"] {
        t.adapter
            .rename(&format!("bar/{}", name), name, &WriteOptions::new())
            .unwrap();
    }
    let change_set = t.dbafs.sync(&[]).unwrap();

    assert!(change_set.items_to_create().is_empty());
    assert!(change_set.items_to_delete().is_empty());
    let updates = change_set.items_to_update(false);
    assert_eq!(updates["bar/file5a"], UpdateDelta::path("file5a"));
    assert_eq!(updates["bar/file5b"], UpdateDelta::path("file5b"));

    assert_eq!(t.dbafs.find_record("file5a").unwrap().unwrap().uuid, uuid_a);
    assert_eq!(t.dbafs.find_record("file5b").unwrap().unwrap().uuid, uuid_b);
}

/// Test that a changed file re-hashes every ancestor and no sibling
#[test]
fn test_content_change_propagates_to_ancestors_only() {
    let t = tracked(&[("a/b/c/leaf.txt", "1"), ("a/sibling/x.txt", "2"), ("other/y.txt", "3")]);
    t.dbafs.sync(&[]).unwrap();

    t.adapter
        .write("a/b/c/leaf.txt", b"changed", &WriteOptions::new())
        .unwrap();
    let updates = t.dbafs.compute_change_set(&[]).unwrap().items_to_update(false);
    assert_eq!(
        updates.keys().cloned().collect::<Vec<_>>(),
        vec!["a", "a/b", "a/b/c", "a/b/c/leaf.txt"]
    );
    assert_eq!(
        updates["a/b/c"].hash,
        Some(compute_directory_hash(&[(
            "leaf.txt".to_string(),
            compute_content_hash(b"changed")
        )]))
    );
}

/// Test that a scoped sync matches the full sync for changes inside the scope
#[test]
fn test_scoped_sync_matches_full_sync() {
    let scoped = tracked(FIXTURE);
    let full = tracked(FIXTURE);
    scoped.dbafs.sync(&[]).unwrap();
    full.dbafs.sync(&[]).unwrap();

    for t in [&scoped, &full] {
        write_all(&t.adapter, &[("foo/file3", "edited"), ("foo/sub/new.txt", "new")]);
    }

    let scoped_changes = scoped.dbafs.compute_change_set(&["foo"]).unwrap();
    let full_changes = full.dbafs.compute_change_set(&[]).unwrap();
    assert_eq!(scoped_changes, full_changes);

    scoped.dbafs.apply_change_set(&scoped_changes).unwrap();
    assert!(scoped.dbafs.compute_change_set(&[]).unwrap().is_empty(true));
}

/// Test that a failing change set leaves the record untouched
#[test]
fn test_failed_apply_rolls_back() {
    let t = tracked(&[("kept.txt", "k")]);
    t.dbafs.sync(&[]).unwrap();

    let mut deletes = BTreeMap::new();
    deletes.insert("never-tracked.txt".to_string(), ItemType::File);
    let change_set = ChangeSet::new(
        vec![CreateItem {
            hash: compute_content_hash(b"n"),
            path: "new.txt".to_string(),
            item_type: ItemType::File,
            last_modified: None,
        }],
        BTreeMap::new(),
        deletes,
        BTreeMap::new(),
    );

    let result = t.dbafs.apply_change_set(&change_set);
    assert!(matches!(result, Err(VfsError::NotFound(_))));
    assert!(t.dbafs.find_record("new.txt").unwrap().is_none());
    assert!(t.dbafs.find_record("kept.txt").unwrap().is_some());
}

/// Test that excluded directories and oversized files are never tracked
#[test]
fn test_exclusions_and_size_limit() {
    let config = SyncConfig {
        max_file_size: 8,
        use_last_modified: false,
        ..SyncConfig::default()
    };
    let t = tracked_with(
        &[
            ("small.txt", "tiny"),
            ("large.bin", "far too large"),
            ("cache/.nosync", ""),
            ("cache/blob", "b"),
        ],
        config,
    );
    t.dbafs.sync(&[]).unwrap();

    let tracked_paths: Vec<String> = t
        .dbafs
        .get_records("", true)
        .unwrap()
        .iter()
        .map(|i| i.path().to_string())
        .collect();
    assert_eq!(tracked_paths, vec!["small.txt"]);

    // A tracked file that grows past the limit is dropped from the record
    t.adapter
        .write("small.txt", b"now it is too large", &WriteOptions::new())
        .unwrap();
    let change_set = t.dbafs.sync(&[]).unwrap();
    assert_eq!(
        change_set.items_to_delete().keys().cloned().collect::<Vec<_>>(),
        vec!["small.txt"]
    );
}

/// Test that replacing a file with a directory recreates the record
#[test]
fn test_type_change_replaces_record() {
    let t = tracked(&[("entry", "was a file")]);
    t.dbafs.sync(&[]).unwrap();
    let old_uuid = t.dbafs.find_record("entry").unwrap().unwrap().uuid;

    t.adapter.delete("entry").unwrap();
    t.adapter
        .write("entry/inside.txt", b"now a directory", &WriteOptions::new())
        .unwrap();
    let change_set = t.dbafs.sync(&[]).unwrap();

    assert_eq!(change_set.items_to_delete()["entry"], ItemType::File);
    let record = t.dbafs.find_record("entry").unwrap().unwrap();
    assert!(record.is_directory());
    assert_ne!(record.uuid, old_uuid);
}

/// Test that a storage read error aborts the change set and keeps the record
#[test]
fn test_read_error_aborts_change_set() {
    let adapter = Arc::new(FailingReadAdapter::default());
    write_all(&adapter.inner, &[("dir/a.txt", "a"), ("dir/b.txt", "b")]);
    let mounts = Arc::new(MountManager::new(adapter.clone()));
    let store = Arc::new(SledRecordStore::temporary().unwrap());
    let dbafs = Dbafs::new(store, mounts, "", hash_only_config()).unwrap();
    dbafs.sync(&[]).unwrap();
    let before = dbafs.find_record("dir/a.txt").unwrap().unwrap();

    write_all(&adapter.inner, &[("dir/a.txt", "changed"), ("dir/c.txt", "c")]);
    adapter.fail_reads_of("dir/a.txt");

    for scope in [&[][..], &["dir"][..], &["dir/a.txt"][..]] {
        let result = dbafs.compute_change_set(scope);
        assert!(
            matches!(result, Err(VfsError::VirtualFilesystem { .. })),
            "scope {:?} should fail",
            scope
        );
    }
    assert!(matches!(
        dbafs.sync(&[]),
        Err(VfsError::VirtualFilesystem { .. })
    ));

    let after = dbafs.find_record("dir/a.txt").unwrap().unwrap();
    assert_eq!(after.hash, before.hash);
    assert_eq!(after.uuid, before.uuid);
    assert!(dbafs.find_record("dir/c.txt").unwrap().is_none());
}
