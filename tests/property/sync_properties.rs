//! Property-based tests for change-set computation

use dbafs::adapter::{InMemoryAdapter, StorageAdapter, WriteOptions};
use dbafs::config::SyncConfig;
use dbafs::path;
use dbafs::{ChangeSet, Dbafs, MountManager, SledRecordStore};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// File paths below up to three directory levels; files and directories
/// never share a name.
fn file_path() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(prop::sample::select(vec!["d0", "d1", "d2"]), 0..3),
        0u8..6,
    )
        .prop_map(|(dirs, file)| {
            let mut segments: Vec<String> = dirs.into_iter().map(str::to_string).collect();
            segments.push(format!("f{}", file));
            segments.join("/")
        })
}

fn tree() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(file_path(), any::<Vec<u8>>(), 1..12)
}

fn tracked(files: &BTreeMap<String, Vec<u8>>) -> (Arc<InMemoryAdapter>, Dbafs) {
    let adapter = Arc::new(InMemoryAdapter::new());
    for (p, content) in files {
        adapter.write(p, content, &WriteOptions::new()).unwrap();
    }
    let mounts = Arc::new(MountManager::new(adapter.clone()));
    let store = Arc::new(SledRecordStore::temporary().unwrap());
    let config = SyncConfig {
        use_last_modified: false,
        ..SyncConfig::default()
    };
    (adapter, Dbafs::new(store, mounts, "", config).unwrap())
}

/// Entries of `change_set` at or below `scope`, plus the ancestors of `scope`
fn relevant_to(change_set: &ChangeSet, scope: &str) -> ChangeSet {
    let keep = |p: &str| path::is_within(p, scope) || path::is_within(scope, p);
    ChangeSet::new(
        change_set
            .items_to_create()
            .iter()
            .filter(|c| keep(&c.path))
            .cloned()
            .collect(),
        change_set
            .items_to_update(false)
            .into_iter()
            .filter(|(p, _)| keep(p))
            .collect(),
        change_set
            .items_to_delete()
            .iter()
            .filter(|(p, _)| keep(p))
            .map(|(p, t)| (p.clone(), *t))
            .collect(),
        BTreeMap::new(),
    )
}

/// Storage changes applied identically to every copy of a tree
#[derive(Debug, Clone)]
struct Edits {
    edits: BTreeSet<String>,
    additions: BTreeSet<String>,
    deletions: BTreeSet<String>,
    renames: Vec<(String, String)>,
    directory_renames: Vec<(String, String)>,
}

fn under_d0<S: Strategy<Value = String>>(strategy: S) -> impl Strategy<Value = String> {
    strategy.prop_map(|p| format!("d0/{}", p))
}

fn directory_in_d0() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["d0", "d1", "d2"]), 1..3)
        .prop_map(|dirs| format!("d0/{}", dirs.join("/")))
}

/// Edits and additions anywhere; deletions and renames inside `d0`
fn edits() -> impl Strategy<Value = Edits> {
    (
        prop::collection::btree_set(file_path(), 0..6),
        prop::collection::btree_set(file_path(), 0..6),
        prop::collection::btree_set(under_d0(file_path()), 0..4),
        prop::collection::vec((under_d0(file_path()), under_d0(file_path())), 0..4),
        prop::collection::vec((directory_in_d0(), directory_in_d0()), 0..2),
    )
        .prop_map(|(edits, additions, deletions, renames, directory_renames)| Edits {
            edits,
            additions,
            deletions,
            renames,
            directory_renames,
        })
}

fn apply_edits(adapter: &InMemoryAdapter, files: &BTreeMap<String, Vec<u8>>, edits: &Edits) {
    let options = WriteOptions::new();
    for p in edits.edits.iter().filter(|p| files.contains_key(*p)) {
        adapter.write(p, format!("edit:{}", p).as_bytes(), &options).unwrap();
    }
    for p in edits.additions.iter().filter(|p| !files.contains_key(*p)) {
        adapter.write(p, format!("new:{}", p).as_bytes(), &options).unwrap();
    }
    for p in &edits.deletions {
        if adapter.file_exists(p).unwrap() {
            adapter.delete(p).unwrap();
        }
    }
    for (from, to) in &edits.renames {
        if adapter.file_exists(from).unwrap() && !adapter.file_exists(to).unwrap() {
            adapter.rename(from, to, &options).unwrap();
        }
    }
    for (from, to) in &edits.directory_renames {
        let nested = path::is_within(to, from) || path::is_within(from, to);
        if !nested
            && adapter.directory_exists(from).unwrap()
            && !adapter.directory_exists(to).unwrap()
        {
            adapter.rename(from, to, &options).unwrap();
        }
    }
}

/// Test that syncing twice and recomputing yields nothing
#[test]
fn test_sync_is_idempotent_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(32));

    runner
        .run(&tree(), |files| {
            let (_, dbafs) = tracked(&files);
            dbafs.sync(&[]).unwrap();

            prop_assert!(dbafs.compute_change_set(&[]).unwrap().is_empty(true));
            prop_assert!(dbafs.sync(&[]).unwrap().is_empty(true));
            Ok(())
        })
        .unwrap();
}

/// Test that changing one file re-hashes exactly its ancestors
#[test]
fn test_hash_change_propagates_to_ancestors_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(32));

    runner
        .run(&(tree(), any::<prop::sample::Index>()), |(files, index)| {
            let (adapter, dbafs) = tracked(&files);
            dbafs.sync(&[]).unwrap();

            let changed = index.get(&files.keys().collect::<Vec<_>>()).to_string();
            let mut content = files[&changed].clone();
            content.extend_from_slice(b"-changed");
            adapter.write(&changed, &content, &WriteOptions::new()).unwrap();

            let updated: Vec<String> = dbafs
                .compute_change_set(&[])
                .unwrap()
                .items_to_update(false)
                .into_keys()
                .collect();
            let mut expected: Vec<String> = path::ancestors(&changed)
                .into_iter()
                .map(str::to_string)
                .collect();
            expected.push(changed.clone());
            expected.sort();
            prop_assert_eq!(updated, expected);
            Ok(())
        })
        .unwrap();
}

/// Test that a scoped change set equals the full one restricted to the scope
#[test]
fn test_scoped_change_set_matches_full_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(32));

    runner
        .run(&(tree(), edits()), |(files, edits)| {
            let (scoped_adapter, scoped) = tracked(&files);
            let (full_adapter, full) = tracked(&files);
            scoped.sync(&[]).unwrap();
            full.sync(&[]).unwrap();

            apply_edits(&scoped_adapter, &files, &edits);
            apply_edits(&full_adapter, &files, &edits);

            let scoped_changes = scoped.compute_change_set(&["d0"]).unwrap();
            let full_changes = full.compute_change_set(&[]).unwrap();
            prop_assert_eq!(scoped_changes.clone(), relevant_to(&full_changes, "d0"));

            scoped.apply_change_set(&scoped_changes).unwrap();
            prop_assert!(scoped.compute_change_set(&["d0"]).unwrap().is_empty(true));
            Ok(())
        })
        .unwrap();
}

/// Tree with a second adapter mounted at `d0/m/n`, whose parents may not exist
fn tracked_with_mount(
    files: &BTreeMap<String, Vec<u8>>,
    mounted: &BTreeMap<String, Vec<u8>>,
) -> (Arc<InMemoryAdapter>, Dbafs) {
    let root = Arc::new(InMemoryAdapter::new());
    for (p, content) in files {
        root.write(p, content, &WriteOptions::new()).unwrap();
    }
    let nested = Arc::new(InMemoryAdapter::new());
    for (p, content) in mounted {
        nested.write(p, content, &WriteOptions::new()).unwrap();
    }
    let mut mounts = MountManager::new(root);
    mounts.mount(nested.clone(), "d0/m/n").unwrap();
    let store = Arc::new(SledRecordStore::temporary().unwrap());
    let config = SyncConfig {
        use_last_modified: false,
        ..SyncConfig::default()
    };
    (nested, Dbafs::new(store, Arc::new(mounts), "", config).unwrap())
}

/// Test scope consistency across a nested mount and its synthesized parents
#[test]
fn test_scoped_change_set_matches_full_with_mount_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(32));

    let mounted = prop::collection::btree_map(file_path(), any::<Vec<u8>>(), 0..6);
    let mounted_edits = prop::collection::btree_set(file_path(), 0..4);
    let scopes = prop::sample::select(vec!["d0", "d0/m", "d0/m/n", "d0/m/n/d1"]);
    runner
        .run(
            &(tree(), mounted, mounted_edits, scopes),
            |(files, mounted, mounted_edits, scope)| {
                let (scoped_nested, scoped) = tracked_with_mount(&files, &mounted);
                let (full_nested, full) = tracked_with_mount(&files, &mounted);
                scoped.sync(&[]).unwrap();
                full.sync(&[]).unwrap();
                prop_assert!(scoped.compute_change_set(&[scope]).unwrap().is_empty(true));

                let in_scope = mounted_edits
                    .iter()
                    .filter(|p| path::is_within(&path::join("d0/m/n", p), scope));
                for adapter in [&scoped_nested, &full_nested] {
                    for p in in_scope.clone() {
                        let content = format!("mounted:{}", p);
                        adapter.write(p, content.as_bytes(), &WriteOptions::new()).unwrap();
                    }
                }

                let scoped_changes = scoped.compute_change_set(&[scope]).unwrap();
                let full_changes = full.compute_change_set(&[]).unwrap();
                prop_assert_eq!(&scoped_changes, &relevant_to(&full_changes, scope));

                scoped.apply_change_set(&scoped_changes).unwrap();
                full.apply_change_set(&full_changes).unwrap();
                prop_assert!(scoped.compute_change_set(&[]).unwrap().is_empty(true));
                prop_assert!(full.compute_change_set(&[scope]).unwrap().is_empty(true));
                Ok(())
            },
        )
        .unwrap();
}
