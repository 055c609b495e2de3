//! Integration tests against a real directory on disk

use super::test_utils::hash_only_config;
use dbafs::adapter::{LocalAdapter, WriteOptions};
use dbafs::{AccessFlags, Dbafs, Filesystem, MountManager, SledRecordStore, VirtualFilesystem};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn setup(root: &TempDir) -> (Arc<Dbafs>, VirtualFilesystem) {
    let adapter = Arc::new(LocalAdapter::new(root.path()).unwrap());
    let mounts = Arc::new(MountManager::new(adapter));
    let store = Arc::new(SledRecordStore::temporary().unwrap());
    let dbafs = Arc::new(Dbafs::new(store, mounts.clone(), "", hash_only_config()).unwrap());
    let vfs = VirtualFilesystem::new(mounts, Some(dbafs.clone()), "", false).unwrap();
    (dbafs, vfs)
}

/// Test a sync of files created directly on disk
#[test]
fn test_sync_local_directory() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("src/nested")).unwrap();
    fs::write(root.path().join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(root.path().join("src/nested/lib.rs"), "pub fn f() {}").unwrap();
    fs::write(root.path().join("README.md"), "# readme").unwrap();

    let (dbafs, _) = setup(&root);
    let change_set = dbafs.sync(&[]).unwrap();
    let created: Vec<&str> = change_set
        .items_to_create()
        .iter()
        .map(|c| c.path.as_str())
        .collect();
    assert_eq!(
        created,
        vec!["src", "src/nested", "src/nested/lib.rs", "src/main.rs", "README.md"]
    );
    assert!(dbafs.compute_change_set(&[]).unwrap().is_empty(true));
}

/// Test that a rename on disk keeps the uuid of the moved file
#[test]
fn test_disk_rename_keeps_identity() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("drafts")).unwrap();
    fs::write(root.path().join("drafts/post.md"), "hello world").unwrap();

    let (dbafs, vfs) = setup(&root);
    dbafs.sync(&[]).unwrap();
    let uuid = dbafs.find_record("drafts/post.md").unwrap().unwrap().uuid;

    fs::create_dir_all(root.path().join("published")).unwrap();
    fs::rename(
        root.path().join("drafts/post.md"),
        root.path().join("published/post.md"),
    )
    .unwrap();
    let change_set = dbafs.sync(&[]).unwrap();
    assert_eq!(
        change_set.items_to_update(false)["drafts/post.md"].path.as_deref(),
        Some("published/post.md")
    );

    assert_eq!(vfs.resolve(uuid.into()).unwrap(), "published/post.md");
    let item = vfs
        .get("published/post.md".into(), AccessFlags::NONE)
        .unwrap()
        .unwrap();
    assert_eq!(item.uuid(), Some(uuid));
    assert_eq!(item.file_size().unwrap(), Some(11));
}

/// Test façade writes against the local adapter
#[test]
fn test_facade_writes_to_disk() {
    let root = TempDir::new().unwrap();
    let (dbafs, vfs) = setup(&root);

    vfs.write("out/report.txt".into(), b"report", &WriteOptions::new())
        .unwrap();
    assert_eq!(
        fs::read_to_string(root.path().join("out/report.txt")).unwrap(),
        "report"
    );
    assert!(dbafs.find_record("out").unwrap().unwrap().is_directory());
    assert!(dbafs.find_record("out/report.txt").unwrap().is_some());
}

/// Test that decomposed file names sync and resolve under their NFC form
#[test]
fn test_decomposed_names_sync() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("cafe\u{301}.txt"), "latte").unwrap();

    let (dbafs, vfs) = setup(&root);
    let change_set = dbafs.sync(&[]).unwrap();
    assert_eq!(change_set.items_to_create().len(), 1);
    assert_eq!(change_set.items_to_create()[0].path, "caf\u{e9}.txt");

    assert_eq!(vfs.read("caf\u{e9}.txt".into()).unwrap(), b"latte");
    assert_eq!(vfs.read("cafe\u{301}.txt".into()).unwrap(), b"latte");
    assert!(dbafs.compute_change_set(&["caf\u{e9}.txt"]).unwrap().is_empty(true));
    assert!(dbafs.compute_change_set(&[]).unwrap().is_empty(true));
}

/// Test that names which are not valid UTF-8 are left untracked
#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_names_do_not_block_sync() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let root = TempDir::new().unwrap();
    fs::write(root.path().join(OsStr::from_bytes(b"broken\xff.txt")), "?").unwrap();
    fs::write(root.path().join("fine.txt"), "ok").unwrap();

    let (dbafs, _) = setup(&root);
    let change_set = dbafs.sync(&[]).unwrap();
    let created: Vec<&str> = change_set
        .items_to_create()
        .iter()
        .map(|c| c.path.as_str())
        .collect();
    assert_eq!(created, vec!["fine.txt"]);
}
