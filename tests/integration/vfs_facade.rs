//! Integration tests for the virtual filesystem façade

use super::test_utils::{hash_only_config, paths, tracked, CountingAdapter};
use dbafs::adapter::{InMemoryAdapter, StorageAdapter, WriteOptions};
use dbafs::item::ImportantPart;
use dbafs::{
    AccessFlags, Dbafs, ExtraMetadata, Filesystem, Location, MountManager, SledRecordStore,
    VfsError, VirtualFilesystem,
};
use std::sync::Arc;

/// Test that a read-only instance rejects writes before touching storage
#[test]
fn test_read_only_write_never_reaches_adapter() {
    let adapter = Arc::new(CountingAdapter::default());
    let mounts = Arc::new(MountManager::new(adapter.clone()));
    let vfs = VirtualFilesystem::new(mounts, None, "", true).unwrap();

    let result = vfs.write("x".into(), b"y", &WriteOptions::new());
    assert!(matches!(result, Err(VfsError::Logic(_))));
    assert!(matches!(vfs.delete("x".into()), Err(VfsError::Logic(_))));
    assert!(matches!(
        vfs.rename("x".into(), "z", &WriteOptions::new()),
        Err(VfsError::Logic(_))
    ));
    assert_eq!(adapter.calls(), 0);
}

/// Test that writes through the façade keep the record current
#[test]
fn test_mutations_sync_through() {
    let t = tracked(&[("docs/a.txt", "a")]);
    t.dbafs.sync(&[]).unwrap();
    let vfs = VirtualFilesystem::new(t.mounts.clone(), Some(t.dbafs.clone()), "", false).unwrap();

    vfs.write("docs/b.txt".into(), b"b", &WriteOptions::new())
        .unwrap();
    assert!(t.dbafs.find_record("docs/b.txt").unwrap().is_some());

    vfs.delete("docs/a.txt".into()).unwrap();
    assert!(t.dbafs.find_record("docs/a.txt").unwrap().is_none());

    vfs.create_directory("empty".into(), &WriteOptions::new())
        .unwrap();
    assert!(t.dbafs.find_record("empty").unwrap().unwrap().is_directory());

    assert!(t.dbafs.compute_change_set(&[]).unwrap().is_empty(true));
}

/// Test that a move across adapters keeps the tracked identity
#[test]
fn test_cross_adapter_move_keeps_uuid() {
    let root = Arc::new(InMemoryAdapter::new());
    root.write("inbox/report.pdf", b"quarterly numbers", &WriteOptions::new())
        .unwrap();
    let archive = Arc::new(InMemoryAdapter::new());
    let mut mounts = MountManager::new(root);
    mounts.mount(archive.clone(), "archive").unwrap();
    let mounts = Arc::new(mounts);

    let store = Arc::new(SledRecordStore::temporary().unwrap());
    let dbafs = Arc::new(Dbafs::new(store, mounts.clone(), "", hash_only_config()).unwrap());
    dbafs.sync(&[]).unwrap();
    let uuid = dbafs.find_record("inbox/report.pdf").unwrap().unwrap().uuid;

    let vfs = VirtualFilesystem::new(mounts, Some(dbafs.clone()), "", false).unwrap();
    vfs.rename("inbox/report.pdf".into(), "archive/report.pdf", &WriteOptions::new())
        .unwrap();

    assert!(archive.file_exists("report.pdf").unwrap());
    assert_eq!(vfs.resolve(Location::Uuid(uuid)).unwrap(), "archive/report.pdf");
    assert_eq!(vfs.read(uuid.into()).unwrap(), b"quarterly numbers");
}

/// Test that a prefixed façade hides paths outside its prefix
#[test]
fn test_prefixed_view_of_tracked_tree() {
    let t = tracked(&[("tenants/acme/plan.txt", "p"), ("tenants/other/secret.txt", "s")]);
    t.dbafs.sync(&[]).unwrap();
    let vfs =
        VirtualFilesystem::new(t.mounts.clone(), Some(t.dbafs.clone()), "tenants/acme", false)
            .unwrap();

    let listed = vfs.list_contents("".into(), true, AccessFlags::NONE).unwrap();
    assert_eq!(paths(&listed), vec!["plan.txt"]);
    assert!(listed[0].uuid().is_some());

    let foreign = t.dbafs.find_record("tenants/other/secret.txt").unwrap().unwrap().uuid;
    assert!(matches!(vfs.read(foreign.into()), Err(VfsError::NotFound(_))));
}

/// Test that extra metadata survives in the record and reaches item views
#[test]
fn test_extra_metadata_persists_in_record() {
    let t = tracked(&[("photo.jpg", "jpeg bytes")]);
    t.dbafs.sync(&[]).unwrap();
    let vfs = VirtualFilesystem::new(t.mounts.clone(), Some(t.dbafs.clone()), "", false).unwrap();

    let mut metadata = ExtraMetadata::new();
    metadata.important_part = Some(ImportantPart::new(0.1, 0.2, 0.5, 0.5).unwrap());
    metadata.localized.set("en", "title", "Harbour");
    vfs.set_extra_metadata("photo.jpg".into(), &metadata)
        .unwrap();

    let item = vfs.get("photo.jpg".into(), AccessFlags::NONE).unwrap().unwrap();
    assert_eq!(item.extra_metadata(), &metadata);
    assert_eq!(item.mime_type().unwrap(), Some("image/jpeg"));

    let bypass = vfs
        .extra_metadata("photo.jpg".into(), AccessFlags::BYPASS_DBAFS)
        .unwrap();
    assert!(bypass.is_empty());
}

/// Test that FORCE_SYNC refreshes a stale record before reading it
#[test]
fn test_force_sync_refreshes_record() {
    let t = tracked(&[("notes.txt", "v1")]);
    t.dbafs.sync(&[]).unwrap();
    let vfs = VirtualFilesystem::new(t.mounts.clone(), Some(t.dbafs.clone()), "", false).unwrap();

    t.adapter
        .write("added.txt", b"behind the record's back", &WriteOptions::new())
        .unwrap();
    assert!(t.dbafs.find_record("added.txt").unwrap().is_none());

    let item = vfs
        .get("added.txt".into(), AccessFlags::FORCE_SYNC)
        .unwrap()
        .unwrap();
    assert!(item.uuid().is_some());
    assert!(t.dbafs.find_record("added.txt").unwrap().is_some());
}

/// Root adapter plus one adapter mounted below two missing parents
fn nested_mount() -> (Arc<Dbafs>, VirtualFilesystem) {
    let extra = Arc::new(InMemoryAdapter::new());
    extra.write("x.txt", b"x", &WriteOptions::new()).unwrap();
    let mut mounts = MountManager::new(Arc::new(InMemoryAdapter::new()));
    mounts.mount(extra, "files/media/extra").unwrap();
    let mounts = Arc::new(mounts);

    let store = Arc::new(SledRecordStore::temporary().unwrap());
    let dbafs = Arc::new(Dbafs::new(store, mounts.clone(), "", hash_only_config()).unwrap());
    dbafs.sync(&[]).unwrap();
    let vfs = VirtualFilesystem::new(mounts, Some(dbafs.clone()), "", false).unwrap();
    (dbafs, vfs)
}

/// Test that scopes on the parents of a mount point see an unchanged tree
#[test]
fn test_scoped_sync_of_mount_point_parents() {
    let (dbafs, _) = nested_mount();
    assert_eq!(dbafs.get_records("", true).unwrap().len(), 4);

    for scope in ["files", "files/media", "files/media/extra", "files/media/extra/x.txt"] {
        assert!(
            dbafs.compute_change_set(&[scope]).unwrap().is_empty(true),
            "scope {} should be unchanged",
            scope
        );
    }
}

/// Test that a forced listing of a mount point parent keeps identities
#[test]
fn test_force_sync_listing_keeps_identities() {
    let (dbafs, vfs) = nested_mount();
    let before = dbafs.find_record("files/media/extra/x.txt").unwrap().unwrap().uuid;

    let listed = vfs
        .list_contents("files/media".into(), true, AccessFlags::FORCE_SYNC)
        .unwrap();
    assert_eq!(
        paths(&listed),
        vec!["files/media/extra", "files/media/extra/x.txt"]
    );
    assert_eq!(listed[1].uuid(), Some(before));

    dbafs.sync(&[]).unwrap();
    assert_eq!(
        dbafs.find_record("files/media/extra/x.txt").unwrap().unwrap().uuid,
        before
    );
}

/// Test that a write into a nested mount re-hashes every ancestor
#[test]
fn test_write_through_into_nested_mount() {
    let (dbafs, vfs) = nested_mount();
    let files_hash = dbafs.find_record("files").unwrap().unwrap().hash;

    vfs.write("files/media/extra/new.txt".into(), b"new", &WriteOptions::new())
        .unwrap();
    assert!(dbafs.find_record("files/media/extra/new.txt").unwrap().is_some());
    assert_ne!(dbafs.find_record("files").unwrap().unwrap().hash, files_hash);
    assert!(dbafs.compute_change_set(&[]).unwrap().is_empty(true));
}
