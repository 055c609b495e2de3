//! Integration tests for composed filesystem decorators

use super::test_utils::{paths, tracked};
use dbafs::adapter::WriteOptions;
use dbafs::views::{
    CustomViewFilesystem, DirectoryFilterFilesystem, Permission, PermissionCheckingFilesystem,
};
use dbafs::{AccessFlags, Filesystem, Location, VfsError, VirtualFilesystem};
use std::sync::Arc;

/// Test a permission check over an allow-list over a labelled view
#[test]
fn test_decorators_compose() {
    let t = tracked(&[
        ("media/2024/a.jpg", "a"),
        ("media/2024/b.jpg", "b"),
        ("media/raw/c.raw", "c"),
        ("docs/guide.md", "g"),
    ]);
    t.dbafs.sync(&[]).unwrap();
    let vfs: Arc<dyn Filesystem> = Arc::new(
        VirtualFilesystem::new(t.mounts.clone(), Some(t.dbafs.clone()), "", false).unwrap(),
    );

    let view: Arc<dyn Filesystem> = Arc::new(
        CustomViewFilesystem::new(vfs, [("photos", "media"), ("manuals", "docs")]).unwrap(),
    );
    let filtered: Arc<dyn Filesystem> =
        Arc::new(DirectoryFilterFilesystem::new(view, &["photos/2024"]).unwrap());
    let guarded = PermissionCheckingFilesystem::new(
        filtered,
        Arc::new(|permission: Permission, _: &str| permission != Permission::Delete),
    );

    let listed = guarded
        .list_contents("".into(), true, AccessFlags::NONE)
        .unwrap();
    assert_eq!(
        paths(&listed),
        vec!["photos", "photos/2024", "photos/2024/a.jpg", "photos/2024/b.jpg"]
    );

    guarded
        .write("photos/2024/d.jpg".into(), b"d", &WriteOptions::new())
        .unwrap();
    assert!(t.dbafs.find_record("media/2024/d.jpg").unwrap().is_some());

    assert!(matches!(
        guarded.delete("photos/2024/a.jpg".into()),
        Err(VfsError::AccessDenied(_))
    ));
    assert!(matches!(
        guarded.read("manuals/guide.md".into()),
        Err(VfsError::Logic(_))
    ));
}

/// Test that uuids resolve through a labelled view
#[test]
fn test_custom_view_resolves_uuids() {
    let t = tracked(&[("media/2024/a.jpg", "a"), ("private/key", "k")]);
    t.dbafs.sync(&[]).unwrap();
    let vfs: Arc<dyn Filesystem> = Arc::new(
        VirtualFilesystem::new(t.mounts.clone(), Some(t.dbafs.clone()), "", false).unwrap(),
    );
    let view = CustomViewFilesystem::new(vfs, [("photos", "media/2024")]).unwrap();

    let photo = t.dbafs.find_record("media/2024/a.jpg").unwrap().unwrap().uuid;
    assert_eq!(view.resolve(Location::Uuid(photo)).unwrap(), "photos/a.jpg");
    assert_eq!(view.read(photo.into()).unwrap(), b"a");

    let key = t.dbafs.find_record("private/key").unwrap().unwrap().uuid;
    assert!(matches!(view.read(key.into()), Err(VfsError::NotFound(_))));
}
