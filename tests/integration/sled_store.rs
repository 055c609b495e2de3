//! Integration tests for the sled record store

use super::test_utils::{hash_only_config, write_all};
use dbafs::adapter::InMemoryAdapter;
use dbafs::dbafs::RecordStore;
use dbafs::{Dbafs, MountManager, SledRecordStore};
use std::sync::Arc;
use tempfile::TempDir;

/// Test that records, ids and uuids survive reopening the store
#[test]
fn test_records_survive_reopen() {
    let store_dir = TempDir::new().unwrap();
    let adapter = Arc::new(InMemoryAdapter::new());
    write_all(&adapter, &[("dir/a.txt", "a"), ("b.txt", "b")]);
    let mounts = Arc::new(MountManager::new(adapter));

    let (id, uuid) = {
        let store = Arc::new(SledRecordStore::open(store_dir.path()).unwrap());
        let dbafs = Dbafs::new(store.clone(), mounts.clone(), "", hash_only_config()).unwrap();
        dbafs.sync(&[]).unwrap();
        store.flush().unwrap();
        let record = dbafs.find_record("dir/a.txt").unwrap().unwrap();
        (record.id, record.uuid)
    };

    let store = Arc::new(SledRecordStore::open(store_dir.path()).unwrap());
    assert_eq!(store.len(), 3);
    let reopened = store.get_by_uuid(&uuid).unwrap().unwrap();
    assert_eq!(reopened.id, id);
    assert_eq!(reopened.path, "dir/a.txt");
    assert_eq!(reopened.pid, store.get_by_path("dir").unwrap().map(|r| r.id));

    let dbafs = Dbafs::new(store, mounts, "", hash_only_config()).unwrap();
    assert!(dbafs.compute_change_set(&[]).unwrap().is_empty(true));
}

/// Test that two tenants share one store through path prefixes
#[test]
fn test_prefixed_instances_share_a_store() {
    let store = Arc::new(SledRecordStore::temporary().unwrap());

    let mut tenants = Vec::new();
    for (name, files) in [("alpha", &[("x.txt", "1")][..]), ("beta", &[("y.txt", "2")][..])] {
        let adapter = Arc::new(InMemoryAdapter::new());
        write_all(&adapter, files);
        let mounts = Arc::new(MountManager::new(adapter));
        let mut dbafs = Dbafs::new(store.clone(), mounts, "", hash_only_config()).unwrap();
        dbafs.set_database_path_prefix(name).unwrap();
        dbafs.sync(&[]).unwrap();
        tenants.push(dbafs);
    }

    let stored: Vec<String> = store
        .list_all()
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(stored, vec!["alpha/x.txt", "beta/y.txt"]);

    for dbafs in &tenants {
        assert!(dbafs.compute_change_set(&[]).unwrap().is_empty(true));
        assert_eq!(dbafs.get_records("", true).unwrap().len(), 1);
    }
}

/// Test that an instance without a prefix claims every row of its store
#[test]
fn test_unprefixed_instance_claims_the_whole_store() {
    let store = Arc::new(SledRecordStore::temporary().unwrap());

    let tenant_adapter = Arc::new(InMemoryAdapter::new());
    write_all(&tenant_adapter, &[("x.txt", "1")]);
    let mut tenant = Dbafs::new(
        store.clone(),
        Arc::new(MountManager::new(tenant_adapter)),
        "",
        hash_only_config(),
    )
    .unwrap();
    tenant.set_database_path_prefix("alpha").unwrap();
    tenant.sync(&[]).unwrap();

    let owner = Dbafs::new(
        store,
        Arc::new(MountManager::new(Arc::new(InMemoryAdapter::new()))),
        "",
        hash_only_config(),
    )
    .unwrap();
    assert_eq!(owner.get_records("", true).unwrap().len(), 1);
    let deletes: Vec<String> = owner
        .compute_change_set(&[])
        .unwrap()
        .items_to_delete()
        .keys()
        .cloned()
        .collect();
    assert_eq!(deletes, vec!["alpha/x.txt"]);
}
