//! Lookup cache owned by one DBAFS instance

use crate::dbafs::record::Record;
use crate::types::Uuid;
use std::collections::HashMap;

/// Memoized id, uuid and path lookups
///
/// Misses are cached as `None` so repeated lookups of unknown identifiers
/// do not hit the store again.
#[derive(Debug, Default)]
pub struct LookupCache {
    paths_by_id: HashMap<u64, Option<String>>,
    paths_by_uuid: HashMap<Uuid, Option<String>>,
    records_by_path: HashMap<String, Option<Record>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_for_id(&self, id: u64) -> Option<&Option<String>> {
        self.paths_by_id.get(&id)
    }

    pub fn insert_id(&mut self, id: u64, path: Option<String>) {
        self.paths_by_id.insert(id, path);
    }

    pub fn path_for_uuid(&self, uuid: &Uuid) -> Option<&Option<String>> {
        self.paths_by_uuid.get(uuid)
    }

    pub fn insert_uuid(&mut self, uuid: Uuid, path: Option<String>) {
        self.paths_by_uuid.insert(uuid, path);
    }

    pub fn record(&self, path: &str) -> Option<&Option<Record>> {
        self.records_by_path.get(path)
    }

    pub fn insert_record(&mut self, path: String, record: Option<Record>) {
        self.records_by_path.insert(path, record);
    }

    pub fn len(&self) -> usize {
        self.paths_by_id.len() + self.paths_by_uuid.len() + self.records_by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.paths_by_id.clear();
        self.paths_by_uuid.clear();
        self.records_by_path.clear();
    }
}
