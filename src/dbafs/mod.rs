//! DBAFS: database-backed abstract filesystem
//!
//! Keeps a persisted record of every tracked path below a root of the
//! mount-manager tree, computes change sets between that record and the live
//! storage and applies them atomically.

pub mod cache;
pub mod diff;
pub mod persistence;
pub mod record;
pub mod scan;
pub mod store;

pub use cache::LookupCache;
pub use diff::{Tree, TreeEntry};
pub use persistence::SledRecordStore;
pub use record::Record;
pub use scan::Scanner;
pub use store::{ApplyOptions, RecordStore};

use crate::change_set::{ChangeSet, CreateItem, UpdateDelta};
use crate::config::SyncConfig;
use crate::error::VfsError;
use crate::hasher::compute_directory_hash;
use crate::item::{ExtraMetadata, FilesystemItem};
use crate::mount::MountManager;
use crate::path;
use crate::types::{Hash, ItemType, Uuid};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

fn tree_entry(record: &Record) -> TreeEntry {
    TreeEntry {
        item_type: record.item_type,
        hash: record.hash,
        last_modified: record.last_modified,
    }
}

/// Synchronization engine for one tracked root
///
/// Instances sharing one record store must each use a distinct, non-nested
/// database path prefix. An instance without a prefix treats every row of
/// the store as its own, so it must have the store to itself.
pub struct Dbafs {
    store: Arc<dyn RecordStore>,
    mounts: Arc<MountManager>,
    /// Mount-manager path of the tracked tree
    root: String,
    config: SyncConfig,
    cache: Mutex<LookupCache>,
}

impl Dbafs {
    pub fn new(
        store: Arc<dyn RecordStore>,
        mounts: Arc<MountManager>,
        root: &str,
        mut config: SyncConfig,
    ) -> Result<Self, VfsError> {
        config.validate()?;
        config.database_path_prefix = path::normalize(&config.database_path_prefix)?;
        Ok(Self {
            store,
            mounts,
            root: path::normalize(root)?,
            config,
            cache: Mutex::new(LookupCache::new()),
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn mounts(&self) -> &Arc<MountManager> {
        &self.mounts
    }

    pub fn database_path_prefix(&self) -> &str {
        &self.config.database_path_prefix
    }

    /// Store every path under `prefix`; callers keep using unprefixed paths.
    ///
    /// An empty prefix claims the whole store.
    pub fn set_database_path_prefix(&mut self, prefix: &str) -> Result<(), VfsError> {
        self.config.database_path_prefix = path::normalize(prefix)?;
        self.reset();
        Ok(())
    }

    /// Path relative to the tracked root, `None` if `logical` lies outside it.
    pub fn relative_path<'p>(&self, logical: &'p str) -> Option<&'p str> {
        path::strip_prefix(logical, &self.root)
    }

    /// Mount-manager path of a tracked path.
    pub fn logical_path(&self, relative: &str) -> String {
        path::join(&self.root, relative)
    }

    fn to_store(&self, relative: &str) -> String {
        path::join(&self.config.database_path_prefix, relative)
    }

    fn from_store<'p>(&self, stored: &'p str) -> Option<&'p str> {
        path::strip_prefix(stored, &self.config.database_path_prefix).filter(|p| !p.is_empty())
    }

    /// Drop every cached lookup.
    pub fn reset(&self) {
        self.cache.lock().clear();
    }

    pub fn get_path_from_id(&self, id: u64) -> Result<Option<String>, VfsError> {
        if let Some(cached) = self.cache.lock().path_for_id(id) {
            return Ok(cached.clone());
        }
        let found = self
            .store
            .get_by_id(id)?
            .and_then(|r| self.from_store(&r.path).map(str::to_string));
        self.cache.lock().insert_id(id, found.clone());
        Ok(found)
    }

    pub fn get_path_from_uuid(&self, uuid: &Uuid) -> Result<Option<String>, VfsError> {
        if let Some(cached) = self.cache.lock().path_for_uuid(uuid) {
            return Ok(cached.clone());
        }
        let found = self
            .store
            .get_by_uuid(uuid)?
            .and_then(|r| self.from_store(&r.path).map(str::to_string));
        self.cache.lock().insert_uuid(*uuid, found.clone());
        Ok(found)
    }

    /// Raw persisted row of a tracked path.
    pub fn find_record(&self, relative: &str) -> Result<Option<Record>, VfsError> {
        let relative = path::normalize(relative)?;
        if relative.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.cache.lock().record(&relative) {
            return Ok(cached.clone());
        }
        let found = self.store.get_by_path(&self.to_store(&relative))?;
        self.cache.lock().insert_record(relative, found.clone());
        Ok(found)
    }

    /// Item view of a tracked path, with uuid and decoded extra metadata.
    pub fn get_record(&self, relative: &str) -> Result<Option<FilesystemItem>, VfsError> {
        let relative = path::normalize(relative)?;
        Ok(self
            .find_record(&relative)?
            .map(|record| record.to_item(relative)))
    }

    /// Tracked items below `prefix`, ordered by path.
    pub fn get_records(&self, prefix: &str, deep: bool) -> Result<Vec<FilesystemItem>, VfsError> {
        let prefix = path::normalize(prefix)?;
        let rows = self.store.list_prefix(&self.to_store(&prefix), deep)?;
        Ok(rows
            .iter()
            .filter_map(|row| self.from_store(&row.path).map(|p| row.to_item(p)))
            .collect())
    }

    /// Persist extra metadata on a tracked path.
    pub fn set_extra_metadata(
        &self,
        relative: &str,
        metadata: &ExtraMetadata,
    ) -> Result<(), VfsError> {
        let relative = path::normalize(relative)?;
        self.store.set_extra_metadata(
            &self.to_store(&relative),
            metadata,
            chrono::Utc::now().timestamp(),
        )?;
        self.reset();
        Ok(())
    }

    /// Normalized, de-nested scopes; `None` means the whole tree.
    fn normalize_scopes(&self, scope: &[&str]) -> Result<Option<Vec<String>>, VfsError> {
        if scope.is_empty() {
            return Ok(None);
        }
        let mut normalized = Vec::with_capacity(scope.len());
        for s in scope {
            let s = path::normalize(s)?;
            if s.is_empty() {
                return Ok(None);
            }
            normalized.push(s);
        }
        normalized.sort_by(|a, b| path::depth(a).cmp(&path::depth(b)).then_with(|| a.cmp(b)));

        let mut kept: Vec<String> = Vec::new();
        for s in normalized {
            if !kept.iter().any(|k| path::is_within(&s, k)) {
                kept.push(s);
            }
        }
        Ok(Some(kept))
    }

    fn persisted_tree(&self, relative: &str) -> Result<Tree, VfsError> {
        let mut tree = Tree::new();
        if !relative.is_empty() {
            if let Some(record) = self.store.get_by_path(&self.to_store(relative))? {
                tree.insert(relative.to_string(), tree_entry(&record));
            }
        }
        for record in self.store.list_prefix(&self.to_store(relative), true)? {
            if let Some(p) = self.from_store(&record.path) {
                tree.insert(p.to_string(), tree_entry(&record));
            }
        }
        Ok(tree)
    }

    /// Compute the change set between the record and live storage
    ///
    /// An empty `scope` (or one containing the root) compares the whole tree.
    /// Otherwise only paths within the scopes are compared, and their
    /// ancestor directories are created or re-hashed so the aggregate hashes
    /// stay consistent with the scoped result.
    #[instrument(skip(self), fields(root = %self.root))]
    pub fn compute_change_set(&self, scope: &[&str]) -> Result<ChangeSet, VfsError> {
        let start = Instant::now();
        let scanner = Scanner::new(&self.mounts, &self.root, &self.config);
        let use_last_modified = self.config.use_last_modified;

        let change_set = match self.normalize_scopes(scope)? {
            None => {
                let persisted = self.persisted_tree("")?;
                let live = scanner.scan("")?;
                diff::diff(&persisted, &live, use_last_modified)
            }
            Some(scopes) => {
                let mut persisted = Tree::new();
                let mut live = Tree::new();
                for s in &scopes {
                    persisted.extend(self.persisted_tree(s)?);
                    live.extend(scanner.scan(s)?);
                }
                let scoped = diff::diff(&persisted, &live, use_last_modified);
                self.ancestor_changes(&scanner, &scopes, &live)?
                    .with_other(&scoped)
            }
        };

        info!(
            creates = change_set.items_to_create().len(),
            updates = change_set.items_to_update(false).len(),
            deletes = change_set.items_to_delete().len(),
            duration_ms = start.elapsed().as_millis(),
            "Change set computed"
        );
        Ok(change_set)
    }

    /// Creates and hash updates for the ancestor directories of scoped paths
    fn ancestor_changes(
        &self,
        scanner: &Scanner<'_>,
        scopes: &[String],
        live: &Tree,
    ) -> Result<ChangeSet, VfsError> {
        let ancestors: BTreeSet<&str> = scopes.iter().flat_map(|s| path::ancestors(s)).collect();
        let mut ordered: Vec<&str> = ancestors.into_iter().collect();
        ordered.sort_by(|a, b| path::depth(b).cmp(&path::depth(a)).then_with(|| a.cmp(b)));

        let mut recomputed: BTreeMap<String, Hash> = BTreeMap::new();
        let mut creates = Vec::new();
        let mut updates = BTreeMap::new();

        for ancestor in ordered {
            if scanner.is_excluded(ancestor)?
                || !self.mounts.is_live_directory(&self.logical_path(ancestor))?
            {
                continue;
            }

            let mut children: BTreeMap<String, Hash> = BTreeMap::new();
            for record in self.store.list_prefix(&self.to_store(ancestor), false)? {
                let Some(child) = self.from_store(&record.path) else {
                    continue;
                };
                if scopes.iter().any(|s| path::is_within(child, s)) {
                    continue;
                }
                children.insert(path::basename(child).to_string(), record.hash);
            }
            for s in scopes.iter().filter(|s| path::parent(s) == Some(ancestor)) {
                if let Some(entry) = live.get(s) {
                    children.insert(path::basename(s).to_string(), entry.hash);
                }
            }
            for (child, hash) in recomputed
                .iter()
                .filter(|(c, _)| path::parent(c) == Some(ancestor))
            {
                children.insert(path::basename(child).to_string(), *hash);
            }

            let hash = compute_directory_hash(&children.into_iter().collect::<Vec<_>>());
            recomputed.insert(ancestor.to_string(), hash);

            match self.store.get_by_path(&self.to_store(ancestor))? {
                Some(record) if record.is_directory() => {
                    if record.hash != hash {
                        updates.insert(ancestor.to_string(), UpdateDelta::hash(hash));
                    }
                }
                // A file row where a directory now lives is left to a full sync
                Some(_) => {}
                None => creates.push(CreateItem {
                    hash,
                    path: ancestor.to_string(),
                    item_type: ItemType::Directory,
                    last_modified: None,
                }),
            }
        }

        creates.sort_by(|a, b| {
            path::depth(&a.path)
                .cmp(&path::depth(&b.path))
                .then_with(|| a.path.cmp(&b.path))
        });
        debug!(creates = creates.len(), updates = updates.len(), "Ancestor changes");
        Ok(ChangeSet::new(creates, updates, BTreeMap::new(), BTreeMap::new()))
    }

    /// Apply a change set to the record store in one transaction.
    #[instrument(skip(self, change_set), fields(entries = change_set.len()))]
    pub fn apply_change_set(&self, change_set: &ChangeSet) -> Result<(), VfsError> {
        let start = Instant::now();
        let prefix = &self.config.database_path_prefix;
        let stored = if prefix.is_empty() {
            change_set.clone()
        } else {
            change_set.map_paths(|p| path::join(prefix, p))
        };

        let options = ApplyOptions {
            batch_size: self.config.bulk_insert_size,
            now: chrono::Utc::now().timestamp(),
            root: prefix,
        };
        let result = self.store.apply(&stored, &options);
        // Cached rows may be stale even after a failed attempt
        self.reset();
        result?;

        info!(duration_ms = start.elapsed().as_millis(), "Change set applied");
        Ok(())
    }

    /// Compute and apply the change set for `scope`, returning what changed.
    #[instrument(skip(self), fields(root = %self.root))]
    pub fn sync(&self, scope: &[&str]) -> Result<ChangeSet, VfsError> {
        let change_set = self.compute_change_set(scope)?;
        if !change_set.is_empty(true) {
            self.apply_change_set(&change_set)?;
        } else {
            self.reset();
        }
        Ok(change_set)
    }
}
