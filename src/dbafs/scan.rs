//! Live tree scanning
//!
//! Walks the mount-manager tree below the tracked root and computes content
//! hashes for files and aggregate hashes for directories. Excluded subtrees
//! and oversized files are treated as absent.

use crate::config::SyncConfig;
use crate::dbafs::diff::{Tree, TreeEntry};
use crate::error::{AdapterError, VfsError};
use crate::hasher::{compute_directory_hash, compute_stream_hash};
use crate::mount::MountManager;
use crate::path;
use crate::types::{Hash, ItemType};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// Scanner over the tree tracked by one DBAFS instance
pub struct Scanner<'a> {
    mounts: &'a MountManager,
    root: &'a str,
    config: &'a SyncConfig,
}

struct ListedFile {
    path: String,
    size: Option<u64>,
    last_modified: Option<i64>,
}

impl<'a> Scanner<'a> {
    pub fn new(mounts: &'a MountManager, root: &'a str, config: &'a SyncConfig) -> Self {
        Self {
            mounts,
            root,
            config,
        }
    }

    fn logical(&self, relative: &str) -> String {
        path::join(self.root, relative)
    }

    fn is_marker(&self, relative: &str) -> bool {
        !relative.is_empty() && path::basename(relative) == self.config.exclusion_marker
    }

    fn contains_marker(&self, dir: &str) -> Result<bool, VfsError> {
        let marker = path::join(&self.logical(dir), &self.config.exclusion_marker);
        self.mounts.file_exists(&marker)
    }

    /// True if `relative` is a marker file or lies in a directory holding one.
    ///
    /// A directory that merely carries the marker's name is tracked.
    pub fn is_excluded(&self, relative: &str) -> Result<bool, VfsError> {
        if self.is_marker(relative) && self.mounts.file_exists(&self.logical(relative))? {
            return Ok(true);
        }
        let mut dirs = vec![""];
        dirs.extend(path::ancestors(relative));
        if !relative.is_empty() {
            dirs.push(relative);
        }
        for dir in dirs {
            if self.contains_marker(dir)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn exceeds_size_limit(&self, size: u64) -> bool {
        self.config.max_file_size > 0 && size > self.config.max_file_size
    }

    /// Hash one file; `None` if it is too large to be tracked.
    fn hash_file(&self, file: &ListedFile) -> Result<Option<TreeEntry>, VfsError> {
        let logical = self.logical(&file.path);
        let size = match file.size {
            Some(size) => size,
            None => self.mounts.file_size(&logical)?,
        };
        if self.exceeds_size_limit(size) {
            debug!(path = %logical, size, "Skipping file above size limit");
            return Ok(None);
        }

        let mut reader = self.mounts.read_stream(&logical)?;
        let hash = compute_stream_hash(&mut reader)
            .map_err(|e| VfsError::wrap("hash", &logical, AdapterError::io(logical.as_str(), e)))?;

        let last_modified = match (self.config.use_last_modified, file.last_modified) {
            (false, _) => None,
            (true, Some(timestamp)) => Some(timestamp),
            (true, None) => self.mounts.last_modified(&logical)?,
        };

        trace!(path = %logical, hash = %hex::encode(hash), "Hashed file");
        Ok(Some(TreeEntry {
            item_type: ItemType::File,
            hash,
            last_modified,
        }))
    }

    /// Scan the live tree at `scope` (relative to the root, `""` for everything)
    ///
    /// The returned tree contains `scope` itself (unless it is the root) and
    /// everything tracked below it. Any storage error aborts the scan.
    pub fn scan(&self, scope: &str) -> Result<Tree, VfsError> {
        let mut tree = Tree::new();
        if self.is_excluded(scope)? {
            debug!(scope, "Scope is excluded from tracking");
            return Ok(tree);
        }

        let logical = self.logical(scope);
        if !scope.is_empty() && self.mounts.file_exists(&logical)? {
            let file = ListedFile {
                path: scope.to_string(),
                size: None,
                last_modified: None,
            };
            if let Some(entry) = self.hash_file(&file)? {
                tree.insert(scope.to_string(), entry);
            }
            return Ok(tree);
        }
        if !scope.is_empty() && !self.mounts.is_live_directory(&logical)? {
            return Ok(tree);
        }

        let mut files = Vec::new();
        let mut dirs: BTreeSet<String> = BTreeSet::new();
        if !scope.is_empty() {
            dirs.insert(scope.to_string());
        }
        for item in self.mounts.list_contents(&logical, true)? {
            let Some(relative) = path::strip_prefix(item.path(), self.root) else {
                continue;
            };
            if item.is_file() {
                files.push(ListedFile {
                    path: relative.to_string(),
                    size: item.file_size().ok().flatten(),
                    last_modified: item.last_modified(),
                });
            } else {
                dirs.insert(relative.to_string());
            }
        }

        let excluded: Vec<String> = files
            .iter()
            .filter(|f| self.is_marker(&f.path))
            .filter_map(|f| path::parent(&f.path).map(str::to_string))
            .collect();
        let is_excluded = |p: &str| excluded.iter().any(|dir| path::is_within(p, dir));

        files.retain(|f| !self.is_marker(&f.path) && !is_excluded(&f.path));
        dirs.retain(|d| !is_excluded(d));

        // Mount points may appear without their parents
        let listed: Vec<String> = files
            .iter()
            .map(|f| f.path.clone())
            .chain(dirs.iter().cloned())
            .collect();
        for entry in &listed {
            for ancestor in path::ancestors(entry) {
                if path::is_within(ancestor, scope) && ancestor != scope {
                    dirs.insert(ancestor.to_string());
                }
            }
        }

        let mut children: HashMap<String, Vec<(String, Hash)>> = HashMap::new();
        for file in &files {
            let Some(entry) = self.hash_file(file)? else {
                continue;
            };
            let parent = path::parent(&file.path).unwrap_or("").to_string();
            children
                .entry(parent)
                .or_default()
                .push((path::basename(&file.path).to_string(), entry.hash));
            tree.insert(file.path.clone(), entry);
        }

        let mut ordered: Vec<&String> = dirs.iter().collect();
        ordered.sort_by(|a, b| path::depth(b).cmp(&path::depth(a)).then_with(|| a.cmp(b)));
        for dir in ordered {
            let hash = compute_directory_hash(&children.remove(dir.as_str()).unwrap_or_default());
            let parent = path::parent(dir).unwrap_or("").to_string();
            children
                .entry(parent)
                .or_default()
                .push((path::basename(dir).to_string(), hash));
            tree.insert(
                dir.clone(),
                TreeEntry {
                    item_type: ItemType::Directory,
                    hash,
                    last_modified: None,
                },
            );
        }

        debug!(scope, entries = tree.len(), "Scanned live tree");
        Ok(tree)
    }
}
