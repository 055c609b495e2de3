//! Mount manager
//!
//! Composes several storage adapters into one logical tree. Every operation is
//! routed to the adapter mounted at the most specific prefix of its path, and
//! every adapter failure is converted into [`VfsError::VirtualFilesystem`]
//! carrying the logical path the caller used.

use crate::adapter::{InMemoryAdapter, StorageAdapter, WriteOptions};
use crate::error::{AdapterError, VfsError};
use crate::item::{ExtraMetadata, FilesystemItem};
use crate::path;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// One entry of the mount table
#[derive(Clone)]
pub struct Mount {
    pub prefix: String,
    pub adapter: Arc<dyn StorageAdapter>,
}

/// A path resolved to the adapter responsible for it
struct Resolved<'a> {
    mount: &'a Mount,
    adapter_path: String,
}

/// Routes filesystem operations to the most specific mounted adapter
pub struct MountManager {
    /// Sorted by descending prefix depth; always contains the root mount.
    mounts: Vec<Mount>,
}

impl Default for MountManager {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryAdapter::new()))
    }
}

impl MountManager {
    /// Create a mount manager with `root` mounted at the empty prefix.
    pub fn new(root: Arc<dyn StorageAdapter>) -> Self {
        Self {
            mounts: vec![Mount {
                prefix: String::new(),
                adapter: root,
            }],
        }
    }

    /// Register (or replace) the adapter mounted at `prefix`.
    pub fn mount(
        &mut self,
        adapter: Arc<dyn StorageAdapter>,
        prefix: &str,
    ) -> Result<&mut Self, VfsError> {
        let prefix = path::normalize(prefix)?;
        debug!(prefix = %prefix, "Mounting adapter");

        match self.mounts.iter_mut().find(|m| m.prefix == prefix) {
            Some(existing) => existing.adapter = adapter,
            None => self.mounts.push(Mount { prefix, adapter }),
        }

        // Deepest prefix first so the first match is the most specific one
        self.mounts.sort_by(|a, b| {
            path::depth(&b.prefix)
                .cmp(&path::depth(&a.prefix))
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
        Ok(self)
    }

    /// Mount table in lookup order.
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Prefix of the mount responsible for `path`.
    pub fn mount_prefix_for(&self, logical_path: &str) -> Result<&str, VfsError> {
        let logical = path::normalize(logical_path)?;
        Ok(&self.resolve(&logical).mount.prefix)
    }

    fn resolve(&self, logical: &str) -> Resolved<'_> {
        for mount in &self.mounts {
            if let Some(rest) = path::strip_prefix(logical, &mount.prefix) {
                return Resolved {
                    mount,
                    adapter_path: rest.to_string(),
                };
            }
        }
        // The root mount matches every path, this is only reached if it was never registered
        let root = &self.mounts[self.mounts.len() - 1];
        Resolved {
            mount: root,
            adapter_path: logical.to_string(),
        }
    }

    fn call<T>(
        &self,
        operation: &'static str,
        logical_path: &str,
        f: impl FnOnce(&dyn StorageAdapter, &str) -> Result<T, AdapterError>,
    ) -> Result<T, VfsError> {
        let logical = path::normalize(logical_path)?;
        let resolved = self.resolve(&logical);
        trace!(
            operation,
            path = %logical,
            mount = %resolved.mount.prefix,
            "Routing to adapter"
        );
        f(resolved.mount.adapter.as_ref(), &resolved.adapter_path)
            .map_err(|e| VfsError::wrap(operation, &logical, e))
    }

    pub fn file_exists(&self, logical_path: &str) -> Result<bool, VfsError> {
        self.call("check existence of", logical_path, |a, p| a.file_exists(p))
    }

    pub fn directory_exists(&self, logical_path: &str) -> Result<bool, VfsError> {
        self.call("check existence of", logical_path, |a, p| a.directory_exists(p))
    }

    /// True if `path` is a directory in its adapter or holds a mount point below it
    ///
    /// Unlike [`MountManager::directory_exists`] this counts the parents that
    /// a deep listing synthesizes for nested mount points.
    pub fn is_live_directory(&self, logical_path: &str) -> Result<bool, VfsError> {
        let logical = path::normalize(logical_path)?;
        let holds_mount = self
            .mounts
            .iter()
            .any(|m| m.prefix != logical && path::is_within(&m.prefix, &logical));
        if holds_mount {
            return Ok(true);
        }
        self.directory_exists(&logical)
    }

    pub fn read(&self, logical_path: &str) -> Result<Vec<u8>, VfsError> {
        self.call("read", logical_path, |a, p| a.read(p))
    }

    pub fn read_stream(&self, logical_path: &str) -> Result<Box<dyn Read + Send>, VfsError> {
        self.call("read", logical_path, |a, p| a.read_stream(p))
    }

    pub fn write(
        &self,
        logical_path: &str,
        contents: &[u8],
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.call("write", logical_path, |a, p| a.write(p, contents, options))
    }

    pub fn write_stream(
        &self,
        logical_path: &str,
        contents: &mut dyn Read,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.call("write", logical_path, |a, p| a.write_stream(p, contents, options))
    }

    pub fn delete(&self, logical_path: &str) -> Result<(), VfsError> {
        self.call("delete", logical_path, |a, p| a.delete(p))
    }

    pub fn delete_directory(&self, logical_path: &str) -> Result<(), VfsError> {
        self.call("delete directory", logical_path, |a, p| a.delete_directory(p))
    }

    pub fn create_directory(
        &self,
        logical_path: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.call("create directory", logical_path, |a, p| {
            a.create_directory(p, options)
        })
    }

    /// True if both paths are served by the same adapter.
    pub fn same_adapter(&self, a: &str, b: &str) -> Result<bool, VfsError> {
        let a = path::normalize(a)?;
        let b = path::normalize(b)?;
        Ok(self.resolve(&a).mount.prefix == self.resolve(&b).mount.prefix)
    }

    fn two_path_call(
        &self,
        operation: &'static str,
        source: &str,
        destination: &str,
        f: impl FnOnce(&dyn StorageAdapter, &str, &str) -> Result<(), AdapterError>,
    ) -> Result<(), VfsError> {
        let source = path::normalize(source)?;
        let destination = path::normalize(destination)?;
        let from = self.resolve(&source);
        let to = self.resolve(&destination);

        if from.mount.prefix != to.mount.prefix {
            return Err(VfsError::Logic(format!(
                "Cannot {} '{}' to '{}' across adapters ('{}' and '{}')",
                operation, source, destination, from.mount.prefix, to.mount.prefix
            )));
        }

        f(
            from.mount.adapter.as_ref(),
            &from.adapter_path,
            &to.adapter_path,
        )
        .map_err(|e| VfsError::wrap(operation, &source, e))
    }

    /// Copy within one adapter; cross-adapter copies are a [`VfsError::Logic`] error.
    pub fn copy(
        &self,
        source: &str,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.two_path_call("copy", source, destination, |a, s, d| a.copy(s, d, options))
    }

    /// Move within one adapter; cross-adapter moves are a [`VfsError::Logic`] error.
    pub fn rename(
        &self,
        source: &str,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.two_path_call("move", source, destination, |a, s, d| {
            a.rename(s, d, options)
        })
    }

    pub fn last_modified(&self, logical_path: &str) -> Result<Option<i64>, VfsError> {
        self.call("read last modified time of", logical_path, |a, p| {
            a.last_modified(p)
        })
    }

    pub fn file_size(&self, logical_path: &str) -> Result<u64, VfsError> {
        self.call("read file size of", logical_path, |a, p| a.file_size(p))
    }

    pub fn mime_type(&self, logical_path: &str) -> Result<Option<String>, VfsError> {
        self.call("read mime type of", logical_path, |a, p| a.mime_type(p))
    }

    /// List the tree below `path` across all mounts
    ///
    /// Entries shadowed by a more specific mount are hidden. Mount points
    /// below `path` that have no adapter-level directory are reported as
    /// virtual directories without metadata. Results are sorted by path.
    #[instrument(skip(self))]
    pub fn list_contents(
        &self,
        logical_path: &str,
        deep: bool,
    ) -> Result<Vec<FilesystemItem>, VfsError> {
        let logical = path::normalize(logical_path)?;
        let covering = self.resolve(&logical);

        let nested: Vec<&Mount> = self
            .mounts
            .iter()
            .filter(|m| {
                m.prefix != covering.mount.prefix
                    && m.prefix != logical
                    && path::is_within(&m.prefix, &logical)
            })
            .collect();

        let mut entries: BTreeMap<String, FilesystemItem> = BTreeMap::new();

        let mut collect = |mount: &Mount, adapter_path: &str| -> Result<(), VfsError> {
            let items = mount
                .adapter
                .list_contents(adapter_path, deep)
                .map_err(|e| VfsError::wrap("list contents of", &logical, e))?;

            for item in items {
                let full = path::join(&mount.prefix, item.path());
                if self.is_shadowed(&full, &mount.prefix, item.is_directory()) {
                    continue;
                }
                entries.insert(full.clone(), item.with_path(full));
            }
            Ok(())
        };

        collect(covering.mount, &covering.adapter_path)?;
        if deep {
            for mount in &nested {
                collect(mount, "")?;
            }
        }

        for mount in &nested {
            let virtual_dir = if deep {
                mount.prefix.clone()
            } else {
                let rest = path::strip_prefix(&mount.prefix, &logical).unwrap_or_default();
                let first = rest.split('/').next().unwrap_or_default();
                path::join(&logical, first)
            };
            entries.entry(virtual_dir.clone()).or_insert_with(|| {
                FilesystemItem::directory(virtual_dir)
                    .with_last_modified(None)
                    .with_extra_metadata(ExtraMetadata::new())
            });
        }

        debug!(path = %logical, entry_count = entries.len(), "Listed contents");
        Ok(entries.into_values().collect())
    }

    /// True if `full` (listed by the mount at `owner`) lies in a more specific mount.
    ///
    /// A directory exactly at a mount point is kept as the real entry for it.
    fn is_shadowed(&self, full: &str, owner: &str, is_directory: bool) -> bool {
        self.mounts.iter().any(|m| {
            m.prefix != owner
                && path::is_within(&m.prefix, owner)
                && path::is_within(full, &m.prefix)
                && !(full == m.prefix && is_directory)
        })
    }
}
