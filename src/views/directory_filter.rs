//! Allow-list restriction of a filesystem

use crate::adapter::WriteOptions;
use crate::error::VfsError;
use crate::item::{ExtraMetadata, FilesystemItem};
use crate::path;
use crate::vfs::{AccessFlags, Filesystem, Location};
use crate::views::virtual_directory;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

/// Exposes only the sub-trees on an allow-list
///
/// Directories leading to an allowed path (its trail) are visible too, as
/// virtual empty directories if they do not exist. Anything else is hidden,
/// and every mutation must target an allowed sub-tree.
pub struct DirectoryFilterFilesystem {
    inner: Arc<dyn Filesystem>,
    allowed: Vec<String>,
}

impl DirectoryFilterFilesystem {
    pub fn new(inner: Arc<dyn Filesystem>, allowed: &[&str]) -> Result<Self, VfsError> {
        let mut normalized: Vec<String> = Vec::with_capacity(allowed.len());
        for entry in allowed {
            let entry = path::normalize(entry)?;
            if let Some(covering) = normalized
                .iter()
                .find(|a| path::is_within(&entry, a) || path::is_within(a, &entry))
            {
                return Err(VfsError::Configuration(format!(
                    "Allowed path '{}' overlaps '{}'",
                    entry, covering
                )));
            }
            normalized.push(entry);
        }
        normalized.sort();
        Ok(Self {
            inner,
            allowed: normalized,
        })
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    fn is_allowed(&self, p: &str) -> bool {
        self.allowed.iter().any(|a| path::is_within(p, a))
    }

    fn is_trail(&self, p: &str) -> bool {
        !self.is_allowed(p) && self.allowed.iter().any(|a| path::is_within(a, p))
    }

    fn path_of(&self, location: Location<'_>) -> Result<String, VfsError> {
        match location {
            Location::Path(p) => path::normalize(p),
            Location::Uuid(_) => self.inner.resolve(location),
        }
    }

    /// Path of a location inside the allow-list.
    fn allowed_path(&self, location: Location<'_>, operation: &str) -> Result<String, VfsError> {
        let p = self.path_of(location)?;
        if !self.is_allowed(&p) {
            return Err(VfsError::Logic(format!(
                "Cannot {} '{}': outside the allowed directories",
                operation, p
            )));
        }
        Ok(p)
    }

    fn trail_item(&self, p: &str, flags: AccessFlags) -> Result<FilesystemItem, VfsError> {
        Ok(self
            .inner
            .get(Location::Path(p), flags)?
            .filter(|item| item.is_directory())
            .unwrap_or_else(|| virtual_directory(p)))
    }

    fn list_trail(
        &self,
        p: &str,
        deep: bool,
        flags: AccessFlags,
    ) -> Result<Vec<FilesystemItem>, VfsError> {
        let mut entries: BTreeMap<String, FilesystemItem> = BTreeMap::new();
        for allowed in self.allowed.iter().filter(|a| path::is_within(a, p)) {
            let rest = path::strip_prefix(allowed, p).unwrap_or_default();
            let segments: Vec<&str> = rest.split('/').collect();
            let reach = if deep { segments.len() } else { 1 };

            let mut current = p.to_string();
            for segment in segments.iter().take(reach) {
                current = path::join(&current, segment);
                if entries.contains_key(&current) {
                    continue;
                }
                if current == *allowed {
                    if let Some(item) = self.inner.get(Location::Path(&current), flags)? {
                        entries.insert(current.clone(), item);
                    }
                } else {
                    let item = self.trail_item(&current, flags)?;
                    entries.insert(current.clone(), item.with_path(current.clone()));
                }
            }

            if deep && self.inner.directory_exists(Location::Path(allowed), flags)? {
                for item in self
                    .inner
                    .list_contents(Location::Path(allowed), true, flags)?
                {
                    entries.insert(item.path().to_string(), item);
                }
            }
        }
        Ok(entries.into_values().collect())
    }
}

impl Filesystem for DirectoryFilterFilesystem {
    fn resolve(&self, location: Location<'_>) -> Result<String, VfsError> {
        let p = self.path_of(location)?;
        if self.is_allowed(&p) || self.is_trail(&p) {
            Ok(p)
        } else {
            Err(VfsError::NotFound(format!("'{}' is not visible", p)))
        }
    }

    fn file_exists(&self, location: Location<'_>, flags: AccessFlags) -> Result<bool, VfsError> {
        let p = self.path_of(location)?;
        if !self.is_allowed(&p) {
            return Ok(false);
        }
        self.inner.file_exists(Location::Path(&p), flags)
    }

    fn directory_exists(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<bool, VfsError> {
        let p = self.path_of(location)?;
        if self.is_trail(&p) {
            return Ok(true);
        }
        if !self.is_allowed(&p) {
            return Ok(false);
        }
        self.inner.directory_exists(Location::Path(&p), flags)
    }

    fn read(&self, location: Location<'_>) -> Result<Vec<u8>, VfsError> {
        let p = self.allowed_path(location, "read")?;
        self.inner.read(Location::Path(&p))
    }

    fn read_stream(&self, location: Location<'_>) -> Result<Box<dyn Read + Send>, VfsError> {
        let p = self.allowed_path(location, "read")?;
        self.inner.read_stream(Location::Path(&p))
    }

    fn write(
        &self,
        location: Location<'_>,
        contents: &[u8],
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let p = self.allowed_path(location, "write")?;
        self.inner.write(Location::Path(&p), contents, options)
    }

    fn write_stream(
        &self,
        location: Location<'_>,
        contents: &mut dyn Read,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let p = self.allowed_path(location, "write")?;
        self.inner.write_stream(Location::Path(&p), contents, options)
    }

    fn delete(&self, location: Location<'_>) -> Result<(), VfsError> {
        let p = self.allowed_path(location, "delete")?;
        self.inner.delete(Location::Path(&p))
    }

    fn delete_directory(&self, location: Location<'_>) -> Result<(), VfsError> {
        let p = self.allowed_path(location, "delete")?;
        self.inner.delete_directory(Location::Path(&p))
    }

    fn create_directory(
        &self,
        location: Location<'_>,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let p = self.allowed_path(location, "create")?;
        self.inner.create_directory(Location::Path(&p), options)
    }

    fn copy(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let from = self.allowed_path(source, "copy")?;
        let to = self.allowed_path(Location::Path(destination), "copy onto")?;
        self.inner.copy(Location::Path(&from), &to, options)
    }

    fn rename(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let from = self.allowed_path(source, "move")?;
        let to = self.allowed_path(Location::Path(destination), "move onto")?;
        self.inner.rename(Location::Path(&from), &to, options)
    }

    fn get(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<FilesystemItem>, VfsError> {
        let p = self.path_of(location)?;
        if self.is_trail(&p) {
            return Ok(Some(self.trail_item(&p, flags)?));
        }
        if !self.is_allowed(&p) {
            return Ok(None);
        }
        self.inner.get(Location::Path(&p), flags)
    }

    fn list_contents(
        &self,
        location: Location<'_>,
        deep: bool,
        flags: AccessFlags,
    ) -> Result<Vec<FilesystemItem>, VfsError> {
        let p = self.path_of(location)?;
        if self.is_trail(&p) {
            return self.list_trail(&p, deep, flags);
        }
        let p = self.allowed_path(Location::Path(&p), "list")?;
        self.inner.list_contents(Location::Path(&p), deep, flags)
    }

    fn last_modified(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<i64>, VfsError> {
        let p = self.path_of(location)?;
        if self.is_trail(&p) {
            return Ok(self.trail_item(&p, flags)?.last_modified());
        }
        let p = self.allowed_path(Location::Path(&p), "read")?;
        self.inner.last_modified(Location::Path(&p), flags)
    }

    fn file_size(&self, location: Location<'_>, flags: AccessFlags) -> Result<u64, VfsError> {
        let p = self.allowed_path(location, "read")?;
        self.inner.file_size(Location::Path(&p), flags)
    }

    fn mime_type(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<String>, VfsError> {
        let p = self.allowed_path(location, "read")?;
        self.inner.mime_type(Location::Path(&p), flags)
    }

    fn extra_metadata(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<ExtraMetadata, VfsError> {
        let p = self.path_of(location)?;
        if self.is_trail(&p) {
            return Ok(ExtraMetadata::new());
        }
        let p = self.allowed_path(Location::Path(&p), "read")?;
        self.inner.extra_metadata(Location::Path(&p), flags)
    }

    fn set_extra_metadata(
        &self,
        location: Location<'_>,
        metadata: &ExtraMetadata,
    ) -> Result<(), VfsError> {
        let p = self.allowed_path(location, "set metadata of")?;
        self.inner.set_extra_metadata(Location::Path(&p), metadata)
    }
}
