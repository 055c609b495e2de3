//! Virtual filesystem façade
//!
//! [`VirtualFilesystem`] exposes one read/write API over a prefix of the
//! mount-manager tree. Paths are relative to that prefix. When a [`Dbafs`]
//! tracks the prefix, metadata is served from its records and every
//! successful mutation is synced back into them.

use crate::adapter::WriteOptions;
use crate::dbafs::Dbafs;
use crate::error::VfsError;
use crate::item::{ExtraMetadata, FilesystemItem};
use crate::mount::MountManager;
use crate::path;
use crate::types::Uuid;
use bitflags::bitflags;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

bitflags! {
    /// Per-call metadata access flags
    pub struct AccessFlags: u32 {
        /// Serve metadata from the DBAFS record when one exists
        const NONE = 0;
        /// Sync the path before answering
        const FORCE_SYNC = 1;
        /// Ignore the DBAFS record and ask the storage directly
        const BYPASS_DBAFS = 2;
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::NONE
    }
}

/// A path relative to the filesystem, or the stable identifier of a tracked item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location<'a> {
    Path(&'a str),
    Uuid(Uuid),
}

impl<'a> From<&'a str> for Location<'a> {
    fn from(path: &'a str) -> Self {
        Location::Path(path)
    }
}

impl<'a> From<&'a String> for Location<'a> {
    fn from(path: &'a String) -> Self {
        Location::Path(path)
    }
}

impl From<Uuid> for Location<'static> {
    fn from(uuid: Uuid) -> Self {
        Location::Uuid(uuid)
    }
}

/// Operations shared by the virtual filesystem and its decorators
pub trait Filesystem: Send + Sync {
    /// Caller-facing path of `location`.
    fn resolve(&self, location: Location<'_>) -> Result<String, VfsError>;

    fn file_exists(&self, location: Location<'_>, flags: AccessFlags) -> Result<bool, VfsError>;

    fn directory_exists(&self, location: Location<'_>, flags: AccessFlags)
        -> Result<bool, VfsError>;

    fn read(&self, location: Location<'_>) -> Result<Vec<u8>, VfsError>;

    fn read_stream(&self, location: Location<'_>) -> Result<Box<dyn Read + Send>, VfsError>;

    fn write(
        &self,
        location: Location<'_>,
        contents: &[u8],
        options: &WriteOptions,
    ) -> Result<(), VfsError>;

    fn write_stream(
        &self,
        location: Location<'_>,
        contents: &mut dyn Read,
        options: &WriteOptions,
    ) -> Result<(), VfsError>;

    fn delete(&self, location: Location<'_>) -> Result<(), VfsError>;

    fn delete_directory(&self, location: Location<'_>) -> Result<(), VfsError>;

    fn create_directory(&self, location: Location<'_>, options: &WriteOptions)
        -> Result<(), VfsError>;

    fn copy(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError>;

    /// Move `source` to `destination`.
    fn rename(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError>;

    /// The item at `location`, `None` if nothing exists there.
    fn get(&self, location: Location<'_>, flags: AccessFlags)
        -> Result<Option<FilesystemItem>, VfsError>;

    fn list_contents(
        &self,
        location: Location<'_>,
        deep: bool,
        flags: AccessFlags,
    ) -> Result<Vec<FilesystemItem>, VfsError>;

    fn last_modified(&self, location: Location<'_>, flags: AccessFlags)
        -> Result<Option<i64>, VfsError>;

    fn file_size(&self, location: Location<'_>, flags: AccessFlags) -> Result<u64, VfsError>;

    fn mime_type(&self, location: Location<'_>, flags: AccessFlags)
        -> Result<Option<String>, VfsError>;

    fn extra_metadata(&self, location: Location<'_>, flags: AccessFlags)
        -> Result<ExtraMetadata, VfsError>;

    fn set_extra_metadata(
        &self,
        location: Location<'_>,
        metadata: &ExtraMetadata,
    ) -> Result<(), VfsError>;
}

/// Filesystem over a prefix of the mount-manager tree
pub struct VirtualFilesystem {
    mounts: Arc<MountManager>,
    dbafs: Option<Arc<Dbafs>>,
    prefix: String,
    read_only: bool,
}

impl VirtualFilesystem {
    pub fn new(
        mounts: Arc<MountManager>,
        dbafs: Option<Arc<Dbafs>>,
        prefix: &str,
        read_only: bool,
    ) -> Result<Self, VfsError> {
        Ok(Self {
            mounts,
            dbafs,
            prefix: path::normalize(prefix)?,
            read_only,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn dbafs(&self) -> Option<&Arc<Dbafs>> {
        self.dbafs.as_ref()
    }

    /// Mount-manager path of a location.
    fn full_path(&self, location: Location<'_>) -> Result<String, VfsError> {
        match location {
            Location::Path(p) => Ok(path::join(&self.prefix, &path::normalize(p)?)),
            Location::Uuid(uuid) => {
                let dbafs = self.dbafs.as_ref().ok_or_else(|| {
                    VfsError::NotFound(format!("Cannot resolve uuid {} without a DBAFS", uuid))
                })?;
                let relative = dbafs
                    .get_path_from_uuid(&uuid)?
                    .ok_or_else(|| VfsError::NotFound(format!("No record with uuid {}", uuid)))?;
                let full = dbafs.logical_path(&relative);
                if !path::is_within(&full, &self.prefix) {
                    return Err(VfsError::NotFound(format!(
                        "Uuid {} resolves to '{}' outside '{}'",
                        uuid, full, self.prefix
                    )));
                }
                Ok(full)
            }
        }
    }

    fn caller_path(&self, full: &str) -> String {
        path::strip_prefix(full, &self.prefix)
            .unwrap_or(full)
            .to_string()
    }

    fn ensure_writable(&self, operation: &str) -> Result<(), VfsError> {
        if self.read_only {
            return Err(VfsError::Logic(format!(
                "Cannot {} on a read-only filesystem",
                operation
            )));
        }
        Ok(())
    }

    /// DBAFS and relative path, if `full` is tracked.
    fn tracked<'p>(&self, full: &'p str) -> Option<(&Dbafs, &'p str)> {
        let dbafs = self.dbafs.as_deref()?;
        dbafs.relative_path(full).map(|relative| (dbafs, relative))
    }

    /// Write-through sync of the tracked paths among `fulls`.
    fn sync_paths(&self, fulls: &[&str]) -> Result<(), VfsError> {
        let Some(dbafs) = self.dbafs.as_deref() else {
            return Ok(());
        };
        let scope: Vec<&str> = fulls
            .iter()
            .filter_map(|full| dbafs.relative_path(full))
            .collect();
        if scope.is_empty() {
            return Ok(());
        }
        debug!(?scope, "Write-through sync");
        dbafs.sync(&scope)?;
        Ok(())
    }

    /// DBAFS record of `full` honouring the access flags.
    fn record(&self, full: &str, flags: AccessFlags) -> Result<Option<FilesystemItem>, VfsError> {
        if flags.contains(AccessFlags::BYPASS_DBAFS) {
            return Ok(None);
        }
        let Some((dbafs, relative)) = self.tracked(full) else {
            return Ok(None);
        };
        if flags.contains(AccessFlags::FORCE_SYNC) {
            dbafs.sync(&[relative])?;
        }
        dbafs.get_record(relative)
    }

    /// Storage view of `full` with lazily resolved metadata.
    fn storage_item(&self, full: &str) -> Result<Option<FilesystemItem>, VfsError> {
        let caller = self.caller_path(full);
        let mounts = self.mounts.clone();
        let at = full.to_string();
        if !full.is_empty() && self.mounts.file_exists(full)? {
            let (size_mounts, size_at) = (mounts.clone(), at.clone());
            let (mime_mounts, mime_at) = (mounts.clone(), at.clone());
            return Ok(Some(
                FilesystemItem::file(caller)
                    .with_last_modified_fn(move || mounts.last_modified(&at).ok().flatten())
                    .with_file_size_fn(move || size_mounts.file_size(&size_at).ok())
                    .with_mime_type_fn(move || mime_mounts.mime_type(&mime_at).ok().flatten()),
            ));
        }
        if self.mounts.directory_exists(full)? {
            return Ok(Some(
                FilesystemItem::directory(caller)
                    .with_last_modified_fn(move || mounts.last_modified(&at).ok().flatten()),
            ));
        }
        Ok(None)
    }

    fn storage_extra_metadata(&self, full: &str) -> Result<ExtraMetadata, VfsError> {
        let Some(parent) = path::parent(full) else {
            return Ok(ExtraMetadata::new());
        };
        let listed = self.mounts.list_contents(parent, false)?;
        Ok(listed
            .into_iter()
            .find(|item| item.path() == full)
            .map(|item| item.extra_metadata().clone())
            .unwrap_or_default())
    }

    /// Copy between adapters by streaming every file.
    fn copy_across(&self, from: &str, to: &str, options: &WriteOptions) -> Result<(), VfsError> {
        if self.mounts.file_exists(from)? {
            let mut reader = self.mounts.read_stream(from)?;
            return self.mounts.write_stream(to, &mut reader, options);
        }
        if !self.mounts.directory_exists(from)? {
            return Err(VfsError::NotFound(format!("Nothing to copy at '{}'", from)));
        }
        self.mounts.create_directory(to, options)?;
        for item in self.mounts.list_contents(from, true)? {
            let rest = path::strip_prefix(item.path(), from).unwrap_or_default();
            let target = path::join(to, rest);
            if item.is_directory() {
                self.mounts.create_directory(&target, options)?;
            } else {
                let mut reader = self.mounts.read_stream(item.path())?;
                self.mounts.write_stream(&target, &mut reader, options)?;
            }
        }
        Ok(())
    }
}

impl Filesystem for VirtualFilesystem {
    fn resolve(&self, location: Location<'_>) -> Result<String, VfsError> {
        Ok(self.caller_path(&self.full_path(location)?))
    }

    fn file_exists(&self, location: Location<'_>, flags: AccessFlags) -> Result<bool, VfsError> {
        let full = self.full_path(location)?;
        if let Some(record) = self.record(&full, flags)? {
            return Ok(record.is_file());
        }
        if full.is_empty() {
            return Ok(false);
        }
        self.mounts.file_exists(&full)
    }

    fn directory_exists(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<bool, VfsError> {
        let full = self.full_path(location)?;
        if let Some(record) = self.record(&full, flags)? {
            return Ok(record.is_directory());
        }
        self.mounts.directory_exists(&full)
    }

    fn read(&self, location: Location<'_>) -> Result<Vec<u8>, VfsError> {
        self.mounts.read(&self.full_path(location)?)
    }

    fn read_stream(&self, location: Location<'_>) -> Result<Box<dyn Read + Send>, VfsError> {
        self.mounts.read_stream(&self.full_path(location)?)
    }

    fn write(
        &self,
        location: Location<'_>,
        contents: &[u8],
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.ensure_writable("write")?;
        let full = self.full_path(location)?;
        self.mounts.write(&full, contents, options)?;
        self.sync_paths(&[&full])
    }

    fn write_stream(
        &self,
        location: Location<'_>,
        contents: &mut dyn Read,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.ensure_writable("write")?;
        let full = self.full_path(location)?;
        self.mounts.write_stream(&full, contents, options)?;
        self.sync_paths(&[&full])
    }

    fn delete(&self, location: Location<'_>) -> Result<(), VfsError> {
        self.ensure_writable("delete")?;
        let full = self.full_path(location)?;
        self.mounts.delete(&full)?;
        self.sync_paths(&[&full])
    }

    fn delete_directory(&self, location: Location<'_>) -> Result<(), VfsError> {
        self.ensure_writable("delete a directory")?;
        let full = self.full_path(location)?;
        self.mounts.delete_directory(&full)?;
        self.sync_paths(&[&full])
    }

    fn create_directory(
        &self,
        location: Location<'_>,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.ensure_writable("create a directory")?;
        let full = self.full_path(location)?;
        self.mounts.create_directory(&full, options)?;
        self.sync_paths(&[&full])
    }

    fn copy(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.ensure_writable("copy")?;
        let from = self.full_path(source)?;
        let to = self.full_path(Location::Path(destination))?;
        if self.mounts.same_adapter(&from, &to)? {
            self.mounts.copy(&from, &to, options)?;
        } else {
            self.copy_across(&from, &to, options)?;
        }
        self.sync_paths(&[&to])
    }

    fn rename(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.ensure_writable("move")?;
        let from = self.full_path(source)?;
        let to = self.full_path(Location::Path(destination))?;
        if self.mounts.same_adapter(&from, &to)? {
            self.mounts.rename(&from, &to, options)?;
        } else {
            let is_file = self.mounts.file_exists(&from)?;
            self.copy_across(&from, &to, options)?;
            if is_file {
                self.mounts.delete(&from)?;
            } else {
                self.mounts.delete_directory(&from)?;
            }
        }
        self.sync_paths(&[&from, &to])
    }

    fn get(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<FilesystemItem>, VfsError> {
        let full = self.full_path(location)?;
        let caller = self.caller_path(&full);
        let storage = self.storage_item(&full)?;
        match (self.record(&full, flags)?, storage) {
            (Some(record), Some(storage)) => Ok(Some(
                record.with_path(caller).with_metadata_if_not_defined(storage),
            )),
            (Some(record), None) => Ok(Some(record.with_path(caller))),
            (None, storage) => Ok(storage),
        }
    }

    fn list_contents(
        &self,
        location: Location<'_>,
        deep: bool,
        flags: AccessFlags,
    ) -> Result<Vec<FilesystemItem>, VfsError> {
        let full = self.full_path(location)?;
        let listed = self.mounts.list_contents(&full, deep)?;

        let mut records: HashMap<String, FilesystemItem> = HashMap::new();
        if !flags.contains(AccessFlags::BYPASS_DBAFS) {
            if let Some((dbafs, relative)) = self.tracked(&full) {
                if flags.contains(AccessFlags::FORCE_SYNC) {
                    dbafs.sync(&[relative])?;
                }
                for record in dbafs.get_records(relative, deep)? {
                    records.insert(dbafs.logical_path(record.path()), record);
                }
            }
        }

        Ok(listed
            .into_iter()
            .map(|item| {
                let caller = self.caller_path(item.path());
                match records.remove(item.path()) {
                    Some(record) => record
                        .with_path(caller)
                        .with_metadata_if_not_defined(item),
                    None => item.with_path(caller),
                }
            })
            .collect())
    }

    fn last_modified(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<i64>, VfsError> {
        let full = self.full_path(location)?;
        if let Some(record) = self.record(&full, flags)? {
            if let Some(timestamp) = record.last_modified() {
                return Ok(Some(timestamp));
            }
        }
        self.mounts.last_modified(&full)
    }

    fn file_size(&self, location: Location<'_>, flags: AccessFlags) -> Result<u64, VfsError> {
        let full = self.full_path(location)?;
        if flags.contains(AccessFlags::FORCE_SYNC) {
            self.record(&full, flags)?;
        }
        self.mounts.file_size(&full)
    }

    fn mime_type(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<String>, VfsError> {
        let full = self.full_path(location)?;
        if flags.contains(AccessFlags::FORCE_SYNC) {
            self.record(&full, flags)?;
        }
        self.mounts.mime_type(&full)
    }

    fn extra_metadata(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<ExtraMetadata, VfsError> {
        let full = self.full_path(location)?;
        match self.record(&full, flags)? {
            Some(record) => Ok(record.extra_metadata().clone()),
            None => self.storage_extra_metadata(&full),
        }
    }

    fn set_extra_metadata(
        &self,
        location: Location<'_>,
        metadata: &ExtraMetadata,
    ) -> Result<(), VfsError> {
        self.ensure_writable("set extra metadata")?;
        let full = self.full_path(location)?;
        let Some((dbafs, relative)) = self.tracked(&full) else {
            return Err(VfsError::Logic(format!(
                "Cannot set extra metadata of '{}': path is not tracked",
                full
            )));
        };
        dbafs.set_extra_metadata(relative, metadata)
    }
}
