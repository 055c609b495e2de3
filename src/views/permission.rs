//! Authorization checks in front of a filesystem

use crate::adapter::WriteOptions;
use crate::error::VfsError;
use crate::item::{ExtraMetadata, FilesystemItem};
use crate::vfs::{AccessFlags, Filesystem, Location};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use tracing::warn;

/// Kind of access requested on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Decides whether an operation may proceed
pub trait Authorizer: Send + Sync {
    fn is_granted(&self, permission: Permission, path: &str) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(Permission, &str) -> bool + Send + Sync,
{
    fn is_granted(&self, permission: Permission, path: &str) -> bool {
        self(permission, path)
    }
}

/// Rejects operations the authorizer does not grant
///
/// Mutations are always checked. Reads are checked only when built with
/// [`PermissionCheckingFilesystem::with_read_checks`].
pub struct PermissionCheckingFilesystem {
    inner: Arc<dyn Filesystem>,
    authorizer: Arc<dyn Authorizer>,
    check_reads: bool,
}

impl PermissionCheckingFilesystem {
    pub fn new(inner: Arc<dyn Filesystem>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            inner,
            authorizer,
            check_reads: false,
        }
    }

    pub fn with_read_checks(mut self) -> Self {
        self.check_reads = true;
        self
    }

    fn check(&self, permission: Permission, location: Location<'_>) -> Result<(), VfsError> {
        let resolved = self.inner.resolve(location)?;
        if self.authorizer.is_granted(permission, &resolved) {
            return Ok(());
        }
        warn!(%permission, path = %resolved, "Access denied");
        Err(VfsError::AccessDenied(format!(
            "No {} permission on '{}'",
            permission, resolved
        )))
    }

    fn check_read(&self, location: Location<'_>) -> Result<(), VfsError> {
        if self.check_reads {
            self.check(Permission::Read, location)?;
        }
        Ok(())
    }
}

impl Filesystem for PermissionCheckingFilesystem {
    fn resolve(&self, location: Location<'_>) -> Result<String, VfsError> {
        self.inner.resolve(location)
    }

    fn file_exists(&self, location: Location<'_>, flags: AccessFlags) -> Result<bool, VfsError> {
        self.check_read(location)?;
        self.inner.file_exists(location, flags)
    }

    fn directory_exists(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<bool, VfsError> {
        self.check_read(location)?;
        self.inner.directory_exists(location, flags)
    }

    fn read(&self, location: Location<'_>) -> Result<Vec<u8>, VfsError> {
        self.check_read(location)?;
        self.inner.read(location)
    }

    fn read_stream(&self, location: Location<'_>) -> Result<Box<dyn Read + Send>, VfsError> {
        self.check_read(location)?;
        self.inner.read_stream(location)
    }

    fn write(
        &self,
        location: Location<'_>,
        contents: &[u8],
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.check(Permission::Write, location)?;
        self.inner.write(location, contents, options)
    }

    fn write_stream(
        &self,
        location: Location<'_>,
        contents: &mut dyn Read,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.check(Permission::Write, location)?;
        self.inner.write_stream(location, contents, options)
    }

    fn delete(&self, location: Location<'_>) -> Result<(), VfsError> {
        self.check(Permission::Delete, location)?;
        self.inner.delete(location)
    }

    fn delete_directory(&self, location: Location<'_>) -> Result<(), VfsError> {
        self.check(Permission::Delete, location)?;
        self.inner.delete_directory(location)
    }

    fn create_directory(
        &self,
        location: Location<'_>,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.check(Permission::Write, location)?;
        self.inner.create_directory(location, options)
    }

    fn copy(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.check(Permission::Read, source)?;
        self.check(Permission::Write, Location::Path(destination))?;
        self.inner.copy(source, destination, options)
    }

    fn rename(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        self.check(Permission::Delete, source)?;
        self.check(Permission::Write, Location::Path(destination))?;
        self.inner.rename(source, destination, options)
    }

    fn get(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<FilesystemItem>, VfsError> {
        self.check_read(location)?;
        self.inner.get(location, flags)
    }

    fn list_contents(
        &self,
        location: Location<'_>,
        deep: bool,
        flags: AccessFlags,
    ) -> Result<Vec<FilesystemItem>, VfsError> {
        self.check_read(location)?;
        let items = self.inner.list_contents(location, deep, flags)?;
        if !self.check_reads {
            return Ok(items);
        }
        Ok(items
            .into_iter()
            .filter(|item| self.authorizer.is_granted(Permission::Read, item.path()))
            .collect())
    }

    fn last_modified(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<i64>, VfsError> {
        self.check_read(location)?;
        self.inner.last_modified(location, flags)
    }

    fn file_size(&self, location: Location<'_>, flags: AccessFlags) -> Result<u64, VfsError> {
        self.check_read(location)?;
        self.inner.file_size(location, flags)
    }

    fn mime_type(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<String>, VfsError> {
        self.check_read(location)?;
        self.inner.mime_type(location, flags)
    }

    fn extra_metadata(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<ExtraMetadata, VfsError> {
        self.check_read(location)?;
        self.inner.extra_metadata(location, flags)
    }

    fn set_extra_metadata(
        &self,
        location: Location<'_>,
        metadata: &ExtraMetadata,
    ) -> Result<(), VfsError> {
        self.check(Permission::Write, location)?;
        self.inner.set_extra_metadata(location, metadata)
    }
}
