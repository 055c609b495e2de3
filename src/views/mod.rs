//! Filesystem decorators
//!
//! Each decorator wraps another [`Filesystem`](crate::vfs::Filesystem) and
//! implements the same trait, so they compose freely.

pub mod custom_view;
pub mod directory_filter;
pub mod permission;

pub use custom_view::CustomViewFilesystem;
pub use directory_filter::DirectoryFilterFilesystem;
pub use permission::{Authorizer, Permission, PermissionCheckingFilesystem};

use crate::item::{ExtraMetadata, FilesystemItem};

/// Directory that exists only in a view, without metadata.
pub(crate) fn virtual_directory(path: impl Into<String>) -> FilesystemItem {
    FilesystemItem::directory(path)
        .with_last_modified(None)
        .with_extra_metadata(ExtraMetadata::new())
}
