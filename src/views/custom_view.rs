//! Label-based remapping of sub-trees

use crate::adapter::WriteOptions;
use crate::error::VfsError;
use crate::item::{ExtraMetadata, FilesystemItem};
use crate::path;
use crate::vfs::{AccessFlags, Filesystem, Location};
use crate::views::virtual_directory;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

/// Presents selected sub-trees of a filesystem under caller-chosen labels
///
/// The view root lists one directory per label; `label/rest` maps to
/// `target/rest` in the wrapped filesystem.
pub struct CustomViewFilesystem {
    inner: Arc<dyn Filesystem>,
    /// label -> path in the wrapped filesystem
    views: BTreeMap<String, String>,
}

fn configuration(err: VfsError) -> VfsError {
    match err {
        VfsError::Logic(message) => VfsError::Configuration(message),
        other => other,
    }
}

impl CustomViewFilesystem {
    /// Build a view from (label, target) pairs
    ///
    /// Labels must be non-empty single segments and unique. Targets must not
    /// contain each other.
    pub fn new<'a>(
        inner: Arc<dyn Filesystem>,
        views: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, VfsError> {
        let mut mapped: BTreeMap<String, String> = BTreeMap::new();
        for (label, target) in views {
            let label = path::normalize(label).map_err(configuration)?;
            let target = path::normalize(target).map_err(configuration)?;
            if label.is_empty() {
                return Err(VfsError::Configuration(
                    "View labels must not be empty".to_string(),
                ));
            }
            if label.contains('/') {
                return Err(VfsError::Configuration(format!(
                    "View label '{}' must be a single path segment",
                    label
                )));
            }
            if mapped.contains_key(&label) {
                return Err(VfsError::Configuration(format!(
                    "View label '{}' is used twice",
                    label
                )));
            }
            if let Some((other, _)) = mapped
                .iter()
                .find(|(_, t)| path::is_within(t, &target) || path::is_within(&target, t))
            {
                return Err(VfsError::Configuration(format!(
                    "View '{}' overlaps view '{}'",
                    label, other
                )));
            }
            mapped.insert(label, target);
        }
        Ok(Self {
            inner,
            views: mapped,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    /// Wrapped path of a location; `None` for the view root.
    fn inner_path(&self, location: Location<'_>) -> Result<Option<String>, VfsError> {
        let caller = match location {
            Location::Path(p) => path::normalize(p)?,
            Location::Uuid(_) => {
                let resolved = self.inner.resolve(location)?;
                if self.unmap(&resolved).is_none() {
                    return Err(VfsError::NotFound(format!(
                        "'{}' is not part of this view",
                        resolved
                    )));
                }
                return Ok(Some(resolved));
            }
        };
        if caller.is_empty() {
            return Ok(None);
        }
        let (label, rest) = caller.split_once('/').unwrap_or((caller.as_str(), ""));
        match self.views.get(label) {
            Some(target) => Ok(Some(path::join(target, rest))),
            None => Err(VfsError::Logic(format!(
                "'{}' is outside the view",
                caller
            ))),
        }
    }

    /// Wrapped path of a location that must not be the view root.
    fn inner_target(&self, location: Location<'_>, operation: &str) -> Result<String, VfsError> {
        self.inner_path(location)?.ok_or_else(|| {
            VfsError::Logic(format!("Cannot {} the root of a custom view", operation))
        })
    }

    fn unmap(&self, inner: &str) -> Option<String> {
        self.views.iter().find_map(|(label, target)| {
            path::strip_prefix(inner, target).map(|rest| path::join(label, rest))
        })
    }

    fn remap(&self, items: Vec<FilesystemItem>) -> Vec<FilesystemItem> {
        items
            .into_iter()
            .filter_map(|item| {
                let caller = self.unmap(item.path())?;
                Some(item.with_path(caller))
            })
            .collect()
    }

    fn list_root(&self, deep: bool, flags: AccessFlags) -> Result<Vec<FilesystemItem>, VfsError> {
        let mut items = Vec::new();
        for (label, target) in &self.views {
            let at = Location::Path(target);
            let entry = match self.inner.get(at, flags)? {
                Some(item) if item.is_directory() => item.with_path(label.clone()),
                _ => virtual_directory(label.clone()),
            };
            items.push(entry);
            if deep && self.inner.directory_exists(at, flags)? {
                items.extend(self.remap(self.inner.list_contents(at, true, flags)?));
            }
        }
        Ok(items)
    }
}

impl Filesystem for CustomViewFilesystem {
    fn resolve(&self, location: Location<'_>) -> Result<String, VfsError> {
        match self.inner_path(location)? {
            None => Ok(String::new()),
            Some(inner) => self
                .unmap(&inner)
                .ok_or_else(|| VfsError::NotFound(format!("'{}' is not part of this view", inner))),
        }
    }

    fn file_exists(&self, location: Location<'_>, flags: AccessFlags) -> Result<bool, VfsError> {
        match self.inner_path(location)? {
            None => Ok(false),
            Some(inner) => self.inner.file_exists(Location::Path(&inner), flags),
        }
    }

    fn directory_exists(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<bool, VfsError> {
        match self.inner_path(location)? {
            None => Ok(true),
            Some(inner) => self.inner.directory_exists(Location::Path(&inner), flags),
        }
    }

    fn read(&self, location: Location<'_>) -> Result<Vec<u8>, VfsError> {
        let inner = self.inner_target(location, "read")?;
        self.inner.read(Location::Path(&inner))
    }

    fn read_stream(&self, location: Location<'_>) -> Result<Box<dyn Read + Send>, VfsError> {
        let inner = self.inner_target(location, "read")?;
        self.inner.read_stream(Location::Path(&inner))
    }

    fn write(
        &self,
        location: Location<'_>,
        contents: &[u8],
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let inner = self.inner_target(location, "write")?;
        self.inner.write(Location::Path(&inner), contents, options)
    }

    fn write_stream(
        &self,
        location: Location<'_>,
        contents: &mut dyn Read,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let inner = self.inner_target(location, "write")?;
        self.inner.write_stream(Location::Path(&inner), contents, options)
    }

    fn delete(&self, location: Location<'_>) -> Result<(), VfsError> {
        let inner = self.inner_target(location, "delete")?;
        self.inner.delete(Location::Path(&inner))
    }

    fn delete_directory(&self, location: Location<'_>) -> Result<(), VfsError> {
        let inner = self.inner_target(location, "delete")?;
        self.inner.delete_directory(Location::Path(&inner))
    }

    fn create_directory(
        &self,
        location: Location<'_>,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let inner = self.inner_target(location, "create")?;
        self.inner.create_directory(Location::Path(&inner), options)
    }

    fn copy(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let from = self.inner_target(source, "copy")?;
        let to = self.inner_target(Location::Path(destination), "copy onto")?;
        self.inner.copy(Location::Path(&from), &to, options)
    }

    fn rename(
        &self,
        source: Location<'_>,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<(), VfsError> {
        let from = self.inner_target(source, "move")?;
        let to = self.inner_target(Location::Path(destination), "move onto")?;
        self.inner.rename(Location::Path(&from), &to, options)
    }

    fn get(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<FilesystemItem>, VfsError> {
        let Some(inner) = self.inner_path(location)? else {
            return Ok(Some(virtual_directory("")));
        };
        Ok(self
            .inner
            .get(Location::Path(&inner), flags)?
            .and_then(|item| {
                let caller = self.unmap(item.path())?;
                Some(item.with_path(caller))
            }))
    }

    fn list_contents(
        &self,
        location: Location<'_>,
        deep: bool,
        flags: AccessFlags,
    ) -> Result<Vec<FilesystemItem>, VfsError> {
        match self.inner_path(location)? {
            None => self.list_root(deep, flags),
            Some(inner) => Ok(self.remap(self.inner.list_contents(
                Location::Path(&inner),
                deep,
                flags,
            )?)),
        }
    }

    fn last_modified(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<i64>, VfsError> {
        match self.inner_path(location)? {
            None => Ok(None),
            Some(inner) => self.inner.last_modified(Location::Path(&inner), flags),
        }
    }

    fn file_size(&self, location: Location<'_>, flags: AccessFlags) -> Result<u64, VfsError> {
        let inner = self.inner_target(location, "read the size of")?;
        self.inner.file_size(Location::Path(&inner), flags)
    }

    fn mime_type(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<Option<String>, VfsError> {
        let inner = self.inner_target(location, "read the mime type of")?;
        self.inner.mime_type(Location::Path(&inner), flags)
    }

    fn extra_metadata(
        &self,
        location: Location<'_>,
        flags: AccessFlags,
    ) -> Result<ExtraMetadata, VfsError> {
        match self.inner_path(location)? {
            None => Ok(ExtraMetadata::new()),
            Some(inner) => self.inner.extra_metadata(Location::Path(&inner), flags),
        }
    }

    fn set_extra_metadata(
        &self,
        location: Location<'_>,
        metadata: &ExtraMetadata,
    ) -> Result<(), VfsError> {
        let inner = self.inner_target(location, "set metadata of")?;
        self.inner.set_extra_metadata(Location::Path(&inner), metadata)
    }
}
