//! Filesystem items and their lazily resolved metadata.

use crate::error::VfsError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;
use uuid::Uuid;

type Deferred<T> = Box<dyn FnOnce() -> T + Send>;

/// A metadata slot that is either undefined, resolved, or deferred
///
/// A deferred computation runs at most once, on first access, and its result
/// is memoized. Undefined slots read as `T::default()`.
pub struct Lazy<T> {
    value: OnceLock<T>,
    init: Mutex<Option<Deferred<T>>>,
}

impl<T: Default> Lazy<T> {
    pub fn undefined() -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(None),
        }
    }

    pub fn resolved(value: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Self {
            value: cell,
            init: Mutex::new(None),
        }
    }

    pub fn deferred(f: impl FnOnce() -> T + Send + 'static) -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(Some(Box::new(f))),
        }
    }

    /// True once a value or a deferred computation has been supplied.
    pub fn is_defined(&self) -> bool {
        self.value.get().is_some() || self.init.lock().is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn get(&self) -> &T {
        self.value.get_or_init(|| {
            let compute = self.init.lock().take();
            match compute {
                Some(compute) => compute(),
                None => T::default(),
            }
        })
    }
}

impl<T: Default> Default for Lazy<T> {
    fn default() -> Self {
        Self::undefined()
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.get() {
            Some(value) => write!(f, "{:?}", value),
            None if self.init.lock().is_some() => f.write_str("<deferred>"),
            None => f.write_str("<undefined>"),
        }
    }
}

/// Focus rectangle of an image, relative to its dimensions (0.0..=1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportantPart {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ImportantPart {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, VfsError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(x) && in_unit(y) && in_unit(width) && in_unit(height))
            || x + width > 1.0 + f64::EPSILON
            || y + height > 1.0 + f64::EPSILON
        {
            return Err(VfsError::Logic(format!(
                "Important part ({}, {}, {}, {}) exceeds the unit square",
                x, y, width, height
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }
}

/// Per-locale metadata (locale -> field -> value)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LocalizedMetadata(BTreeMap<String, BTreeMap<String, String>>);

impl LocalizedMetadata {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, locale: &str, key: &str, value: impl Into<String>) {
        self.0
            .entry(locale.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn for_locale(&self, locale: &str) -> Option<&BTreeMap<String, String>> {
        self.0.get(locale)
    }

    /// Serialize into the blob stored in the `meta` column.
    pub fn to_blob(&self) -> Result<Vec<u8>, VfsError> {
        if self.0.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::to_vec(&self.0)
            .map_err(|e| VfsError::Storage(format!("Failed to serialize metadata: {}", e)))
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, VfsError> {
        if blob.is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_slice(blob)
            .map(Self)
            .map_err(|e| VfsError::Storage(format!("Failed to parse metadata blob: {}", e)))
    }
}

impl Deref for LocalizedMetadata {
    type Target = BTreeMap<String, BTreeMap<String, String>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for LocalizedMetadata {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Arbitrary metadata attached to an item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtraMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub important_part: Option<ImportantPart>,

    #[serde(default, skip_serializing_if = "LocalizedMetadata::is_empty")]
    pub localized: LocalizedMetadata,

    /// Backend-specific values
    #[serde(default, flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl ExtraMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.important_part.is_none() && self.localized.is_empty() && self.other.is_empty()
    }
}

/// One node (file or directory) of the virtual tree
pub struct FilesystemItem {
    is_file: bool,
    path: String,
    last_modified: Lazy<Option<i64>>,
    file_size: Lazy<Option<u64>>,
    mime_type: Lazy<Option<String>>,
    extra_metadata: Lazy<ExtraMetadata>,
    uuid: Option<Uuid>,
}

impl FilesystemItem {
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(true, path.into())
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self::new(false, path.into())
    }

    fn new(is_file: bool, path: String) -> Self {
        Self {
            is_file,
            path,
            last_modified: Lazy::undefined(),
            file_size: Lazy::undefined(),
            mime_type: Lazy::undefined(),
            extra_metadata: Lazy::undefined(),
            uuid: None,
        }
    }

    pub fn with_last_modified(mut self, timestamp: Option<i64>) -> Self {
        self.last_modified = Lazy::resolved(timestamp);
        self
    }

    pub fn with_last_modified_fn(
        mut self,
        f: impl FnOnce() -> Option<i64> + Send + 'static,
    ) -> Self {
        self.last_modified = Lazy::deferred(f);
        self
    }

    pub fn with_file_size(mut self, size: Option<u64>) -> Self {
        self.file_size = Lazy::resolved(size);
        self
    }

    pub fn with_file_size_fn(mut self, f: impl FnOnce() -> Option<u64> + Send + 'static) -> Self {
        self.file_size = Lazy::deferred(f);
        self
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = Lazy::resolved(mime_type);
        self
    }

    pub fn with_mime_type_fn(
        mut self,
        f: impl FnOnce() -> Option<String> + Send + 'static,
    ) -> Self {
        self.mime_type = Lazy::deferred(f);
        self
    }

    pub fn with_extra_metadata(mut self, metadata: ExtraMetadata) -> Self {
        self.extra_metadata = Lazy::resolved(metadata);
        self
    }

    pub fn with_extra_metadata_fn(
        mut self,
        f: impl FnOnce() -> ExtraMetadata + Send + 'static,
    ) -> Self {
        self.extra_metadata = Lazy::deferred(f);
        self
    }

    pub fn with_uuid(mut self, uuid: Option<Uuid>) -> Self {
        self.uuid = uuid;
        self
    }

    /// Same item under another path (used when de-prefixing listings).
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Fill every field of `self` that is still undefined from `other`.
    ///
    /// Fields that already hold a value or a deferred computation are kept.
    pub fn with_metadata_if_not_defined(mut self, other: FilesystemItem) -> Self {
        if !self.last_modified.is_defined() {
            self.last_modified = other.last_modified;
        }
        if self.is_file {
            if !self.file_size.is_defined() {
                self.file_size = other.file_size;
            }
            if !self.mime_type.is_defined() {
                self.mime_type = other.mime_type;
            }
        }
        if !self.extra_metadata.is_defined() {
            self.extra_metadata = other.extra_metadata;
        }
        if self.uuid.is_none() {
            self.uuid = other.uuid;
        }
        self
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn is_directory(&self) -> bool {
        !self.is_file
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        crate::path::basename(&self.path)
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn last_modified(&self) -> Option<i64> {
        *self.last_modified.get()
    }

    pub fn file_size(&self) -> Result<Option<u64>, VfsError> {
        self.ensure_file("file size")?;
        Ok(*self.file_size.get())
    }

    pub fn mime_type(&self) -> Result<Option<&str>, VfsError> {
        self.ensure_file("mime type")?;
        Ok(self.mime_type.get().as_deref())
    }

    pub fn extra_metadata(&self) -> &ExtraMetadata {
        self.extra_metadata.get()
    }

    fn ensure_file(&self, attribute: &str) -> Result<(), VfsError> {
        if self.is_file {
            Ok(())
        } else {
            Err(VfsError::Logic(format!(
                "Cannot read the {} of directory '{}'",
                attribute, self.path
            )))
        }
    }
}

impl fmt::Debug for FilesystemItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesystemItem")
            .field("is_file", &self.is_file)
            .field("path", &self.path)
            .field("last_modified", &self.last_modified)
            .field("file_size", &self.file_size)
            .field("mime_type", &self.mime_type)
            .field("extra_metadata", &self.extra_metadata)
            .field("uuid", &self.uuid)
            .finish()
    }
}
