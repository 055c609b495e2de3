//! Storage adapters
//!
//! A storage adapter exposes primitive file operations against one physical
//! backend. Paths handed to an adapter are relative to its own root (the
//! empty string is the root). Adapters only ever return [`AdapterError`];
//! the mount manager translates those into [`crate::error::VfsError`].

pub mod local;
pub mod memory;

pub use local::LocalAdapter;
pub use memory::InMemoryAdapter;

use crate::error::AdapterError;
use crate::item::FilesystemItem;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// Backend-specific options for mutating calls (visibility, cache headers, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions(BTreeMap<String, String>);

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Capability interface of one physical backend
pub trait StorageAdapter: Send + Sync {
    fn file_exists(&self, path: &str) -> Result<bool, AdapterError>;

    fn directory_exists(&self, path: &str) -> Result<bool, AdapterError>;

    fn read(&self, path: &str) -> Result<Vec<u8>, AdapterError>;

    fn read_stream(&self, path: &str) -> Result<Box<dyn Read + Send>, AdapterError> {
        Ok(Box::new(Cursor::new(self.read(path)?)))
    }

    fn write(&self, path: &str, contents: &[u8], options: &WriteOptions)
        -> Result<(), AdapterError>;

    fn write_stream(
        &self,
        path: &str,
        contents: &mut dyn Read,
        options: &WriteOptions,
    ) -> Result<(), AdapterError> {
        let mut buf = Vec::new();
        contents
            .read_to_end(&mut buf)
            .map_err(|e| AdapterError::io(path, e))?;
        self.write(path, &buf, options)
    }

    fn delete(&self, path: &str) -> Result<(), AdapterError>;

    fn delete_directory(&self, path: &str) -> Result<(), AdapterError>;

    fn create_directory(&self, path: &str, options: &WriteOptions) -> Result<(), AdapterError>;

    fn copy(&self, source: &str, destination: &str, options: &WriteOptions)
        -> Result<(), AdapterError>;

    /// Move a file or directory within this adapter.
    fn rename(&self, source: &str, destination: &str, options: &WriteOptions)
        -> Result<(), AdapterError>;

    fn last_modified(&self, path: &str) -> Result<Option<i64>, AdapterError>;

    fn file_size(&self, path: &str) -> Result<u64, AdapterError>;

    fn mime_type(&self, path: &str) -> Result<Option<String>, AdapterError>;

    /// List the entries below `path`; immediate children only unless `deep`.
    ///
    /// Returned paths are relative to the adapter root. A missing directory
    /// lists as empty.
    fn list_contents(&self, path: &str, deep: bool) -> Result<Vec<FilesystemItem>, AdapterError>;
}

/// Guess a mime type from a file extension.
pub fn guess_mime_type(path: &str) -> Option<String> {
    let name = crate::path::basename(path);
    let (_, extension) = name.rsplit_once('.')?;
    let mime = match extension.to_ascii_lowercase().as_str() {
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    };
    Some(mime.to_string())
}
