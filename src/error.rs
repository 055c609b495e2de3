//! Error types for the virtual filesystem and the DBAFS synchronization engine.

use thiserror::Error;

/// Errors raised by a storage adapter.
///
/// This is the backend vocabulary. It never escapes the mount manager: every
/// adapter call is wrapped into [`VfsError::VirtualFilesystem`] there.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Storage I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AdapterError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        AdapterError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            AdapterError::NotFound(_) => true,
            AdapterError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Virtual filesystem errors
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unable to {operation} '{path}': {source}")]
    VirtualFilesystem {
        /// Logical (unmapped) path the caller used.
        path: String,
        operation: &'static str,
        #[source]
        source: AdapterError,
    },

    #[error("Logic error: {0}")]
    Logic(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Record storage error: {0}")]
    Storage(String),
}

impl VfsError {
    pub(crate) fn wrap(operation: &'static str, path: &str, source: AdapterError) -> Self {
        VfsError::VirtualFilesystem {
            path: path.to_string(),
            operation,
            source,
        }
    }

    /// Path carried by a wrapped adapter failure.
    pub fn path(&self) -> Option<&str> {
        match self {
            VfsError::VirtualFilesystem { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<sled::Error> for VfsError {
    fn from(err: sled::Error) -> Self {
        VfsError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for VfsError {
    fn from(err: bincode::Error) -> Self {
        VfsError::Storage(format!("Failed to encode record: {}", err))
    }
}

impl From<config::ConfigError> for VfsError {
    fn from(err: config::ConfigError) -> Self {
        VfsError::Configuration(err.to_string())
    }
}
