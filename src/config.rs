//! Configuration System
//!
//! Layered configuration for the synchronization engine, the record store and
//! logging. Precedence (lowest to highest): built-in defaults, `dbafs.toml`
//! in the workspace root, `DBAFS_*` environment variables.

use crate::error::VfsError;
use crate::logging::LoggingConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace configuration file
pub const CONFIG_FILE_NAME: &str = "dbafs.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbafsConfig {
    /// Change-set computation and application settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Record store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Files larger than this (bytes) are not tracked; 0 disables the limit
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Number of rows inserted per batch when applying creates
    #[serde(default = "default_bulk_insert_size")]
    pub bulk_insert_size: usize,

    /// Marker file that excludes its directory (and everything below) from tracking
    #[serde(default = "default_exclusion_marker")]
    pub exclusion_marker: String,

    /// Track file modification times
    #[serde(default = "default_true")]
    pub use_last_modified: bool,

    /// Prefix transparently added to every persisted path
    #[serde(default)]
    pub database_path_prefix: String,
}

fn default_max_file_size() -> u64 {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

fn default_bulk_insert_size() -> usize {
    100
}

fn default_exclusion_marker() -> String {
    ".nosync".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            bulk_insert_size: default_bulk_insert_size(),
            exclusion_marker: default_exclusion_marker(),
            use_last_modified: default_true(),
            database_path_prefix: String::new(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), VfsError> {
        if self.bulk_insert_size == 0 {
            return Err(VfsError::Configuration(
                "bulk_insert_size must be at least 1".to_string(),
            ));
        }
        if self.exclusion_marker.is_empty() || self.exclusion_marker.contains('/') {
            return Err(VfsError::Configuration(format!(
                "Invalid exclusion marker '{}': must be a plain file name",
                self.exclusion_marker
            )));
        }
        Ok(())
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".dbafs/store")
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Path to the sled record store (relative to the workspace root)
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl StorageConfig {
    /// Resolve the store path against the workspace root.
    pub fn resolve(&self, workspace_root: &Path) -> PathBuf {
        if self.store_path.is_absolute() {
            self.store_path.clone()
        } else {
            workspace_root.join(&self.store_path)
        }
    }
}

impl DbafsConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), VfsError> {
        self.sync.validate()?;
        if self.storage.store_path.as_os_str().is_empty() {
            return Err(VfsError::Configuration(
                "Store path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("sync.max_file_size", default_max_file_size())?
        .set_default("sync.bulk_insert_size", default_bulk_insert_size() as u64)?
        .set_default("sync.exclusion_marker", default_exclusion_marker())?
        .set_default("sync.use_last_modified", true)?
        .set_default("storage.store_path", ".dbafs/store")
}

fn environment() -> Environment {
    Environment::with_prefix("DBAFS")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    pub fn load(workspace_root: &Path) -> Result<DbafsConfig, VfsError> {
        let mut builder = builder_with_defaults()?;

        let workspace_file = workspace_root.join(CONFIG_FILE_NAME);
        if workspace_file.exists() {
            builder = builder.add_source(File::from(workspace_file).required(false));
        }

        let config: DbafsConfig = builder
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<DbafsConfig, VfsError> {
        let config: DbafsConfig = builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
