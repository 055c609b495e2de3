//! CLI route: run context and the single command table.

use crate::adapter::LocalAdapter;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_change_set_json, format_change_set_text, format_item_text, format_listing_text,
};
use crate::config::{ConfigLoader, DbafsConfig};
use crate::dbafs::{Dbafs, SledRecordStore};
use crate::error::{AdapterError, VfsError};
use crate::mount::MountManager;
use crate::types::Uuid;
use crate::vfs::{AccessFlags, Filesystem, Location, VirtualFilesystem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runtime context for CLI execution: tracked root, record store and façade.
pub struct RunContext {
    dbafs: Arc<Dbafs>,
    vfs: VirtualFilesystem,
    store_path: PathBuf,
}

/// Drop the exclusion marker into the top-level directory holding the store,
/// so the store never tracks itself.
fn exclude_store(root: &Path, store_path: &Path, marker: &str) -> Result<(), VfsError> {
    let Ok(relative) = store_path.strip_prefix(root) else {
        return Ok(());
    };
    let Some(first) = relative.components().next() else {
        return Ok(());
    };
    let dir = root.join(first);
    let marker_path = dir.join(marker);
    if marker_path.exists() {
        return Ok(());
    }
    let marker_display = marker_path.to_string_lossy().to_string();
    std::fs::create_dir_all(&dir).map_err(|e| VfsError::wrap("create", &marker_display, AdapterError::io(&marker_display, e)))?;
    std::fs::write(&marker_path, b"")
        .map_err(|e| VfsError::wrap("write", &marker_display, AdapterError::io(&marker_display, e)))?;
    debug!(marker = %marker_display, "Excluded record store from tracking");
    Ok(())
}

impl RunContext {
    /// Build the run context for a tracked directory.
    pub fn new(
        root: PathBuf,
        config_path: Option<PathBuf>,
        store_override: Option<PathBuf>,
    ) -> Result<Self, VfsError> {
        let config: DbafsConfig = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&root)?,
        };

        let adapter = LocalAdapter::new(&root).map_err(|e| {
            VfsError::Configuration(format!("Cannot open root {}: {}", root.display(), e))
        })?;
        let root = adapter.root().to_path_buf();

        let store_path = match store_override {
            Some(path) if path.is_absolute() => path,
            Some(path) => root.join(path),
            None => config.storage.resolve(&root),
        };
        exclude_store(&root, &store_path, &config.sync.exclusion_marker)?;
        let store = Arc::new(SledRecordStore::open(&store_path)?);

        let mounts = Arc::new(MountManager::new(Arc::new(adapter)));
        let dbafs = Arc::new(Dbafs::new(store, mounts.clone(), "", config.sync.clone())?);
        let vfs = VirtualFilesystem::new(mounts, Some(dbafs.clone()), "", true)?;

        info!(root = %root.display(), store = %store_path.display(), "Run context ready");
        Ok(Self {
            dbafs,
            vfs,
            store_path,
        })
    }

    pub fn dbafs(&self) -> &Dbafs {
        &self.dbafs
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Execute one command and return its rendered output.
    pub fn execute(&self, command: &Commands) -> Result<String, VfsError> {
        let start = Instant::now();
        let output = match command {
            Commands::Diff { scope, format } => {
                let scope: Vec<&str> = scope.iter().map(String::as_str).collect();
                let change_set = self.dbafs.compute_change_set(&scope)?;
                match format.as_str() {
                    "json" => format_change_set_json(&change_set)?,
                    _ => format_change_set_text(&change_set, false),
                }
            }
            Commands::Sync { scope, format } => {
                let scope: Vec<&str> = scope.iter().map(String::as_str).collect();
                let change_set = self.dbafs.sync(&scope)?;
                match format.as_str() {
                    "json" => format_change_set_json(&change_set)?,
                    _ => format_change_set_text(&change_set, true),
                }
            }
            Commands::Ls {
                path,
                deep,
                bypass_records,
            } => {
                let flags = if *bypass_records {
                    AccessFlags::BYPASS_DBAFS
                } else {
                    AccessFlags::NONE
                };
                let items = self.vfs.list_contents(Location::Path(path), *deep, flags)?;
                format_listing_text(&items)
            }
            Commands::Resolve { uuid } => {
                let uuid = Uuid::parse_str(uuid)
                    .map_err(|e| VfsError::Logic(format!("Invalid uuid '{}': {}", uuid, e)))?;
                self.vfs.resolve(Location::Uuid(uuid))?
            }
            Commands::Stat { path, sync } => {
                if *sync {
                    self.dbafs.sync(&[path.as_str()])?;
                }
                let item = self
                    .vfs
                    .get(Location::Path(path), AccessFlags::NONE)?
                    .ok_or_else(|| VfsError::NotFound(path.clone()))?;
                format_item_text(&item)
            }
        };
        debug!(duration_ms = start.elapsed().as_millis(), "Command executed");
        Ok(output)
    }
}
