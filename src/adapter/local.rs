//! Local disk storage adapter rooted at a directory

use crate::adapter::{guess_mime_type, StorageAdapter, WriteOptions};
use crate::error::AdapterError;
use crate::item::FilesystemItem;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

/// Storage adapter over a local directory
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    root: PathBuf,
}

fn map_io(path: &str, err: std::io::Error) -> AdapterError {
    if err.kind() == std::io::ErrorKind::NotFound {
        AdapterError::NotFound(path.to_string())
    } else {
        AdapterError::io(path, err)
    }
}

fn modified_secs(metadata: &fs::Metadata) -> Option<i64> {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

impl LocalAdapter {
    /// Create an adapter rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, AdapterError> {
        let root = root.as_ref();
        let display = root.to_string_lossy().to_string();
        fs::create_dir_all(root).map_err(|e| AdapterError::io(&display, e))?;
        let root = dunce::canonicalize(root).map_err(|e| AdapterError::io(&display, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path for a logical path
    ///
    /// Logical paths are NFC while names on disk may be stored decomposed, so
    /// a segment that does not exist verbatim is matched against the
    /// normalized names of its directory.
    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            return self.root.clone();
        }
        let direct = self.root.join(path);
        if direct.symlink_metadata().is_ok() {
            return direct;
        }

        let mut resolved = self.root.clone();
        for segment in path.split('/') {
            let candidate = resolved.join(segment);
            resolved = if candidate.symlink_metadata().is_ok() {
                candidate
            } else {
                find_entry(&resolved, segment).unwrap_or(candidate)
            };
        }
        resolved
    }

    fn ensure_parent(&self, path: &str) -> Result<(), AdapterError> {
        if let Some(parent) = self.full_path(path).parent() {
            fs::create_dir_all(parent).map_err(|e| map_io(path, e))?;
        }
        Ok(())
    }

    /// NFC logical path of an entry below the root; `None` for names that are not UTF-8.
    fn relative(&self, full: &Path) -> Option<String> {
        let rel = full.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            parts.push(component.as_os_str().to_str()?.nfc().collect::<String>());
        }
        Some(parts.join("/"))
    }
}

/// Entry of `dir` whose name equals `segment` once NFC-normalized
fn find_entry(dir: &Path, segment: &str) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .find(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.nfc().eq(segment.chars()))
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
}

impl StorageAdapter for LocalAdapter {
    fn file_exists(&self, path: &str) -> Result<bool, AdapterError> {
        Ok(self.full_path(path).is_file())
    }

    fn directory_exists(&self, path: &str) -> Result<bool, AdapterError> {
        Ok(self.full_path(path).is_dir())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, AdapterError> {
        fs::read(self.full_path(path)).map_err(|e| map_io(path, e))
    }

    fn read_stream(&self, path: &str) -> Result<Box<dyn Read + Send>, AdapterError> {
        let file = fs::File::open(self.full_path(path)).map_err(|e| map_io(path, e))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &str, contents: &[u8], _options: &WriteOptions) -> Result<(), AdapterError> {
        self.ensure_parent(path)?;
        fs::write(self.full_path(path), contents).map_err(|e| map_io(path, e))
    }

    fn write_stream(
        &self,
        path: &str,
        contents: &mut dyn Read,
        _options: &WriteOptions,
    ) -> Result<(), AdapterError> {
        self.ensure_parent(path)?;
        let mut file = fs::File::create(self.full_path(path)).map_err(|e| map_io(path, e))?;
        std::io::copy(contents, &mut file).map_err(|e| map_io(path, e))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), AdapterError> {
        fs::remove_file(self.full_path(path)).map_err(|e| map_io(path, e))
    }

    fn delete_directory(&self, path: &str) -> Result<(), AdapterError> {
        fs::remove_dir_all(self.full_path(path)).map_err(|e| map_io(path, e))
    }

    fn create_directory(&self, path: &str, _options: &WriteOptions) -> Result<(), AdapterError> {
        fs::create_dir_all(self.full_path(path)).map_err(|e| map_io(path, e))
    }

    fn copy(&self, source: &str, destination: &str, _options: &WriteOptions) -> Result<(), AdapterError> {
        self.ensure_parent(destination)?;
        fs::copy(self.full_path(source), self.full_path(destination))
            .map(|_| ())
            .map_err(|e| map_io(source, e))
    }

    fn rename(&self, source: &str, destination: &str, _options: &WriteOptions) -> Result<(), AdapterError> {
        self.ensure_parent(destination)?;
        fs::rename(self.full_path(source), self.full_path(destination))
            .map_err(|e| map_io(source, e))
    }

    fn last_modified(&self, path: &str) -> Result<Option<i64>, AdapterError> {
        let metadata = fs::metadata(self.full_path(path)).map_err(|e| map_io(path, e))?;
        Ok(modified_secs(&metadata))
    }

    fn file_size(&self, path: &str) -> Result<u64, AdapterError> {
        let metadata = fs::metadata(self.full_path(path)).map_err(|e| map_io(path, e))?;
        if !metadata.is_file() {
            return Err(AdapterError::NotFound(path.to_string()));
        }
        Ok(metadata.len())
    }

    fn mime_type(&self, path: &str) -> Result<Option<String>, AdapterError> {
        if !self.full_path(path).is_file() {
            return Err(AdapterError::NotFound(path.to_string()));
        }
        Ok(guess_mime_type(path))
    }

    fn list_contents(&self, path: &str, deep: bool) -> Result<Vec<FilesystemItem>, AdapterError> {
        let base = self.full_path(path);
        if !base.exists() {
            return Ok(Vec::new());
        }
        if !base.is_dir() {
            return Err(AdapterError::NotADirectory(path.to_string()));
        }

        let mut walker = WalkDir::new(&base)
            .min_depth(1)
            .max_depth(if deep { usize::MAX } else { 1 })
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        let mut items = Vec::new();
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| {
                AdapterError::io(
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to walk directory: {}", e),
                    ),
                )
            })?;
            let Some(rel) = self.relative(entry.path()) else {
                warn!(
                    path = %entry.path().display(),
                    "Skipping entry whose name is not valid UTF-8"
                );
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            };
            let metadata = entry.metadata().map_err(|e| {
                AdapterError::io(
                    &rel,
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to read metadata: {}", e),
                    ),
                )
            })?;

            if metadata.is_file() {
                let mime = guess_mime_type(&rel);
                items.push(
                    FilesystemItem::file(rel)
                        .with_last_modified(modified_secs(&metadata))
                        .with_file_size(Some(metadata.len()))
                        .with_mime_type(mime),
                );
            } else if metadata.is_dir() {
                items.push(
                    FilesystemItem::directory(rel).with_last_modified(modified_secs(&metadata)),
                );
            }
            // Symlinks are not followed
        }
        Ok(items)
    }
}
