//! Record store seam of the DBAFS engine

use crate::change_set::ChangeSet;
use crate::dbafs::record::Record;
use crate::error::VfsError;
use crate::item::ExtraMetadata;
use crate::types::Uuid;

/// Parameters of one change-set application
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions<'a> {
    /// Creates are inserted in chunks of this many rows.
    pub batch_size: usize,
    /// Modification timestamp written to every touched row.
    pub now: i64,
    /// Path below which rows have no parent row (their `pid` is `None`).
    pub root: &'a str,
}

/// Persisted mirror of a storage tree
///
/// Paths handed to and returned from a store are store paths, i.e. they
/// already carry any database path prefix.
pub trait RecordStore: Send + Sync {
    fn get_by_id(&self, id: u64) -> Result<Option<Record>, VfsError>;

    fn get_by_uuid(&self, uuid: &Uuid) -> Result<Option<Record>, VfsError>;

    fn get_by_path(&self, path: &str) -> Result<Option<Record>, VfsError>;

    /// Rows strictly below `prefix` ordered by path
    ///
    /// With `deep == false` only the direct children of `prefix` are returned.
    /// The empty prefix lists from the root.
    fn list_prefix(&self, prefix: &str, deep: bool) -> Result<Vec<Record>, VfsError>;

    /// Every row ordered by path.
    fn list_all(&self) -> Result<Vec<Record>, VfsError> {
        self.list_prefix("", true)
    }

    /// Apply a change set atomically
    ///
    /// Deletes run first, then updates are resolved, then creates are inserted
    /// in order so each parent row exists before its children. Any failure
    /// leaves the store untouched.
    fn apply(&self, change_set: &ChangeSet, options: &ApplyOptions<'_>) -> Result<(), VfsError>;

    /// Persist the important part and localized metadata of the row at `path`.
    fn set_extra_metadata(
        &self,
        path: &str,
        metadata: &ExtraMetadata,
        now: i64,
    ) -> Result<(), VfsError>;
}
