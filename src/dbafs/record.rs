//! Persisted DBAFS rows

use crate::error::VfsError;
use crate::item::{ExtraMetadata, FilesystemItem, ImportantPart, LocalizedMetadata};
use crate::types::{Hash, ItemType, Uuid};
use serde::{Deserialize, Serialize};

/// One tracked path as stored in the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    /// Id of the parent directory row; `None` directly below the tracked root.
    pub pid: Option<u64>,
    pub uuid: Uuid,
    pub path: String,
    pub hash: Hash,
    pub item_type: ItemType,
    pub last_modified: Option<i64>,
    pub important_part: Option<ImportantPart>,
    /// Serialized [`LocalizedMetadata`]
    pub meta: Vec<u8>,
    /// Unix timestamp of the last insert or update
    pub tstamp: i64,
}

impl Record {
    pub fn is_directory(&self) -> bool {
        self.item_type.is_directory()
    }

    /// Decode the extra metadata columns.
    pub fn extra_metadata(&self) -> Result<ExtraMetadata, VfsError> {
        Ok(ExtraMetadata {
            important_part: self.important_part,
            localized: LocalizedMetadata::from_blob(&self.meta)?,
            other: Default::default(),
        })
    }

    /// Build the item a caller sees for this row under `path`.
    ///
    /// Extra metadata is decoded on first access. A corrupt metadata blob
    /// reads as empty metadata.
    pub fn to_item(&self, path: impl Into<String>) -> FilesystemItem {
        let item = match self.item_type {
            ItemType::File => FilesystemItem::file(path),
            ItemType::Directory => FilesystemItem::directory(path),
        };
        let important_part = self.important_part;
        let meta = self.meta.clone();
        let item = item
            .with_uuid(Some(self.uuid))
            .with_extra_metadata_fn(move || ExtraMetadata {
                important_part,
                localized: LocalizedMetadata::from_blob(&meta).unwrap_or_default(),
                other: Default::default(),
            });
        match self.last_modified {
            Some(timestamp) => item.with_last_modified(Some(timestamp)),
            None => item,
        }
    }
}
