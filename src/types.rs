//! Core types shared by the mount manager, the DBAFS engine and the façade.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use uuid::Uuid;

/// Hash: BLAKE3 digest of a file's bytes or of a directory's children
pub type Hash = [u8; 32];

/// Kind of a tracked node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemType {
    File,
    Directory,
}

impl ItemType {
    pub fn is_file(self) -> bool {
        matches!(self, ItemType::File)
    }

    pub fn is_directory(self) -> bool {
        matches!(self, ItemType::Directory)
    }

    /// Value of the persisted `type` column.
    pub fn record_type(self) -> &'static str {
        match self {
            ItemType::File => "file",
            ItemType::Directory => "folder",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::File => f.write_str("file"),
            ItemType::Directory => f.write_str("directory"),
        }
    }
}
