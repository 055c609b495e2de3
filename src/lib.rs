//! dbafs: Database-Backed Abstract Filesystem
//!
//! A virtual filesystem that routes logical paths to storage adapters through
//! a mount table, plus a synchronization engine that keeps a persisted record
//! of a tracked tree (stable ids and uuids, content hashes, metadata) in step
//! with live storage through atomic change sets.

pub mod adapter;
pub mod change_set;
pub mod cli;
pub mod config;
pub mod dbafs;
pub mod error;
pub mod hasher;
pub mod item;
pub mod logging;
pub mod mount;
pub mod path;
pub mod types;
pub mod vfs;
pub mod views;

pub use change_set::{ChangeSet, CreateItem, UpdateDelta};
pub use dbafs::{Dbafs, RecordStore, SledRecordStore};
pub use error::{AdapterError, VfsError};
pub use item::{ExtraMetadata, FilesystemItem};
pub use mount::MountManager;
pub use types::{Hash, ItemType, Uuid};
pub use vfs::{AccessFlags, Filesystem, Location, VirtualFilesystem};
