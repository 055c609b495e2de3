//! Integration tests for the dbafs virtual filesystem and synchronization engine

mod local_storage;
mod sled_store;
mod sync_scenarios;
mod vfs_facade;
mod views;
