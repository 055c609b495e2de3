//! Property-based tests for synchronization guarantees

mod sync_properties;
