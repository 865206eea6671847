//! # Persistent Storage
//!
//! Disk-backed implementation of `DriveStore` on the redb embedded database.

mod redb_store;

pub use redb_store::RedbStore;
