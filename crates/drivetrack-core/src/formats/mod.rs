//! # Formats
//!
//! Snapshot documents used to seed, back up and move drive data.

mod snapshot;

pub use snapshot::{
    MAX_SNAPSHOT_PAYLOAD_SIZE, Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes,
};
