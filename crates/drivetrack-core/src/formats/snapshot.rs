//! # Snapshot Format
//!
//! A snapshot is every record of a store in one document.
//! It serializes with serde, so the app layer can write it as JSON for seed
//! files, or as the binary form below for backups.
//!
//! Binary format: Header (5 bytes) + postcard-serialized snapshot.
//! - 4 bytes: Magic ("DTRK")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is parsed. File I/O lives
//! in the app layer.

use crate::primitives::{self, MAX_SNAPSHOT_RECORDS};
use crate::{Drive, Group, Submission, Synopsis, TrackError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum accepted size of a binary snapshot.
pub const MAX_SNAPSHOT_PAYLOAD_SIZE: usize = 64 * 1024 * 1024; // 64 MB

const HEADER_LEN: usize = 5;

// =============================================================================
// SNAPSHOT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub drives: Vec<Drive>,
    pub groups: Vec<Group>,
    #[serde(default)]
    pub synopses: Vec<Synopsis>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

impl Snapshot {
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.drives
            .len()
            .saturating_add(self.groups.len())
            .saturating_add(self.synopses.len())
            .saturating_add(self.submissions.len())
    }

    /// Check the snapshot is self-consistent before it touches a store.
    ///
    /// Every record must be valid on its own, ids must be unique per kind, and
    /// every other record must reference drives and groups in the snapshot.
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.record_count() > MAX_SNAPSHOT_RECORDS {
            return Err(TrackError::InvalidRecord(format!(
                "snapshot holds {} records, maximum is {}",
                self.record_count(),
                MAX_SNAPSHOT_RECORDS
            )));
        }

        let mut drives = BTreeMap::new();
        for drive in &self.drives {
            drive.validate()?;
            if drives.insert(&drive.id, drive).is_some() {
                return Err(TrackError::InvalidRecord(format!(
                    "duplicate drive {}",
                    drive.id
                )));
            }
        }

        let mut group_ids = BTreeSet::new();
        for group in &self.groups {
            group.validate()?;
            if !drives.contains_key(&group.drive) {
                return Err(TrackError::DriveNotFound(group.drive.clone()));
            }
            if !group_ids.insert(&group.id) {
                return Err(TrackError::InvalidRecord(format!(
                    "duplicate group {}",
                    group.id
                )));
            }
        }

        for synopsis in &self.synopses {
            if !group_ids.contains(&synopsis.group) {
                return Err(TrackError::GroupNotFound(synopsis.group.clone()));
            }
        }

        for submission in &self.submissions {
            if !group_ids.contains(&submission.group) {
                return Err(TrackError::GroupNotFound(submission.group.clone()));
            }
            let drive = drives
                .get(&submission.drive)
                .ok_or_else(|| TrackError::DriveNotFound(submission.drive.clone()))?;
            submission.validate(drive)?;
        }
        Ok(())
    }
}

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header that precedes binary snapshot data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(TrackError::Serialization("Invalid magic bytes".to_string()));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(TrackError::Serialization(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrackError> {
        let Some(head) = bytes.get(..HEADER_LEN) else {
            return Err(TrackError::Serialization("Header too short".to_string()));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[0..4]);
        Ok(Self {
            magic,
            version: head[4],
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a snapshot to bytes (header + payload).
///
/// Refuses a snapshot that `snapshot_from_bytes` would reject for its record
/// count or size, so a written file can always be read back.
pub fn snapshot_to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>, TrackError> {
    if snapshot.record_count() > MAX_SNAPSHOT_RECORDS {
        return Err(TrackError::InvalidRecord(format!(
            "snapshot holds {} records, maximum is {}",
            snapshot.record_count(),
            MAX_SNAPSHOT_RECORDS
        )));
    }

    let payload =
        postcard::to_stdvec(snapshot).map_err(|e| TrackError::Serialization(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN.saturating_add(payload.len()));
    result.extend_from_slice(&SnapshotHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    if result.len() > MAX_SNAPSHOT_PAYLOAD_SIZE {
        return Err(TrackError::Serialization(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            result.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }
    Ok(result)
}

/// Deserialize and validate a snapshot from bytes.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<Snapshot, TrackError> {
    if bytes.len() > MAX_SNAPSHOT_PAYLOAD_SIZE {
        return Err(TrackError::Serialization(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_LEN..).unwrap_or_default();
    let snapshot: Snapshot = postcard::from_bytes(payload).map_err(|e| {
        TrackError::Serialization(format!("Failed to deserialize snapshot: {}", e))
    })?;
    snapshot.validate()?;
    Ok(snapshot)
}

// =============================================================================
// TESTS
// =============================================================================
