//! # Fixed Limits
//!
//! Constants compiled into the binary. They bound every record and every
//! batch so that all workflows finish in time proportional to their input.

/// Maximum number of ranked mentor preferences per group.
pub const MAX_MENTOR_PREFERENCES: usize = 3;

/// Maximum length for drive and group names.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum number of groups considered by a single allotment run.
///
/// Larger candidate sets are rejected instead of truncated so that no group
/// silently misses its turn.
pub const MAX_ALLOTMENT_BATCH: usize = 10_000;

/// Maximum number of records in one imported snapshot.
pub const MAX_SNAPSHOT_RECORDS: usize = 100_000;

/// Prefix of groups created by auto-grouping.
pub const AUTO_GROUP_PREFIX: &str = "Auto-Group";

/// Magic bytes for the binary snapshot header.
pub const MAGIC_BYTES: &[u8; 4] = b"DTRK";

/// Current binary snapshot format version.
///
/// Increment this when making breaking changes to the snapshot layout.
pub const FORMAT_VERSION: u8 = 1;
