//! # drivetrack-core
//!
//! The deterministic workflow engine for drivetrack - THE LOGIC.
//!
//! Academic project drives move groups of students through a fixed pipeline:
//! group formation, mentor allotment, synopsis, checkpoints, result. This
//! crate implements the two pieces of that pipeline with real rules:
//! - the mentor allotment engine (ranked preferences, per-mentor capacity,
//!   first-come-first-served by group creation time, fallback in drive order)
//! - the stage progression state machine (readiness gates, forced progress,
//!   one-step regress with its own reset table)
//!
//! plus the stores and workflows that read and persist their inputs.
//!
//! ## Architectural Constraints
//!
//! - Pure and synchronous: NO async, NO network dependencies
//! - Deterministic: `BTreeMap`/`BTreeSet` only, integer arithmetic only
//! - Collaborators are passed in explicitly; there is no global state
//! - Time is an input (`Timestamp`), never read from the clock

// =============================================================================
// MODULES
// =============================================================================

pub mod allotment;
pub mod formats;
pub mod grouping;
pub mod primitives;
pub mod storage;
pub mod store;
pub mod system;
pub mod tracker;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CheckpointConfig, Drive, DriveId, Group, GroupId, GroupStatus, Member, MemberStatus,
    MentorAssignment, MentorId, MentorPreference, StageConfig, StageEntry, StageStatus, StudentId,
    Submission, SubmissionId, SubmissionRef, SubmissionStatus, Synopsis, SynopsisId,
    SynopsisStatus, Timestamp, TrackError, UserId,
};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use allotment::{
    AllotmentEngine, AllotmentPlan, AssignmentSource, FailedAllotment, MentorCapacityLedger,
    PlannedAssignment,
};
pub use system::{
    CheckpointPatch, Readiness, ReadinessMetrics, Stage, StageMachine, StagePatch, StageReport,
    Transition,
};

// =============================================================================
// RE-EXPORTS: Stores and Workflows
// =============================================================================

pub use storage::RedbStore;
pub use store::{DriveStore, MemoryStore};
pub use tracker::{
    AllotmentReport, AutoGroupReport, DriveProgress, DriveStats, ImportSummary, StageChange,
    StorageBackend, Tracker,
};

// =============================================================================
// RE-EXPORTS: Formats
// =============================================================================

pub use formats::{Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes};
