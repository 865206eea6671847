//! # Core Type Definitions
//!
//! This module contains the records the workflows operate on:
//! - Identifiers (`DriveId`, `GroupId`, `MentorId`, `StudentId`, `UserId`, `SynopsisId`)
//! - `Timestamp` (milliseconds since the Unix epoch)
//! - `Drive` with its per-stage status configuration
//! - `Group` with members, ranked mentor preferences and the optional assignment
//! - `Synopsis` (status only, used for readiness)
//! - `Submission` with its tagged `SubmissionRef` target
//! - Error types (`TrackError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`.
//! Timestamps are integers; no floating point is used anywhere.

use crate::primitives::{MAX_MENTOR_PREFERENCES, MAX_NAME_LENGTH};
use crate::system::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a drive (one administrative project cycle).
    DriveId
);
string_id!(
    /// Identifier of a student group.
    GroupId
);
string_id!(
    /// Identifier of a mentor.
    MentorId
);
string_id!(
    /// Identifier of a student.
    StudentId
);
string_id!(
    /// Identifier of the acting user (the admin recorded as assigner).
    UserId
);
string_id!(
    /// Identifier of a synopsis record.
    SynopsisId
);
string_id!(
    /// Identifier of a submission record.
    SubmissionId
);

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn millis(self) -> i64 {
        self.0
    }
}

// =============================================================================
// STAGE STATUS CONFIGURATION
// =============================================================================

/// Status annotation of one stage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    Active,
    Completed,
}

impl StageStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not-started",
            StageStatus::Active => "active",
            StageStatus::Completed => "completed",
        }
    }
}

/// A single (non-list) stage entry of a drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEntry {
    pub enabled: bool,
    pub deadline: Option<Timestamp>,
    pub status: StageStatus,
}

impl StageEntry {
    #[must_use]
    pub fn with_status(status: StageStatus) -> Self {
        Self {
            enabled: true,
            deadline: None,
            status,
        }
    }
}

/// One checkpoint sub-stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointConfig {
    pub name: String,
    pub deadline: Option<Timestamp>,
    pub max_marks: u32,
    #[serde(default)]
    pub status: StageStatus,
}

impl CheckpointConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, max_marks: u32) -> Self {
        Self {
            name: name.into(),
            deadline: None,
            max_marks,
            status: StageStatus::NotStarted,
        }
    }
}

/// Per-stage status annotations of a drive.
///
/// Single-stage entries are optional; a transition never creates a missing
/// entry, it only patches the ones that exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub group_formation: Option<StageEntry>,
    pub mentor_allotment: Option<StageEntry>,
    pub synopsis_submission: Option<StageEntry>,
    pub checkpoints: Vec<CheckpointConfig>,
    pub result: Option<StageEntry>,
}

impl StageConfig {
    /// Every entry present, group formation active, the rest not started.
    #[must_use]
    pub fn standard(checkpoints: Vec<CheckpointConfig>) -> Self {
        Self {
            group_formation: Some(StageEntry::with_status(StageStatus::Active)),
            mentor_allotment: Some(StageEntry::with_status(StageStatus::NotStarted)),
            synopsis_submission: Some(StageEntry::with_status(StageStatus::NotStarted)),
            checkpoints,
            result: Some(StageEntry::with_status(StageStatus::NotStarted)),
        }
    }

    /// Mutable access to the single entry backing `stage`.
    ///
    /// `Checkpoints` and `Completed` have no single entry and return `None`.
    pub fn entry_mut(&mut self, stage: Stage) -> Option<&mut StageEntry> {
        match stage {
            Stage::GroupFormation => self.group_formation.as_mut(),
            Stage::MentorAllotment => self.mentor_allotment.as_mut(),
            Stage::Synopsis => self.synopsis_submission.as_mut(),
            Stage::Result => self.result.as_mut(),
            Stage::Checkpoints | Stage::Completed => None,
        }
    }

    /// Status of the single entry backing `stage`, if present.
    #[must_use]
    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        let entry = match stage {
            Stage::GroupFormation => self.group_formation.as_ref(),
            Stage::MentorAllotment => self.mentor_allotment.as_ref(),
            Stage::Synopsis => self.synopsis_submission.as_ref(),
            Stage::Result => self.result.as_ref(),
            Stage::Checkpoints | Stage::Completed => None,
        };
        entry.map(|e| e.status)
    }
}

// =============================================================================
// DRIVE
// =============================================================================

/// An administrative project cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    pub id: DriveId,
    pub name: String,
    /// Mentor order is significant: it is the fallback order of allotment.
    #[serde(default)]
    pub mentors: Vec<MentorId>,
    #[serde(default)]
    pub participating_students: Vec<StudentId>,
    pub max_group_size: u32,
    pub min_group_size: u32,
    pub max_groups_per_mentor: u32,
    pub current_stage: Stage,
    pub stages: StageConfig,
}

impl Drive {
    /// Create a drive at `group-formation` with a standard stage configuration.
    #[must_use]
    pub fn new(id: DriveId, name: impl Into<String>, max_groups_per_mentor: u32) -> Self {
        Self {
            id,
            name: name.into(),
            mentors: Vec::new(),
            participating_students: Vec::new(),
            max_group_size: 4,
            min_group_size: 1,
            max_groups_per_mentor,
            current_stage: Stage::GroupFormation,
            stages: StageConfig::standard(Vec::new()),
        }
    }

    #[must_use]
    pub fn has_mentor(&self, mentor: &MentorId) -> bool {
        self.mentors.contains(mentor)
    }

    /// Check the record-level constraints of a drive.
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.id.as_str().is_empty() {
            return Err(TrackError::InvalidRecord("drive id is empty".to_string()));
        }
        if self.name.is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(TrackError::InvalidRecord(format!(
                "drive name must be 1..={} bytes",
                MAX_NAME_LENGTH
            )));
        }
        if self.max_groups_per_mentor == 0 {
            return Err(TrackError::InvalidRecord(
                "maxGroupsPerMentor must be positive".to_string(),
            ));
        }
        if self.max_group_size == 0 || self.min_group_size > self.max_group_size {
            return Err(TrackError::InvalidRecord(format!(
                "invalid group size bounds {}..={}",
                self.min_group_size, self.max_group_size
            )));
        }
        let unique: BTreeSet<&MentorId> = self.mentors.iter().collect();
        if unique.len() != self.mentors.len() {
            return Err(TrackError::InvalidRecord(
                "duplicate mentor in drive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// GROUP
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MemberStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub student: StudentId,
    pub status: MemberStatus,
}

impl Member {
    #[must_use]
    pub fn accepted(student: StudentId) -> Self {
        Self {
            student,
            status: MemberStatus::Accepted,
        }
    }
}

/// One ranked mentor preference. Rank 1 is the most preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorPreference {
    pub mentor: MentorId,
    pub rank: u8,
}

impl MentorPreference {
    #[must_use]
    pub fn new(mentor: MentorId, rank: u8) -> Self {
        Self { mentor, rank }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GroupStatus {
    #[default]
    Forming,
    Formed,
    MentorAssigned,
    Active,
    Completed,
    Disbanded,
}

/// The mentor assignment of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorAssignment {
    pub mentor: MentorId,
    pub assigned_at: Timestamp,
    pub assigned_by: UserId,
}

/// A student team within a drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub drive: DriveId,
    pub name: String,
    /// Sole ordering key of allotment. No secondary key exists.
    pub created_at: Timestamp,
    pub leader: StudentId,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub mentor_preferences: Vec<MentorPreference>,
    #[serde(default)]
    pub assignment: Option<MentorAssignment>,
    #[serde(default)]
    pub status: GroupStatus,
}

impl Group {
    /// Create a formed group with no members, preferences or mentor.
    #[must_use]
    pub fn new(
        id: GroupId,
        drive: DriveId,
        name: impl Into<String>,
        leader: StudentId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            drive,
            name: name.into(),
            created_at,
            leader,
            members: Vec::new(),
            mentor_preferences: Vec::new(),
            assignment: None,
            status: GroupStatus::Formed,
        }
    }

    #[must_use]
    pub fn assigned_mentor(&self) -> Option<&MentorId> {
        self.assignment.as_ref().map(|a| &a.mentor)
    }

    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.assignment.is_some()
    }

    /// Preferences in ascending rank order.
    #[must_use]
    pub fn ranked_preferences(&self) -> Vec<MentorPreference> {
        let mut prefs = self.mentor_preferences.clone();
        prefs.sort_by_key(|p| p.rank);
        prefs
    }

    /// Leader followed by every member that has not been rejected.
    pub fn students(&self) -> impl Iterator<Item = &StudentId> {
        std::iter::once(&self.leader).chain(
            self.members
                .iter()
                .filter(|m| m.status != MemberStatus::Rejected)
                .map(|m| &m.student),
        )
    }

    /// Record a mentor assignment and move the group to `mentor-assigned`.
    pub fn assign(&mut self, assignment: MentorAssignment) {
        self.assignment = Some(assignment);
        self.status = GroupStatus::MentorAssigned;
    }

    /// Drop the mentor assignment and move the group back to `formed`.
    pub fn clear_assignment(&mut self) -> Option<MentorAssignment> {
        self.status = GroupStatus::Formed;
        self.assignment.take()
    }

    /// Check the record-level constraints of a group.
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.id.as_str().is_empty() {
            return Err(TrackError::InvalidRecord("group id is empty".to_string()));
        }
        if self.name.is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(TrackError::InvalidRecord(format!(
                "group name must be 1..={} bytes",
                MAX_NAME_LENGTH
            )));
        }
        if self.mentor_preferences.len() > MAX_MENTOR_PREFERENCES {
            return Err(TrackError::InvalidRecord(format!(
                "at most {} mentor preferences allowed",
                MAX_MENTOR_PREFERENCES
            )));
        }
        let mut ranks = BTreeSet::new();
        let mut mentors = BTreeSet::new();
        for pref in &self.mentor_preferences {
            if pref.rank == 0 || !ranks.insert(pref.rank) {
                return Err(TrackError::InvalidRecord(format!(
                    "invalid or duplicate preference rank {}",
                    pref.rank
                )));
            }
            if !mentors.insert(&pref.mentor) {
                return Err(TrackError::InvalidRecord(format!(
                    "mentor {} preferred twice",
                    pref.mentor
                )));
            }
        }
        if self.members.iter().any(|m| m.student == self.leader) {
            return Err(TrackError::InvalidRecord(
                "leader cannot also be a member".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// SYNOPSIS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SynopsisStatus {
    #[default]
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    RevisionRequired,
}

impl SynopsisStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SynopsisStatus::Submitted => "submitted",
            SynopsisStatus::UnderReview => "under-review",
            SynopsisStatus::Approved => "approved",
            SynopsisStatus::Rejected => "rejected",
            SynopsisStatus::RevisionRequired => "revision-required",
        }
    }

    /// Whether a review may still change this status.
    #[must_use]
    pub fn is_reviewable(self) -> bool {
        matches!(self, SynopsisStatus::Submitted | SynopsisStatus::UnderReview)
    }
}

/// The review state of a group's synopsis. A group holds at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synopsis {
    pub id: SynopsisId,
    pub group: GroupId,
    pub drive: DriveId,
    pub status: SynopsisStatus,
    pub submitted_at: Timestamp,
}

// =============================================================================
// SUBMISSIONS
// =============================================================================

/// What a submission belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionRef {
    /// A checkpoint of the drive, by position in its checkpoint list.
    Checkpoint(u32),
    /// A free-standing deliverable such as a logbook or report, by kind.
    Generic(String),
}

impl std::fmt::Display for SubmissionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionRef::Checkpoint(index) => write!(f, "checkpoint #{}", index),
            SubmissionRef::Generic(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    RevisionRequired,
}

/// One deliverable of a group. A group holds at most one per target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub group: GroupId,
    pub drive: DriveId,
    pub target: SubmissionRef,
    pub title: String,
    #[serde(default)]
    pub status: SubmissionStatus,
    pub submitted_at: Option<Timestamp>,
}

impl Submission {
    /// Check the target against the drive it is submitted to.
    pub fn validate(&self, drive: &Drive) -> Result<(), TrackError> {
        if self.id.as_str().is_empty() {
            return Err(TrackError::InvalidRecord("submission id is empty".to_string()));
        }
        if self.title.len() > MAX_NAME_LENGTH {
            return Err(TrackError::InvalidRecord(format!(
                "submission title exceeds {} bytes",
                MAX_NAME_LENGTH
            )));
        }
        match &self.target {
            SubmissionRef::Checkpoint(index) => {
                if *index as usize >= drive.stages.checkpoints.len() {
                    return Err(TrackError::InvalidRecord(format!(
                        "drive {} has no checkpoint #{}",
                        drive.id, index
                    )));
                }
            }
            SubmissionRef::Generic(kind) => {
                if kind.is_empty() {
                    return Err(TrackError::InvalidRecord(
                        "submission kind is empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in drivetrack.
///
/// A blocked stage transition is not an error (see `system::Transition`),
/// and a partially successful allotment reports failures as data.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Drive not found: {0}")]
    DriveNotFound(DriveId),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Mentor not found: {0}")]
    MentorNotFound(MentorId),

    /// The mentor already supervises `max` groups in this drive.
    #[error("Mentor {mentor} has reached maximum group limit ({max})")]
    CapacityExceeded { mentor: MentorId, max: u32 },

    #[error("No mentor assigned to group {0}")]
    NotAssigned(GroupId),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The stored state changed between read and write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn group_with_prefs(prefs: Vec<MentorPreference>) -> Group {
        let mut group = Group::new(
            GroupId::new("g1"),
            DriveId::new("d1"),
            "Team Alpha",
            StudentId::new("s1"),
            Timestamp(0),
        );
        group.mentor_preferences = prefs;
        group
    }

    #[test]
    fn ranked_preferences_sorted_by_rank() {
        let group = group_with_prefs(vec![
            MentorPreference::new(MentorId::new("m3"), 3),
            MentorPreference::new(MentorId::new("m1"), 1),
            MentorPreference::new(MentorId::new("m2"), 2),
        ]);
        let mentors: Vec<_> = group
            .ranked_preferences()
            .into_iter()
            .map(|p| p.mentor.0)
            .collect();
        assert_eq!(mentors, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn duplicate_rank_rejected() {
        let group = group_with_prefs(vec![
            MentorPreference::new(MentorId::new("m1"), 1),
            MentorPreference::new(MentorId::new("m2"), 1),
        ]);
        assert!(matches!(group.validate(), Err(TrackError::InvalidRecord(_))));
    }

    #[test]
    fn too_many_preferences_rejected() {
        let group = group_with_prefs(
            (1..=4)
                .map(|r| MentorPreference::new(MentorId::new(format!("m{r}")), r))
                .collect(),
        );
        assert!(group.validate().is_err());
    }

    #[test]
    fn students_skip_rejected_members() {
        let mut group = group_with_prefs(Vec::new());
        group.members = vec![
            Member::accepted(StudentId::new("s2")),
            Member {
                student: StudentId::new("s3"),
                status: MemberStatus::Rejected,
            },
            Member {
                student: StudentId::new("s4"),
                status: MemberStatus::Pending,
            },
        ];
        let students: Vec<_> = group.students().map(|s| s.as_str()).collect();
        assert_eq!(students, vec!["s1", "s2", "s4"]);
    }

    #[test]
    fn assign_and_clear_update_status() {
        let mut group = group_with_prefs(Vec::new());
        group.assign(MentorAssignment {
            mentor: MentorId::new("m1"),
            assigned_at: Timestamp(5),
            assigned_by: UserId::new("admin"),
        });
        assert_eq!(group.status, GroupStatus::MentorAssigned);
        assert_eq!(group.assigned_mentor(), Some(&MentorId::new("m1")));

        let previous = group.clear_assignment();
        assert!(previous.is_some());
        assert_eq!(group.status, GroupStatus::Formed);
        assert!(!group.is_assigned());
    }

    #[test]
    fn drive_rejects_zero_capacity_and_duplicate_mentors() {
        let mut drive = Drive::new(DriveId::new("d1"), "Mini Project", 0);
        assert!(drive.validate().is_err());

        drive.max_groups_per_mentor = 2;
        drive.mentors = vec![MentorId::new("m1"), MentorId::new("m1")];
        assert!(drive.validate().is_err());

        drive.mentors = vec![MentorId::new("m1"), MentorId::new("m2")];
        assert!(drive.validate().is_ok());
    }

    #[test]
    fn stage_config_entries() {
        let mut config = StageConfig::standard(vec![CheckpointConfig::new("Mid", 50)]);
        assert_eq!(
            config.status_of(Stage::GroupFormation),
            Some(StageStatus::Active)
        );
        assert!(config.entry_mut(Stage::Checkpoints).is_none());
        assert!(config.entry_mut(Stage::Completed).is_none());

        config.result = None;
        assert_eq!(config.status_of(Stage::Result), None);
    }

    #[test]
    fn submission_target_must_exist() {
        let mut drive = Drive::new(DriveId::new("d1"), "Major Project", 2);
        drive.stages.checkpoints = vec![CheckpointConfig::new("Mid", 50)];

        let mut submission = Submission {
            id: SubmissionId::new("sub1"),
            group: GroupId::new("g1"),
            drive: DriveId::new("d1"),
            target: SubmissionRef::Checkpoint(0),
            title: "Mid review deck".to_string(),
            status: SubmissionStatus::Submitted,
            submitted_at: Some(Timestamp(3)),
        };
        assert!(submission.validate(&drive).is_ok());

        submission.target = SubmissionRef::Checkpoint(1);
        assert!(matches!(
            submission.validate(&drive),
            Err(TrackError::InvalidRecord(_))
        ));

        submission.target = SubmissionRef::Generic("logbook".to_string());
        assert!(submission.validate(&drive).is_ok());
    }
}
