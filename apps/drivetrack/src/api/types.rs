//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API. Field names are
//! camelCase throughout.

use drivetrack_core::primitives::{MAX_MENTOR_PREFERENCES, MAX_NAME_LENGTH};
use drivetrack_core::{
    CheckpointConfig, Drive, DriveId, FailedAllotment, Group, GroupId, Member, MemberStatus,
    MentorId, MentorPreference, Stage, StageConfig, StageMachine, StudentId, Submission,
    SubmissionId, SubmissionRef, SubmissionStatus, Timestamp, TrackError,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// GENERIC ENVELOPES
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `{ success, message }`, the body of every error and of plain acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// `{ success: true, data }`, with an optional message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

// =============================================================================
// DRIVES
// =============================================================================

/// Body of `POST /drives`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDriveRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mentors: Vec<String>,
    #[serde(default)]
    pub participating_students: Vec<String>,
    pub max_groups_per_mentor: u32,
    #[serde(default)]
    pub max_group_size: Option<u32>,
    #[serde(default)]
    pub min_group_size: Option<u32>,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointConfig>,
}

impl CreateDriveRequest {
    /// Build the drive at its first stage. Record-level checks run in the core.
    pub fn to_drive(&self) -> Drive {
        let mut drive = Drive::new(DriveId::new(&self.id), &self.name, self.max_groups_per_mentor);
        drive.mentors = self.mentors.iter().map(MentorId::new).collect();
        drive.participating_students = self.participating_students.iter().map(StudentId::new).collect();
        if let Some(max) = self.max_group_size {
            drive.max_group_size = max;
        }
        if let Some(min) = self.min_group_size {
            drive.min_group_size = min;
        }
        drive.stages = StageConfig::standard(self.checkpoints.clone());
        StageMachine::realign(&mut drive);
        drive
    }
}

// =============================================================================
// GROUPS
// =============================================================================

/// Query of `GET /groups` and `GET /submissions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveQuery {
    pub drive: String,
}

/// Body of `POST /groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub id: String,
    pub drive_id: String,
    pub name: String,
    pub leader: String,
    /// Invited members; they start out pending.
    #[serde(default)]
    pub members: Vec<String>,
    /// Preferred mentors in rank order.
    #[serde(default)]
    pub mentor_preferences: Vec<String>,
}

impl CreateGroupRequest {
    pub fn to_group(&self, created_at: Timestamp) -> Result<Group, TrackError> {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(TrackError::InvalidRecord(format!(
                "group name must be 1..={} bytes",
                MAX_NAME_LENGTH
            )));
        }
        if self.mentor_preferences.len() > MAX_MENTOR_PREFERENCES {
            return Err(TrackError::InvalidRecord(format!(
                "You can select up to {} mentor preferences",
                MAX_MENTOR_PREFERENCES
            )));
        }
        let mut group = Group::new(
            GroupId::new(&self.id),
            DriveId::new(&self.drive_id),
            &self.name,
            StudentId::new(&self.leader),
            created_at,
        );
        group.members = self
            .members
            .iter()
            .map(|s| Member {
                student: StudentId::new(s),
                status: MemberStatus::Pending,
            })
            .collect();
        group.mentor_preferences = self
            .mentor_preferences
            .iter()
            .zip(1u8..)
            .map(|(m, rank)| MentorPreference::new(MentorId::new(m), rank))
            .collect();
        Ok(group)
    }
}

/// Body of `PUT /groups/{id}/preferences`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesRequest {
    pub mentor_preferences: Vec<String>,
}

/// Body of `PUT /groups/{id}/mentor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignMentorRequest {
    pub mentor_id: String,
}

/// Response of `POST /groups/auto-allot/{driveId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllotResponse {
    pub success: bool,
    pub message: String,
    pub allotted_count: usize,
    pub failed_groups: Vec<FailedAllotment>,
    pub failed_count: usize,
}

/// Response of `GET /groups/remaining/{driveId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingResponse {
    pub success: bool,
    pub count: usize,
    pub students: Vec<StudentId>,
}

/// Response of `POST /groups/auto-group/{driveId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoGroupResponse {
    pub success: bool,
    pub message: String,
    pub groups_created: usize,
    pub total_students_grouped: usize,
    pub groups: Vec<Group>,
}

// =============================================================================
// STAGES
// =============================================================================

/// Body of `POST /drives/{id}/progress-stage`. The body is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressRequest {
    #[serde(default)]
    pub force: bool,
}

/// A stage transition that went through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMovedResponse {
    pub success: bool,
    pub message: String,
    pub previous_stage: Stage,
    pub current_stage: Stage,
    pub stages: StageConfig,
}

/// A stage transition that was refused. Sent with HTTP 400.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBlockedResponse {
    pub success: bool,
    pub message: String,
    pub current_stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

// =============================================================================
// SUBMISSIONS
// =============================================================================

/// Body of `POST /submissions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub id: String,
    pub group_id: String,
    pub drive_id: String,
    pub target: SubmissionRef,
    pub title: String,
    #[serde(default)]
    pub status: SubmissionStatus,
}

impl SubmissionRequest {
    /// Anything past draft is stamped with `now`.
    pub fn to_submission(&self, now: Timestamp) -> Submission {
        Submission {
            id: SubmissionId::new(&self.id),
            group: GroupId::new(&self.group_id),
            drive: DriveId::new(&self.drive_id),
            target: self.target.clone(),
            title: self.title.clone(),
            status: self.status,
            submitted_at: (self.status != SubmissionStatus::Draft).then_some(now),
        }
    }
}
