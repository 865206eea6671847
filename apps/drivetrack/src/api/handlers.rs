//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Every failure is answered with `{ success: false, message }` and a status
//! derived from the `TrackError` variant (see [`status_for`]).

use super::{
    AppState,
    types::{
        AllotResponse, AssignMentorRequest, AutoGroupResponse, CreateDriveRequest,
        CreateGroupRequest, DataResponse, DriveQuery, HealthResponse, MessageResponse,
        PreferencesRequest, ProgressRequest, RemainingResponse, StageBlockedResponse,
        StageMovedResponse, SubmissionRequest,
    },
};
use crate::now;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use drivetrack_core::{
    Drive, DriveId, DriveProgress, DriveStats, Group, GroupId, MentorId, Snapshot, Stage,
    StageChange, Submission, Synopsis, TrackError, Transition, UserId,
};

/// Header naming the acting admin.
pub const USER_ID_HEADER: &str = "x-user-id";

const DEFAULT_ADMIN: &str = "admin";

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// HTTP status for a core error.
#[must_use]
pub fn status_for(error: &TrackError) -> StatusCode {
    match error {
        TrackError::DriveNotFound(_)
        | TrackError::GroupNotFound(_)
        | TrackError::MentorNotFound(_) => StatusCode::NOT_FOUND,
        TrackError::CapacityExceeded { .. }
        | TrackError::NotAssigned(_)
        | TrackError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        TrackError::Conflict(_) => StatusCode::CONFLICT,
        TrackError::Storage(_) | TrackError::Serialization(_) | TrackError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// A core error on its way out as a response.
#[derive(Debug)]
pub struct ApiError(pub TrackError);

impl From<TrackError> for ApiError {
    fn from(error: TrackError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (status, Json(MessageResponse::error(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// The admin recorded on assignments, from `X-User-Id`.
fn acting_admin(headers: &HeaderMap) -> UserId {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserId::new)
        .unwrap_or_else(|| UserId::new(DEFAULT_ADMIN))
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// DRIVE HANDLERS
// =============================================================================

pub async fn list_drives_handler(
    State(state): State<AppState>,
) -> ApiResult<DataResponse<Vec<Drive>>> {
    let tracker = state.tracker.read().await;
    Ok(Json(DataResponse::new(tracker.drives()?)))
}

pub async fn create_drive_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateDriveRequest>,
) -> Result<(StatusCode, Json<DataResponse<Drive>>), ApiError> {
    let mut tracker = state.tracker.write().await;
    let drive = tracker.create_drive(request.to_drive())?;
    tracing::info!(drive = %drive.id, mentors = drive.mentors.len(), "Drive created");
    Ok((StatusCode::CREATED, Json(DataResponse::new(drive))))
}

pub async fn get_drive_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DataResponse<Drive>> {
    let tracker = state.tracker.read().await;
    Ok(Json(DataResponse::new(tracker.drive(&DriveId::new(id))?)))
}

/// Headline counts of a drive.
pub async fn drive_stats_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DataResponse<DriveStats>> {
    let tracker = state.tracker.read().await;
    Ok(Json(DataResponse::new(tracker.drive_stats(&DriveId::new(id))?)))
}

/// Current stage, readiness and stage statuses of a drive.
pub async fn drive_progress_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DataResponse<DriveProgress>> {
    let tracker = state.tracker.read().await;
    Ok(Json(DataResponse::new(tracker.drive_progress(&DriveId::new(id))?)))
}

// =============================================================================
// STAGE HANDLERS
// =============================================================================

/// Advance a drive one stage.
///
/// The body is optional; `{ "force": true }` skips the readiness gate.
pub async fn progress_stage_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let request: ProgressRequest = if body.is_empty() {
        ProgressRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(MessageResponse::error(format!("Invalid request body: {}", e))),
                )
                    .into_response();
            }
        }
    };

    let mut tracker = state.tracker.write().await;
    match tracker.progress_stage(&DriveId::new(id), request.force) {
        Ok(change) => stage_response(change, request.force, true),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Move a drive one stage back.
pub async fn regress_stage_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let mut tracker = state.tracker.write().await;
    match tracker.regress_stage(&DriveId::new(id)) {
        Ok(change) => stage_response(change, false, false),
        Err(e) => ApiError(e).into_response(),
    }
}

fn stage_response(change: StageChange, forced: bool, forward: bool) -> Response {
    match change.transition {
        Transition::Moved {
            previous, current, ..
        } => {
            tracing::info!(
                drive = %change.drive.id,
                previous = previous.as_str(),
                current = current.as_str(),
                forced,
                "Drive stage changed"
            );
            let message = if forward {
                format!("Stage progressed from {} to {}", previous.name(), current.name())
            } else {
                format!("Stage regressed from {} to {}", previous.name(), current.name())
            };
            (
                StatusCode::OK,
                Json(StageMovedResponse {
                    success: true,
                    message,
                    previous_stage: previous,
                    current_stage: current,
                    stages: change.drive.stages,
                }),
            )
                .into_response()
        }
        Transition::Blocked { stage, reason } => {
            tracing::info!(drive = %change.drive.id, stage = stage.as_str(), %reason, "Stage change blocked");
            let action = (forward && stage != Stage::Completed)
                .then(|| "Use force:true to override".to_string());
            (
                StatusCode::BAD_REQUEST,
                Json(StageBlockedResponse {
                    success: false,
                    message: reason,
                    current_stage: stage,
                    action,
                }),
            )
                .into_response()
        }
    }
}

// =============================================================================
// GROUP HANDLERS
// =============================================================================

pub async fn list_groups_handler(
    State(state): State<AppState>,
    Query(query): Query<DriveQuery>,
) -> ApiResult<DataResponse<Vec<Group>>> {
    let tracker = state.tracker.read().await;
    Ok(Json(DataResponse::new(tracker.groups(&DriveId::new(query.drive))?)))
}

pub async fn create_group_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<DataResponse<Group>>), ApiError> {
    let group = request.to_group(now())?;
    let mut tracker = state.tracker.write().await;
    let group = tracker.create_group(group)?;
    tracing::info!(drive = %group.drive, group = %group.id, "Group created");
    Ok((StatusCode::CREATED, Json(DataResponse::new(group))))
}

pub async fn get_group_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DataResponse<Group>> {
    let tracker = state.tracker.read().await;
    Ok(Json(DataResponse::new(tracker.group(&GroupId::new(id))?)))
}

/// Replace a group's ranked mentor preferences.
pub async fn set_preferences_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PreferencesRequest>,
) -> ApiResult<DataResponse<Group>> {
    let selection: Vec<MentorId> = request
        .mentor_preferences
        .iter()
        .map(MentorId::new)
        .collect();
    let mut tracker = state.tracker.write().await;
    let group = tracker.set_preferences(&GroupId::new(id), &selection)?;
    Ok(Json(DataResponse::with_message(
        group,
        "Mentor preferences updated",
    )))
}

/// Manual mentor assignment. Capacity is checked inside the store write.
pub async fn assign_mentor_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<AssignMentorRequest>,
) -> ApiResult<DataResponse<Group>> {
    let admin = acting_admin(&headers);
    let mentor = MentorId::new(request.mentor_id);
    let mut tracker = state.tracker.write().await;
    let group = tracker.assign_mentor(&GroupId::new(id), &mentor, &admin, now())?;
    tracing::info!(group = %group.id, mentor = %mentor, admin = %admin, "Mentor assigned");
    Ok(Json(DataResponse::new(group)))
}

pub async fn unassign_mentor_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DataResponse<Group>> {
    let mut tracker = state.tracker.write().await;
    let group = tracker.unassign_mentor(&GroupId::new(id))?;
    tracing::info!(group = %group.id, "Mentor unassigned");
    Ok(Json(DataResponse::with_message(
        group,
        "Mentor unassigned successfully",
    )))
}

/// Bulk allotment over every unassigned group of a drive.
pub async fn auto_allot_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(drive_id): Path<String>,
) -> ApiResult<AllotResponse> {
    let admin = acting_admin(&headers);
    let drive = DriveId::new(drive_id);
    let mut tracker = state.tracker.write().await;
    let report = tracker.auto_allot(&drive, &admin, now())?;

    tracing::info!(
        drive = %drive,
        allotted = report.allotted_count(),
        failed = report.failed_count(),
        "Auto allotment finished"
    );
    for failed in &report.failed_groups {
        tracing::warn!(drive = %drive, group = %failed.group_id, "No mentor capacity for group");
    }

    Ok(Json(AllotResponse {
        success: true,
        message: report.message(),
        allotted_count: report.allotted_count(),
        failed_count: report.failed_count(),
        failed_groups: report.failed_groups,
    }))
}

pub async fn remaining_students_handler(
    State(state): State<AppState>,
    Path(drive_id): Path<String>,
) -> ApiResult<RemainingResponse> {
    let tracker = state.tracker.read().await;
    let students = tracker.remaining_students(&DriveId::new(drive_id))?;
    Ok(Json(RemainingResponse {
        success: true,
        count: students.len(),
        students,
    }))
}

/// Pack the remaining students of a drive into auto-groups.
pub async fn auto_group_handler(
    State(state): State<AppState>,
    Path(drive_id): Path<String>,
) -> ApiResult<AutoGroupResponse> {
    let drive = DriveId::new(drive_id);
    let mut tracker = state.tracker.write().await;
    let report = tracker.auto_group(&drive, now())?;

    let message = if report.created.is_empty() {
        "All students are already grouped".to_string()
    } else {
        tracing::info!(
            drive = %drive,
            groups = report.created.len(),
            students = report.students_grouped,
            "Auto groups created"
        );
        format!("{} auto-groups created for remaining students", report.created.len())
    };

    Ok(Json(AutoGroupResponse {
        success: true,
        message,
        groups_created: report.created.len(),
        total_students_grouped: report.students_grouped,
        groups: report.created,
    }))
}

// =============================================================================
// SYNOPSIS AND SUBMISSION HANDLERS
// =============================================================================

/// Record a synopsis review state.
pub async fn record_synopsis_handler(
    State(state): State<AppState>,
    Json(synopsis): Json<Synopsis>,
) -> ApiResult<DataResponse<Synopsis>> {
    let mut tracker = state.tracker.write().await;
    let synopsis = tracker.record_synopsis(synopsis)?;
    tracing::info!(group = %synopsis.group, status = ?synopsis.status, "Synopsis recorded");
    Ok(Json(DataResponse::new(synopsis)))
}

pub async fn list_submissions_handler(
    State(state): State<AppState>,
    Query(query): Query<DriveQuery>,
) -> ApiResult<DataResponse<Vec<Submission>>> {
    let tracker = state.tracker.read().await;
    Ok(Json(DataResponse::new(
        tracker.submissions(&DriveId::new(query.drive))?,
    )))
}

/// Record a deliverable; a repeat for the same target replaces the earlier one.
pub async fn record_submission_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmissionRequest>,
) -> ApiResult<DataResponse<Submission>> {
    let mut tracker = state.tracker.write().await;
    let submission = tracker.record_submission(request.to_submission(now()))?;
    tracing::info!(
        group = %submission.group,
        target = %submission.target,
        "Submission recorded"
    );
    Ok(Json(DataResponse::new(submission)))
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Every record of the store as one JSON snapshot.
pub async fn export_handler(State(state): State<AppState>) -> ApiResult<DataResponse<Snapshot>> {
    let tracker = state.tracker.read().await;
    Ok(Json(DataResponse::new(tracker.export_snapshot()?)))
}
