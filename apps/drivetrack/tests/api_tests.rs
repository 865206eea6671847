//! Integration tests for the drivetrack HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use drivetrack::api::{
    AllotResponse, AppState, AutoGroupResponse, DataResponse, HealthResponse, MessageResponse,
    RemainingResponse, StageBlockedResponse, StageMovedResponse, USER_ID_HEADER, create_router,
    create_router_with,
};
use drivetrack::config::SecurityConfig;
use drivetrack_core::{
    Drive, DriveId, DriveProgress, DriveStats, Group, GroupId, Member, MentorId, MentorPreference,
    Stage, StageStatus, StudentId, Submission, Synopsis, SynopsisId, SynopsisStatus, Timestamp,
    Tracker,
};
use serde_json::json;
use std::sync::Mutex;

/// Mutex to serialize tests since some of them modify env vars.
static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var("DRIVETRACK_API_KEY") };
    }
}

fn open_security() -> SecurityConfig {
    SecurityConfig {
        rate_limit: Some(0),
        ..SecurityConfig::default()
    }
}

fn server_for(tracker: Tracker) -> TestServer {
    let router = create_router_with(AppState::new(tracker), &open_security());
    TestServer::new(router).unwrap()
}

/// A fresh server with an empty in-memory tracker.
fn create_test_server() -> (TestServer, TestGuard) {
    let guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    (server_for(Tracker::new()), TestGuard { _guard: guard })
}

fn group(id: &str, leader: &str, at: i64, prefs: &[&str]) -> Group {
    let mut group = Group::new(
        GroupId::new(id),
        DriveId::new("fyp"),
        format!("Team {id}"),
        StudentId::new(leader),
        Timestamp(at),
    );
    group.mentor_preferences = prefs
        .iter()
        .zip(1u8..)
        .map(|(m, rank)| MentorPreference::new(MentorId::new(*m), rank))
        .collect();
    group
}

/// Drive `fyp` with mentors M1, M2 (one group each), students s1..s6, and
/// two groups that both prefer M1.
fn populated_tracker() -> Tracker {
    let mut tracker = Tracker::new();
    let mut drive = Drive::new(DriveId::new("fyp"), "Final Year Project", 1);
    drive.mentors = vec![MentorId::new("M1"), MentorId::new("M2")];
    drive.participating_students = (1..=6).map(|i| StudentId::new(format!("s{i}"))).collect();
    drive.max_group_size = 2;
    tracker.create_drive(drive).unwrap();

    let mut g1 = group("G1", "s1", 10, &["M1", "M2"]);
    g1.members = vec![Member::accepted(StudentId::new("s2"))];
    tracker.create_group(g1).unwrap();
    tracker.create_group(group("G2", "s3", 20, &["M1"])).unwrap();
    tracker
}

fn create_populated_test_server() -> (TestServer, TestGuard) {
    let guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    (server_for(populated_tracker()), TestGuard { _guard: guard })
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// DRIVE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_create_and_read_drive() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/drives")
        .json(&json!({
            "id": "fyp",
            "name": "Final Year Project",
            "mentors": ["M1", "M2"],
            "participatingStudents": ["s1", "s2"],
            "maxGroupsPerMentor": 3,
            "checkpoints": [{ "name": "Review 1", "maxMarks": 20 }]
        }))
        .await;
    assert_eq!(response.status_code().as_u16(), 201);

    let response = server.get("/drives/fyp").await;
    response.assert_status_ok();
    let body: DataResponse<Drive> = response.json();
    assert_eq!(body.data.current_stage, Stage::GroupFormation);
    assert_eq!(body.data.stages.checkpoints.len(), 1);
    assert_eq!(body.data.stages.checkpoints[0].status, StageStatus::NotStarted);
}

#[tokio::test]
async fn test_create_drive_rejects_zero_capacity() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/drives")
        .json(&json!({ "id": "bad", "name": "Bad", "maxGroupsPerMentor": 0 }))
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
    let body: MessageResponse = response.json();
    assert!(!body.success);
}

#[tokio::test]
async fn test_duplicate_drive_is_conflict() {
    let (server, _guard) = create_populated_test_server();

    let response = server
        .post("/drives")
        .json(&json!({ "id": "fyp", "name": "Again", "maxGroupsPerMentor": 1 }))
        .await;

    assert_eq!(response.status_code().as_u16(), 409);
}

#[tokio::test]
async fn test_unknown_drive_is_404() {
    let (server, _guard) = create_test_server();

    let response = server.get("/drives/nope").await;

    response.assert_status_not_found();
    let body: MessageResponse = response.json();
    assert!(!body.success);
    assert!(body.message.contains("nope"));
}

#[tokio::test]
async fn test_drive_stats() {
    let (server, _guard) = create_populated_test_server();

    let response = server.get("/drives/fyp/stats").await;

    response.assert_status_ok();
    let body: DataResponse<DriveStats> = response.json();
    assert_eq!(body.data.groups.total, 2);
    assert_eq!(body.data.groups.with_mentor, 0);
    assert_eq!(body.data.students.total, 6);
    assert_eq!(body.data.students.in_groups, 3);
    assert_eq!(body.data.students.unregistered, 3);
}

#[tokio::test]
async fn test_drive_progress_reports_not_ready() {
    let (server, _guard) = create_populated_test_server();

    let response = server.get("/drives/fyp/progress").await;

    response.assert_status_ok();
    let body: DataResponse<DriveProgress> = response.json();
    assert_eq!(body.data.report.current, Stage::GroupFormation);
    assert!(!body.data.report.ready);
}

// =============================================================================
// ALLOTMENT ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_auto_allot_first_come_first_served() {
    let (server, _guard) = create_populated_test_server();

    let response = server.post("/groups/auto-allot/fyp").await;

    response.assert_status_ok();
    let body: AllotResponse = response.json();
    assert!(body.success);
    assert_eq!(body.allotted_count, 2);
    assert_eq!(body.failed_count, 0);
    assert!(body.message.starts_with("2 groups allotted mentors successfully"));

    // G1 was created first and takes M1; G2 falls back to M2.
    let g1: DataResponse<Group> = server.get("/groups/G1").await.json();
    let g2: DataResponse<Group> = server.get("/groups/G2").await.json();
    assert_eq!(g1.data.assigned_mentor(), Some(&MentorId::new("M1")));
    assert_eq!(g2.data.assigned_mentor(), Some(&MentorId::new("M2")));
}

#[tokio::test]
async fn test_auto_allot_reports_failed_groups() {
    let (server, _guard) = create_populated_test_server();
    server
        .post("/groups")
        .json(&json!({
            "id": "G3", "driveId": "fyp", "name": "Team G3", "leader": "s5",
            "mentorPreferences": ["M1"]
        }))
        .await
        .assert_status_success();

    let body: AllotResponse = server.post("/groups/auto-allot/fyp").await.json();

    assert_eq!(body.allotted_count, 2);
    assert_eq!(body.failed_count, 1);
    assert_eq!(body.failed_groups[0].group_id, GroupId::new("G3"));
    assert_eq!(body.failed_groups[0].preferences, vec![MentorId::new("M1")]);
}

#[tokio::test]
async fn test_auto_allot_unknown_drive_is_404() {
    let (server, _guard) = create_test_server();

    let response = server.post("/groups/auto-allot/nope").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_manual_assign_records_admin() {
    let (server, _guard) = create_populated_test_server();

    let response = server
        .put("/groups/G2/mentor")
        .add_header(
            HeaderName::from_static(USER_ID_HEADER),
            HeaderValue::from_static("coordinator-7"),
        )
        .json(&json!({ "mentorId": "M2" }))
        .await;

    response.assert_status_ok();
    let body: DataResponse<Group> = response.json();
    let assignment = body.data.assignment.unwrap();
    assert_eq!(assignment.mentor, MentorId::new("M2"));
    assert_eq!(assignment.assigned_by.as_str(), "coordinator-7");
}

#[tokio::test]
async fn test_manual_assign_over_capacity_is_400() {
    let (server, _guard) = create_populated_test_server();

    server
        .put("/groups/G1/mentor")
        .json(&json!({ "mentorId": "M1" }))
        .await
        .assert_status_ok();
    let response = server
        .put("/groups/G2/mentor")
        .json(&json!({ "mentorId": "M1" }))
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
    let body: MessageResponse = response.json();
    assert!(body.message.contains("maximum group limit"));
}

#[tokio::test]
async fn test_manual_assign_unknown_mentor_is_404() {
    let (server, _guard) = create_populated_test_server();

    let response = server
        .put("/groups/G1/mentor")
        .json(&json!({ "mentorId": "M9" }))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_unassign() {
    let (server, _guard) = create_populated_test_server();

    let response = server.delete("/groups/G1/mentor").await;
    assert_eq!(response.status_code().as_u16(), 400);

    server
        .put("/groups/G1/mentor")
        .json(&json!({ "mentorId": "M1" }))
        .await
        .assert_status_ok();
    let response = server.delete("/groups/G1/mentor").await;
    response.assert_status_ok();
    let body: DataResponse<Group> = response.json();
    assert!(body.data.assignment.is_none());
    assert_eq!(body.message.as_deref(), Some("Mentor unassigned successfully"));
}

#[tokio::test]
async fn test_set_preferences() {
    let (server, _guard) = create_populated_test_server();

    let response = server
        .put("/groups/G2/preferences")
        .json(&json!({ "mentorPreferences": ["M2", "M1"] }))
        .await;
    response.assert_status_ok();
    let body: DataResponse<Group> = response.json();
    assert_eq!(body.data.mentor_preferences[0].mentor, MentorId::new("M2"));
    assert_eq!(body.data.mentor_preferences[0].rank, 1);

    let response = server
        .put("/groups/G2/preferences")
        .json(&json!({ "mentorPreferences": ["M1", "M2", "M1", "M2", "M9"] }))
        .await;
    assert_eq!(response.status_code().as_u16(), 400);
}

// =============================================================================
// STAGE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_progress_blocked_then_forced() {
    let (server, _guard) = create_populated_test_server();

    let response = server.post("/drives/fyp/progress-stage").await;
    assert_eq!(response.status_code().as_u16(), 400);
    let blocked: StageBlockedResponse = response.json();
    assert!(!blocked.success);
    assert_eq!(blocked.current_stage, Stage::GroupFormation);
    assert_eq!(blocked.action.as_deref(), Some("Use force:true to override"));

    let response = server
        .post("/drives/fyp/progress-stage")
        .json(&json!({ "force": true }))
        .await;
    response.assert_status_ok();
    let moved: StageMovedResponse = response.json();
    assert_eq!(moved.previous_stage, Stage::GroupFormation);
    assert_eq!(moved.current_stage, Stage::MentorAllotment);
    assert_eq!(
        moved.stages.status_of(Stage::MentorAllotment),
        Some(StageStatus::Active)
    );
}

#[tokio::test]
async fn test_progress_after_allotment_is_ready() {
    let (server, _guard) = create_populated_test_server();

    server
        .post("/drives/fyp/progress-stage")
        .json(&json!({ "force": true }))
        .await
        .assert_status_ok();
    server.post("/groups/auto-allot/fyp").await.assert_status_ok();

    let response = server.post("/drives/fyp/progress-stage").await;
    response.assert_status_ok();
    let moved: StageMovedResponse = response.json();
    assert_eq!(moved.current_stage, Stage::Synopsis);
}

#[tokio::test]
async fn test_synopsis_gate_counts_approved() {
    let (server, _guard) = create_populated_test_server();
    server
        .post("/drives/fyp/progress-stage")
        .json(&json!({ "force": true }))
        .await
        .assert_status_ok();
    server.post("/groups/auto-allot/fyp").await.assert_status_ok();
    server.post("/drives/fyp/progress-stage").await.assert_status_ok();

    for (i, gid) in ["G1", "G2"].iter().enumerate() {
        for status in [SynopsisStatus::Submitted, SynopsisStatus::Approved] {
            let synopsis = Synopsis {
                id: SynopsisId::new(format!("syn{i}")),
                group: GroupId::new(*gid),
                drive: DriveId::new("fyp"),
                status,
                submitted_at: Timestamp(100),
            };
            server.post("/synopses").json(&synopsis).await.assert_status_ok();
        }
    }

    let moved: StageMovedResponse = server.post("/drives/fyp/progress-stage").await.json();
    assert_eq!(moved.current_stage, Stage::Checkpoints);
}

#[tokio::test]
async fn test_synopsis_without_mentor_is_400() {
    let (server, _guard) = create_populated_test_server();
    let synopsis = Synopsis {
        id: SynopsisId::new("syn0"),
        group: GroupId::new("G1"),
        drive: DriveId::new("fyp"),
        status: SynopsisStatus::Submitted,
        submitted_at: Timestamp(100),
    };

    let response = server.post("/synopses").json(&synopsis).await;

    assert_eq!(response.status_code().as_u16(), 400);
    let body: MessageResponse = response.json();
    assert!(body.message.contains("assigned mentor"));
}

#[tokio::test]
async fn test_synopsis_review_of_approved_is_400() {
    let (server, _guard) = create_populated_test_server();
    server.post("/groups/auto-allot/fyp").await.assert_status_ok();

    for status in [SynopsisStatus::Submitted, SynopsisStatus::Approved] {
        let synopsis = Synopsis {
            id: SynopsisId::new("syn0"),
            group: GroupId::new("G1"),
            drive: DriveId::new("fyp"),
            status,
            submitted_at: Timestamp(100),
        };
        server.post("/synopses").json(&synopsis).await.assert_status_ok();
    }

    let rejected = Synopsis {
        id: SynopsisId::new("syn1"),
        group: GroupId::new("G1"),
        drive: DriveId::new("fyp"),
        status: SynopsisStatus::Rejected,
        submitted_at: Timestamp(200),
    };
    let response = server.post("/synopses").json(&rejected).await;
    assert_eq!(response.status_code().as_u16(), 400);
}

#[tokio::test]
async fn test_regress_at_first_stage_is_400() {
    let (server, _guard) = create_populated_test_server();

    let response = server.post("/drives/fyp/regress-stage").await;

    assert_eq!(response.status_code().as_u16(), 400);
    let blocked: StageBlockedResponse = response.json();
    assert!(blocked.action.is_none());
}

#[tokio::test]
async fn test_regress_after_progress() {
    let (server, _guard) = create_populated_test_server();
    server
        .post("/drives/fyp/progress-stage")
        .json(&json!({ "force": true }))
        .await
        .assert_status_ok();

    let response = server.post("/drives/fyp/regress-stage").await;

    response.assert_status_ok();
    let moved: StageMovedResponse = response.json();
    assert_eq!(moved.current_stage, Stage::GroupFormation);
    assert_eq!(
        moved.stages.status_of(Stage::MentorAllotment),
        Some(StageStatus::NotStarted)
    );
}

#[tokio::test]
async fn test_progress_invalid_body_is_400() {
    let (server, _guard) = create_populated_test_server();

    let response = server
        .post("/drives/fyp/progress-stage")
        .bytes(bytes::Bytes::from("not valid json"))
        .content_type("application/json")
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
}

// =============================================================================
// GROUPING ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_remaining_and_auto_group() {
    let (server, _guard) = create_populated_test_server();

    let remaining: RemainingResponse = server.get("/groups/remaining/fyp").await.json();
    assert_eq!(remaining.count, 3);
    assert_eq!(remaining.students[0], StudentId::new("s4"));

    let response = server.post("/groups/auto-group/fyp").await;
    response.assert_status_ok();
    let body: AutoGroupResponse = response.json();
    assert_eq!(body.groups_created, 2);
    assert_eq!(body.total_students_grouped, 3);
    assert_eq!(body.message, "2 auto-groups created for remaining students");

    let again: AutoGroupResponse = server.post("/groups/auto-group/fyp").await.json();
    assert_eq!(again.groups_created, 0);
    assert_eq!(again.message, "All students are already grouped");
}

#[tokio::test]
async fn test_create_group_rejects_grouped_student() {
    let (server, _guard) = create_populated_test_server();

    let response = server
        .post("/groups")
        .json(&json!({ "id": "G9", "driveId": "fyp", "name": "Late", "leader": "s2" }))
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
}

#[tokio::test]
async fn test_list_groups_by_drive() {
    let (server, _guard) = create_populated_test_server();

    let response = server.get("/groups").add_query_param("drive", "fyp").await;

    response.assert_status_ok();
    let body: DataResponse<Vec<Group>> = response.json();
    assert_eq!(body.data.len(), 2);
}

// =============================================================================
// SUBMISSION ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_submission_replaces_same_target() {
    let (server, _guard) = create_populated_test_server();

    let first: DataResponse<Submission> = server
        .post("/submissions")
        .json(&json!({
            "id": "sub-1", "groupId": "G1", "driveId": "fyp",
            "target": { "generic": "logbook" }, "title": "Week 1", "status": "submitted"
        }))
        .await
        .json();
    assert!(first.data.submitted_at.is_some());

    let second: DataResponse<Submission> = server
        .post("/submissions")
        .json(&json!({
            "id": "sub-2", "groupId": "G1", "driveId": "fyp",
            "target": { "generic": "logbook" }, "title": "Week 2"
        }))
        .await
        .json();
    assert_eq!(second.data.id.as_str(), "sub-1");

    let listed: DataResponse<Vec<Submission>> = server
        .get("/submissions")
        .add_query_param("drive", "fyp")
        .await
        .json();
    assert_eq!(listed.data.len(), 1);
    assert_eq!(listed.data[0].title, "Week 2");
}

#[tokio::test]
async fn test_submission_unknown_checkpoint_is_400() {
    let (server, _guard) = create_populated_test_server();

    let response = server
        .post("/submissions")
        .json(&json!({
            "id": "sub-1", "groupId": "G1", "driveId": "fyp",
            "target": { "checkpoint": 4 }, "title": "Review"
        }))
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
}

// =============================================================================
// ERROR HANDLING TESTS
// =============================================================================

#[tokio::test]
async fn test_404_on_unknown_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/unknown").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let (server, _guard) = create_test_server();

    let response = server.post("/health").await;
    assert_eq!(response.status_code().as_u16(), 405);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/groups")
        .bytes(bytes::Bytes::from("not valid json"))
        .content_type("application/json")
        .await;

    assert!(response.status_code().is_client_error());
}

// =============================================================================
// AUTHENTICATION MIDDLEWARE TESTS
// =============================================================================

/// Create a server with authentication enabled through the environment.
/// Must be called while holding ENV_TEST_MUTEX.
fn create_auth_test_server(api_key: &str) -> TestServer {
    // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::set_var("DRIVETRACK_API_KEY", api_key) };
    let router = create_router(AppState::new(Tracker::new()));
    TestServer::new(router).unwrap()
}

/// Clean up auth env var after test.
fn cleanup_auth_env() {
    // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
    unsafe { std::env::remove_var("DRIVETRACK_API_KEY") };
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let api_key = "test-secret-key-12345";
    let server = create_auth_test_server(api_key);

    let response = server
        .get("/drives")
        .add_header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", api_key)
                .parse::<HeaderValue>()
                .unwrap(),
        )
        .await;

    cleanup_auth_env();

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let api_key = "test-raw-key-67890";
    let server = create_auth_test_server(api_key);

    let response = server
        .get("/drives")
        .add_header(
            axum::http::header::AUTHORIZATION,
            api_key.parse::<HeaderValue>().unwrap(),
        )
        .await;

    cleanup_auth_env();

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = create_auth_test_server("correct-key");

    let response = server
        .get("/drives")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;

    cleanup_auth_env();

    assert_eq!(
        response.status_code().as_u16(),
        401,
        "Invalid token should return 401 Unauthorized"
    );
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = create_auth_test_server("required-key");

    let response = server.post("/groups/auto-allot/fyp").await;

    cleanup_auth_env();

    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = create_auth_test_server("secret-key-for-bypass-test");

    let response = server.get("/health").await;

    cleanup_auth_env();

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_configured_in_security_config() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let security = SecurityConfig {
        api_key: Some("from-config".to_string()),
        rate_limit: Some(0),
        ..SecurityConfig::default()
    };
    let server =
        TestServer::new(create_router_with(AppState::new(Tracker::new()), &security)).unwrap();

    server.get("/drives").await.assert_status_unauthorized();
    server
        .get("/drives")
        .add_header(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-config"),
        )
        .await
        .assert_status_ok();
}

// =============================================================================
// RATE LIMIT TESTS
// =============================================================================

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let security = SecurityConfig {
        rate_limit: Some(1),
        ..SecurityConfig::default()
    };
    let server =
        TestServer::new(create_router_with(AppState::new(Tracker::new()), &security)).unwrap();

    server.get("/health").await.assert_status_ok();
    let response = server.get("/health").await;
    assert_eq!(response.status_code().as_u16(), 429);
}

#[tokio::test]
async fn test_zero_rate_limit_disables_limiting() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let server = server_for(Tracker::new());

    for _ in 0..150 {
        server.get("/health").await.assert_status_ok();
    }
}
