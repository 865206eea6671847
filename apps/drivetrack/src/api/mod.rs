//! # drivetrack HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET|POST /drives` - List or create drives
//! - `GET /drives/{id}` - Read a drive
//! - `GET /drives/{id}/stats` - Group and student counts
//! - `GET /drives/{id}/progress` - Stage readiness report
//! - `POST /drives/{id}/progress-stage` - Advance one stage (`{ force }` optional)
//! - `POST /drives/{id}/regress-stage` - Go back one stage
//! - `GET|POST /groups` - List groups of `?drive=` or create a group
//! - `GET /groups/{id}` - Read a group
//! - `PUT|DELETE /groups/{id}/mentor` - Manual assign / unassign
//! - `PUT /groups/{id}/preferences` - Replace ranked mentor preferences
//! - `POST /groups/auto-allot/{driveId}` - Bulk mentor allotment
//! - `GET /groups/remaining/{driveId}` - Students in no group
//! - `POST /groups/auto-group/{driveId}` - Group the remaining students
//! - `POST /synopses` - Record a synopsis review state
//! - `GET|POST /submissions` - List (`?drive=`) or record submissions
//! - `GET /export` - Every record as a JSON snapshot
//!
//! ## Security Configuration
//!
//! See [`crate::config::SecurityConfig`]: CORS origins, rate limit and API key,
//! each overridable through `DRIVETRACK_*` environment variables.

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ApiKey, api_key_auth_middleware};
pub use handlers::{ApiError, USER_ID_HEADER, status_for};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    AllotResponse, AssignMentorRequest, AutoGroupResponse, CreateDriveRequest,
    CreateGroupRequest, DataResponse, DriveQuery, HealthResponse, MessageResponse,
    PreferencesRequest, ProgressRequest, RemainingResponse, StageBlockedResponse,
    StageMovedResponse, SubmissionRequest,
};

use crate::config::SecurityConfig;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use drivetrack_core::{TrackError, Tracker};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (2 MiB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the tracker.
///
/// Every mutating handler takes the write lock, so writes are serialized
/// within the process.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<RwLock<Tracker>>,
}

impl AppState {
    #[must_use]
    pub fn new(tracker: Tracker) -> Self {
        Self {
            tracker: Arc::new(RwLock::new(tracker)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

fn cors_headers() -> [HeaderName; 3] {
    [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(USER_ID_HEADER),
    ]
}

/// Build the CORS layer.
///
/// - `"*"`: allows all origins (development only)
/// - unset: localhost only
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(CORS_METHODS)
                    .allow_headers(cors_headers())
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers(cors_headers())
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router with security settings read from the environment.
pub fn create_router(state: AppState) -> Router {
    create_router_with(state, &SecurityConfig::from_env())
}

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
/// 5. Authentication (if configured)
pub fn create_router_with(state: AppState, security: &SecurityConfig) -> Router {
    let cors = build_cors_layer(security.cors_origins.as_deref());

    let rate_limit = security.rate_limit();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let api_key: Option<ApiKey> = security.api_key().map(Arc::from);
    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set DRIVETRACK_API_KEY to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/drives",
            get(handlers::list_drives_handler).post(handlers::create_drive_handler),
        )
        .route("/drives/{id}", get(handlers::get_drive_handler))
        .route("/drives/{id}/stats", get(handlers::drive_stats_handler))
        .route("/drives/{id}/progress", get(handlers::drive_progress_handler))
        .route(
            "/drives/{id}/progress-stage",
            post(handlers::progress_stage_handler),
        )
        .route(
            "/drives/{id}/regress-stage",
            post(handlers::regress_stage_handler),
        )
        .route(
            "/groups",
            get(handlers::list_groups_handler).post(handlers::create_group_handler),
        )
        .route("/groups/{id}", get(handlers::get_group_handler))
        .route(
            "/groups/{id}/mentor",
            put(handlers::assign_mentor_handler).delete(handlers::unassign_mentor_handler),
        )
        .route(
            "/groups/{id}/preferences",
            put(handlers::set_preferences_handler),
        )
        .route(
            "/groups/auto-allot/{drive_id}",
            post(handlers::auto_allot_handler),
        )
        .route(
            "/groups/remaining/{drive_id}",
            get(handlers::remaining_students_handler),
        )
        .route(
            "/groups/auto-group/{drive_id}",
            post(handlers::auto_group_handler),
        )
        .route("/synopses", post(handlers::record_synopsis_handler))
        .route(
            "/submissions",
            get(handlers::list_submissions_handler).post(handlers::record_submission_handler),
        )
        .route("/export", get(handlers::export_handler));

    // Authentication is innermost: it runs last on the way in.
    if let Some(key) = api_key {
        router = router.layer(axum_middleware::from_fn_with_state(
            key,
            auth::api_key_auth_middleware,
        ));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve until Ctrl+C, then hand the state back to the caller.
pub async fn run_server(
    addr: &str,
    state: AppState,
    security: &SecurityConfig,
) -> Result<AppState, TrackError> {
    let router = create_router_with(state.clone(), security);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TrackError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("drivetrack HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TrackError::Io(format!("Server error: {}", e)))?;

    tracing::info!("drivetrack HTTP server stopped");
    Ok(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
