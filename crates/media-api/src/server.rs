//! Axum server and routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use media_scheduler::{BatchScheduler, SchedulerError};
use media_types::{BatchJob, BatchSettings, Generator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub scheduler: Arc<BatchScheduler>,
    /// Used for every batch started through the API.
    pub generator: Arc<dyn Generator>,
}

/// Response envelope shared by all JSON routes. `code` mirrors the HTTP status.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn respond<T>(status: StatusCode, data: T) -> ApiResult<T> {
    Ok((
        status,
        Json(ApiResponse {
            code: status.as_u16(),
            message: "ok".to_string(),
            data: Some(data),
        }),
    ))
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        let status = match e {
            SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
            SchedulerError::JobNotFound(_) => StatusCode::NOT_FOUND,
            SchedulerError::AlreadyRunning(_) => StatusCode::CONFLICT,
            SchedulerError::Store(_) | SchedulerError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "request failed");
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            code: self.status.as_u16(),
            message: self.message,
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub owner_id: String,
    pub settings: BatchSettings,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub max_age_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub evicted: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/batch", post(handle_create).get(handle_list))
        .route("/batch/cleanup", post(handle_cleanup))
        .route("/batch/:id", get(handle_get))
        .route("/batch/:id/cancel", post(handle_cancel))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create the job and start it in the background; the response carries the pending snapshot.
async fn handle_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBatchRequest>,
) -> ApiResult<BatchJob> {
    if req.owner_id.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "owner_id is required"));
    }
    let job = state
        .scheduler
        .create_job(&req.owner_id, req.settings)
        .await?;
    state
        .scheduler
        .spawn_batch(&job.id, Arc::clone(&state.generator), None);
    respond(StatusCode::ACCEPTED, job)
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<BatchJob> {
    match state.scheduler.get_job(&id).await? {
        Some(job) => respond(StatusCode::OK, job),
        None => Err(SchedulerError::JobNotFound(id).into()),
    }
}

async fn handle_list(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Vec<BatchJob>> {
    let Some(owner_id) = q.owner_id.filter(|o| !o.trim().is_empty()) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "owner_id is required"));
    };
    let jobs = state.scheduler.list_jobs_for_owner(&owner_id).await?;
    respond(StatusCode::OK, jobs)
}

async fn handle_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<CancelResponse> {
    let cancelled = state.scheduler.cancel_job(&id).await?;
    respond(StatusCode::OK, CancelResponse { cancelled })
}

async fn handle_cleanup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CleanupRequest>,
) -> ApiResult<CleanupResponse> {
    let evicted = state
        .scheduler
        .cleanup_old_jobs(Duration::from_millis(req.max_age_ms))
        .await?;
    respond(StatusCode::OK, CleanupResponse { evicted })
}

async fn handle_health() -> &'static str {
    "ok"
}
