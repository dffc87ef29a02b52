use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tokio_util::sync::CancellationToken;

use crate::api::models::{
    AddJobRequest, AddJobResponse, ErrorBody, JobIdsRequest, ListJobsQuery, ListQueuesQuery,
    QueueIdsRequest, RetryAllResponse, SuccessResponse,
};
use crate::control::ControlPlane;
use crate::domain::{BulkReport, GroupDashboard, Job, JobPage, JobState, Queue, QueueOutcome};
use crate::error::QueueError;

pub mod models;

pub const DEFAULT_PAGE_SIZE: u64 = 25;

#[derive(Clone)]
pub struct ApiState {
    pub control: ControlPlane,
    /// Cancelled when the server shuts down; long batch calls stop between windows.
    pub shutdown: CancellationToken,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Dashboards
        .route("/dashboard", get(all_dashboards))
        .route("/groups/:id/dashboard", get(group_dashboard))
        // Queues
        .route("/queues", get(list_queues))
        .route("/queues/pause", put(pause_queues))
        .route("/queues/resume", put(resume_queues))
        .route("/queues/:id", get(describe_queue))
        .route("/queues/:id/pause", put(pause_queue))
        .route("/queues/:id/resume", put(resume_queue))
        // Jobs
        .route(
            "/queues/:id/jobs",
            get(list_jobs).post(add_job).delete(delete_jobs),
        )
        .route("/queues/:id/jobs/retry", post(retry_jobs))
        .route("/queues/:id/jobs/retry-all", post(retry_all_jobs))
        .route("/queues/:id/jobs/:job_id", get(get_job))
        .route("/queues/:id/jobs/:job_id/clone", post(clone_job))
        .route("/queues/:id/jobs/:job_id/export", get(export_job))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_body(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
        }),
    )
}

fn queue_err(e: QueueError) -> ApiError {
    let status = match &e {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        QueueError::EngineUnavailable { .. } => StatusCode::BAD_GATEWAY,
        QueueError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "request failed");
    }
    error_body(status, e.to_string())
}

// ----------------------------
// Dashboards
// ----------------------------

pub async fn all_dashboards(
    State(state): State<ApiState>,
) -> Result<Json<Vec<GroupDashboard>>, ApiError> {
    let dashboards = state
        .control
        .build_all_dashboards()
        .await
        .map_err(queue_err)?;
    Ok(Json(dashboards))
}

pub async fn group_dashboard(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<GroupDashboard>, ApiError> {
    let dashboard = state
        .control
        .build_group_dashboard(&id)
        .await
        .map_err(queue_err)?;
    Ok(Json(dashboard))
}

// ----------------------------
// Queues
// ----------------------------

pub async fn list_queues(
    State(state): State<ApiState>,
    Query(q): Query<ListQueuesQuery>,
) -> Result<Json<Vec<QueueOutcome>>, ApiError> {
    let queues = state
        .control
        .list_queues(&q.group_id)
        .await
        .map_err(queue_err)?;
    Ok(Json(queues))
}

pub async fn describe_queue(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<Queue>, ApiError> {
    let queue = state.control.describe_queue(&id).await.map_err(queue_err)?;
    Ok(Json(queue))
}

pub async fn pause_queue(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.control.pause_queue(&id).await.map_err(queue_err)?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn resume_queue(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.control.resume_queue(&id).await.map_err(queue_err)?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn pause_queues(
    State(state): State<ApiState>,
    Json(req): Json<QueueIdsRequest>,
) -> Result<Json<BulkReport>, ApiError> {
    let report = state
        .control
        .pause_queues(&req.ids)
        .await
        .map_err(queue_err)?;
    Ok(Json(report))
}

pub async fn resume_queues(
    State(state): State<ApiState>,
    Json(req): Json<QueueIdsRequest>,
) -> Result<Json<BulkReport>, ApiError> {
    let report = state
        .control
        .resume_queues(&req.ids)
        .await
        .map_err(queue_err)?;
    Ok(Json(report))
}

// ----------------------------
// Jobs
// ----------------------------

pub async fn list_jobs(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Json<JobPage>, ApiError> {
    let job_state = q
        .state
        .parse::<JobState>()
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, e.to_string()))?;

    let page = state
        .control
        .list_jobs(
            &id,
            job_state,
            q.page.unwrap_or(1),
            q.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await
        .map_err(queue_err)?;
    Ok(Json(page))
}

pub async fn add_job(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(req): Json<AddJobRequest>,
) -> Result<Json<AddJobResponse>, ApiError> {
    let id = state
        .control
        .add_job(&id, req.data)
        .await
        .map_err(queue_err)?;
    Ok(Json(AddJobResponse { id }))
}

pub async fn delete_jobs(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(req): Json<JobIdsRequest>,
) -> Result<Json<BulkReport>, ApiError> {
    let report = state
        .control
        .delete_jobs(&id, &req.job_ids)
        .await
        .map_err(queue_err)?;
    Ok(Json(report))
}

pub async fn retry_jobs(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(req): Json<JobIdsRequest>,
) -> Result<Json<BulkReport>, ApiError> {
    let report = state
        .control
        .retry_jobs(&id, &req.job_ids)
        .await
        .map_err(queue_err)?;
    Ok(Json(report))
}

pub async fn retry_all_jobs(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<RetryAllResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    let retried = state
        .control
        .retry_all_jobs(&id, &cancel)
        .await
        .map_err(queue_err)?;
    Ok(Json(RetryAllResponse { retried }))
}

pub async fn get_job(
    Path((id, job_id)): Path<(String, String)>,
    State(state): State<ApiState>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .control
        .get_job(&id, &job_id)
        .await
        .map_err(queue_err)?;
    Ok(Json(job))
}

pub async fn clone_job(
    Path((id, job_id)): Path<(String, String)>,
    State(state): State<ApiState>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = state
        .control
        .clone_job(&id, &job_id)
        .await
        .map_err(queue_err)?;
    Ok(Json(SuccessResponse { success }))
}

pub async fn export_job(
    Path((id, job_id)): Path<(String, String)>,
    State(state): State<ApiState>,
) -> Result<Response, ApiError> {
    let export = state
        .control
        .export_job(&id, &job_id)
        .await
        .map_err(queue_err)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.content,
    )
        .into_response())
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
