//! Handlers for the `/jobs` resource: submission, queries, cancellation,
//! and log access.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use netfleet_core::error::CoreError;
use netfleet_core::filter::TargetFilter;
use netfleet_core::payload::{JobType, OperationPayload};
use netfleet_core::types::{DbId, LogSequence, Timestamp};
use netfleet_db::models::job::{CancelOutcome, Job, JobListQuery, NewJob};
use netfleet_db::repositories::{JobLogRepo, JobRepo};
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::tenant::Tenant;
use crate::ws;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/jobs/{id}/logs", get(get_logs))
        .route("/jobs/{id}/logs/stream", get(ws::job_log_stream))
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    /// One of the closed job type set, e.g. `"run-commands"`.
    #[validate(length(min = 1, max = 64))]
    pub job_type: String,
    pub target_filter: TargetFilter,
    /// Typed payload; its tag must match `job_type`.
    pub payload: serde_json::Value,
    /// The submitting user, resolved by the upstream auth layer.
    pub requested_by: DbId,
    /// Optional future dispatch time.
    pub scheduled_for: Option<Timestamp>,
}

/// POST /api/v1/jobs
///
/// Submit a job. Validation happens before any row is created; the call
/// returns as soon as the job is recorded as `queued` (or `scheduled`) and
/// never waits for execution.
async fn submit_job(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::InvalidRequest(e.to_string())))?;

    let job_type = JobType::parse(&input.job_type)?;

    let payload: OperationPayload = serde_json::from_value(input.payload)
        .map_err(|e| CoreError::InvalidRequest(format!("Malformed payload: {e}")))?;
    if payload.job_type() != job_type {
        return Err(AppError::Core(CoreError::InvalidRequest(format!(
            "Payload type {} does not match job type {job_type}",
            payload.job_type()
        ))));
    }
    payload.validate()?;
    input.target_filter.validate()?;

    let job = JobRepo::create(
        &state.pool,
        &NewJob {
            tenant_id,
            job_type,
            target_filter: input.target_filter,
            payload,
            requested_by: input.requested_by,
            scheduled_for: input.scheduled_for,
        },
    )
    .await?;

    tracing::info!(
        job_id = job.id,
        job_type = %job.job_type,
        tenant_id,
        user_id = job.requested_by,
        "Job submitted",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List the tenant's jobs, newest first. Supports optional `status_id`,
/// `limit`, and `offset` query parameters.
async fn list_jobs(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list(&state.pool, tenant_id, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
async fn get_job(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, tenant_id, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel a queued, scheduled, or running job. Jobs that have not started
/// cancel immediately; running jobs finish their in-flight hosts and
/// finalize as `cancelled`. Terminal jobs yield 409.
async fn cancel_job(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcome = JobRepo::request_cancel(&state.pool, tenant_id, job_id).await?;

    tracing::info!(job_id, tenant_id, outcome = ?outcome, "Job cancellation requested");

    let status = match outcome {
        CancelOutcome::CancelledImmediately => StatusCode::NO_CONTENT,
        CancelOutcome::CancellationRequested => StatusCode::ACCEPTED,
    };
    Ok(status)
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/v1/jobs/{id}/logs`.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Return only entries with `seq` greater than this; `0` (default)
    /// returns the full log. Polling clients pass the last sequence they
    /// have seen.
    #[serde(default)]
    pub since: LogSequence,
}

/// GET /api/v1/jobs/{id}/logs
async fn get_logs(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Query(params): Query<LogsQuery>,
) -> AppResult<impl IntoResponse> {
    // Scope check before reading the (tenant-unscoped) log table.
    find_job(&state, tenant_id, job_id).await?;

    let entries = JobLogRepo::since(&state.pool, job_id, params.since).await?;
    Ok(Json(DataResponse { data: entries }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn find_job(state: &AppState, tenant_id: DbId, job_id: DbId) -> AppResult<Job> {
    JobRepo::find_scoped(&state.pool, tenant_id, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))
}
