//! Job status and cancellation handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use clipstream_core::models::JobResponse;
use clipstream_core::AppError;
use clipstream_worker::project_status;

use crate::auth::OwnerId;
use crate::error::HttpAppError;
use crate::state::AppState;

#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, HttpAppError> {
    let job = state
        .jobs
        .get(owner.0, job_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, job_id = %job_id, "Failed to load job");
            AppError::Internal(e.to_string())
        })?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    Ok(Json(project_status(&job)))
}

/// Request cancellation of a running or pending ingest.
///
/// The cancel flag is a one-way latch on the upload session; the worker
/// observes it at its next checkpoint. A job that already finished keeps its
/// terminal state.
#[tracing::instrument(skip(state))]
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    // Session id doubles as job id, so the session row is the authority on
    // both existence and ownership.
    let session = state
        .sessions
        .get(job_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, job_id = %job_id, "Failed to load upload session");
            AppError::Internal(e.to_string())
        })?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    if session.owner_id != owner.0 {
        return Err(AppError::Forbidden("Job belongs to another account".to_string()).into());
    }

    let newly_requested = state
        .sessions
        .request_cancel(job_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, job_id = %job_id, "Failed to set cancel flag");
            AppError::Internal(e.to_string())
        })?;

    // A job still sitting in the queue can be settled immediately instead of
    // waiting for a worker to claim it and notice the flag.
    match state.jobs.cancel_if_pending(owner.0, job_id).await {
        Ok(Some(_)) => {
            tracing::info!(job_id = %job_id, "Cancelled pending job before execution");
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, job_id = %job_id, "Pending-job cancel pass failed");
        }
    }

    // Abort the remote transfer session if one was opened. Best effort; the
    // worker's own cancellation path also aborts on its side.
    if let Some(endpoint) = session.remote_endpoint.as_deref() {
        if let Err(e) = state.origin.abort_session(endpoint).await {
            tracing::warn!(error = %e, job_id = %job_id, "Failed to abort origin session");
        }
    }

    tracing::info!(
        job_id = %job_id,
        newly_requested = newly_requested,
        "Cancellation requested"
    );

    Ok(Json(serde_json::json!({
        "cancelled": true,
        "already_requested": !newly_requested,
    })))
}
