//! Video submission handler
//!
//! Accepts the multipart upload, validates synchronously, stages the file,
//! and enqueues the ingest job. Everything slow (transcode, transfer) runs
//! in the background; the client gets a job id to poll.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use clipstream_core::models::{IngestJobPayload, VideoSubmission};
use clipstream_core::AppError;

use crate::auth::OwnerId;
use crate::error::HttpAppError;
use crate::state::AppState;

/// Staged parts of one multipart submission.
struct StagedUpload {
    staged_path: PathBuf,
    staged_thumbnail_path: Option<PathBuf>,
    original_filename: String,
    file_size: u64,
    fields: HashMap<String, String>,
}

#[tracing::instrument(skip(state, multipart))]
pub async fn submit_video(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let session_id = Uuid::new_v4();
    let staging_dir = Path::new(state.config.staging_dir()).join(session_id.to_string());

    let result = stage_and_enqueue(&state, owner.0, session_id, &staging_dir, multipart).await;

    if result.is_err() {
        // Nothing was enqueued; remove whatever was staged.
        if let Err(e) = tokio::fs::remove_dir_all(&staging_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to remove staging dir after rejected submission"
                );
            }
        }
    }

    let job_id = result?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job_id": job_id })),
    ))
}

async fn stage_and_enqueue(
    state: &AppState,
    owner_id: Uuid,
    session_id: Uuid,
    staging_dir: &Path,
    multipart: Multipart,
) -> Result<Uuid, HttpAppError> {
    let staged = stage_multipart(state, staging_dir, multipart).await?;

    let submission = submission_from_fields(&staged.fields)?;

    // Duration comes from ffprobe; an unreadable container leaves it unknown
    // and the validator skips the ceiling check.
    let duration_secs = match state.probe.probe(&staged.staged_path).await {
        Ok(info) => Some(info.duration_secs),
        Err(e) => {
            tracing::warn!(
                session_id = %session_id,
                error = %e,
                "Duration probe failed, skipping duration check"
            );
            None
        }
    };

    state.validator.validate_submission(
        &submission.title,
        &staged.original_filename,
        duration_secs,
        staged.file_size,
    )?;

    let staged_path = staged.staged_path.to_string_lossy().into_owned();
    state
        .sessions
        .create(session_id, owner_id, &staged_path)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create upload session");
            AppError::Internal(e.to_string())
        })?;

    let payload = IngestJobPayload {
        session_id,
        owner_id,
        staged_path,
        original_filename: staged.original_filename,
        staged_thumbnail_path: staged
            .staged_thumbnail_path
            .map(|p| p.to_string_lossy().into_owned()),
        submission,
    };

    let job_id = state.queue.submit(owner_id, &payload).await.map_err(|e| {
        tracing::error!(error = %e, session_id = %session_id, "Failed to enqueue ingest job");
        AppError::Internal(e.to_string())
    })?;

    tracing::info!(
        job_id = %job_id,
        owner_id = %owner_id,
        file_size = staged.file_size,
        "Video submission accepted"
    );

    Ok(job_id)
}

/// Read the multipart stream, writing the video (and optional thumbnail) to
/// the staging dir and collecting metadata fields. The size limit is
/// enforced while streaming so an oversized body fails before it is fully
/// received.
async fn stage_multipart(
    state: &AppState,
    staging_dir: &Path,
    mut multipart: Multipart,
) -> Result<StagedUpload, HttpAppError> {
    tokio::fs::create_dir_all(staging_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create staging dir: {}", e)))?;

    let max_size = state.config.max_video_size_bytes();
    let mut staged_path: Option<PathBuf> = None;
    let mut staged_thumbnail_path: Option<PathBuf> = None;
    let mut original_filename: Option<String> = None;
    let mut file_size: u64 = 0;
    let mut fields = HashMap::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|f| f.to_string())
                    .ok_or_else(|| AppError::BadRequest("file part needs a filename".into()))?;

                let target = staging_dir.join(format!("source.{}", safe_extension(&filename)));
                let mut out = tokio::fs::File::create(&target)
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to create staged file: {}", e)))?;

                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Upload interrupted: {}", e)))?
                {
                    file_size += chunk.len() as u64;
                    if file_size > max_size {
                        return Err(AppError::PayloadTooLarge(format!(
                            "file exceeds max {} bytes",
                            max_size
                        ))
                        .into());
                    }
                    out.write_all(&chunk)
                        .await
                        .map_err(|e| AppError::Internal(format!("Failed to write staged file: {}", e)))?;
                }
                out.flush()
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to flush staged file: {}", e)))?;

                original_filename = Some(filename);
                staged_path = Some(target);
            }
            "thumbnail" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Upload interrupted: {}", e)))?;
                let target = staging_dir.join("thumbnail.jpg");
                tokio::fs::write(&target, &data)
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to stage thumbnail: {}", e)))?;
                staged_thumbnail_path = Some(target);
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid field {}: {}", name, e)))?;
                fields.insert(name, value);
            }
        }
    }

    let staged_path =
        staged_path.ok_or_else(|| AppError::BadRequest("missing file part".to_string()))?;
    let original_filename = original_filename.unwrap_or_default();

    Ok(StagedUpload {
        staged_path,
        staged_thumbnail_path,
        original_filename,
        file_size,
        fields,
    })
}

/// Extension used for the staged filename. Only alphanumeric extensions are
/// kept; anything else becomes "bin" so form input never shapes paths.
fn safe_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Build the typed submission from multipart text fields. List fields are
/// JSON string arrays; booleans accept "true"/"1"; scheduled_at is RFC 3339.
/// Malformed shapes are rejected here, not deep in the pipeline.
fn submission_from_fields(
    fields: &HashMap<String, String>,
) -> Result<VideoSubmission, HttpAppError> {
    let title = fields.get("title").cloned().unwrap_or_default();
    let mut submission = VideoSubmission::new(title);

    submission.description = fields
        .get("description")
        .filter(|d| !d.trim().is_empty())
        .cloned();
    submission.keywords = parse_string_list("keywords", fields.get("keywords"))?;
    submission.locations = parse_string_list("locations", fields.get("locations"))?;
    submission.brand_tags = parse_string_list("brand_tags", fields.get("brand_tags"))?;
    submission.is_draft = parse_bool(fields.get("is_draft"));
    submission.is_scheduled = parse_bool(fields.get("is_scheduled"));
    submission.age_restricted = parse_bool(fields.get("age_restricted"));
    submission.paid_promotion = parse_bool(fields.get("paid_promotion"));

    if let Some(raw) = fields.get("scheduled_at").filter(|s| !s.trim().is_empty()) {
        let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| {
            HttpAppError(AppError::InvalidInput(
                "scheduled_at must be an RFC 3339 timestamp".to_string(),
            ))
        })?;
        submission.scheduled_at = Some(parsed.with_timezone(&Utc));
    }

    Ok(submission)
}

fn parse_string_list(
    field: &str,
    raw: Option<&String>,
) -> Result<Vec<String>, HttpAppError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(Vec::new());
    };

    serde_json::from_str::<Vec<String>>(raw).map_err(|_| {
        HttpAppError(AppError::InvalidInput(format!(
            "{} must be a JSON array of strings",
            field
        )))
    })
}

fn parse_bool(raw: Option<&String>) -> bool {
    matches!(
        raw.map(|r| r.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1")
    )
}
