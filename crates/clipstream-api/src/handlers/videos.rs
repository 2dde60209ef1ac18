//! Video catalog handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use clipstream_core::models::VideoRecord;
use clipstream_core::AppError;
use clipstream_db::cache::{listing_key, listing_prefix};

use crate::auth::OwnerId;
use crate::error::HttpAppError;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[tracing::instrument(skip(state))]
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    Path(video_id): Path<Uuid>,
) -> Result<Json<VideoRecord>, HttpAppError> {
    let video = state
        .videos
        .get(owner.0, video_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, video_id = %video_id, "Failed to load video");
            AppError::Internal(e.to_string())
        })?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    Ok(Json(video))
}

/// List the owner's published videos, newest first.
///
/// Responses are cached per (owner, limit, offset); the ingest pipeline
/// evicts the owner's prefix when a new video lands, so a hit is never
/// staler than the cache TTL.
#[tracing::instrument(skip(state))]
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
    owner: OwnerId,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let key = listing_key(owner.0, limit, offset);
    if let Some(cached) = state.cache.get(&key).await {
        tracing::debug!(key = %key, "Listing served from cache");
        return Ok(Json(cached));
    }

    let videos = state
        .videos
        .list_by_owner(owner.0, limit, offset)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, owner_id = %owner.0, "Failed to list videos");
            AppError::Internal(e.to_string())
        })?;

    let count = videos.len();
    let body = serde_json::json!({
        "videos": videos,
        "count": count,
    });

    state.cache.put(&key, body.clone()).await;
    tracing::debug!(prefix = %listing_prefix(owner.0), key = %key, "Listing cached");

    Ok(Json(body))
}
