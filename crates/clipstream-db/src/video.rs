use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use clipstream_core::models::{VideoRecord, VideoSubmission};

#[derive(Clone)]
pub struct VideoRepository {
    pool: PgPool,
}

impl VideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Commit a video to the catalog. Single atomic insert; this is the only
    /// externally visible effect of a successful ingest, so there is never a
    /// partially-populated row.
    #[tracing::instrument(skip(self, submission))]
    pub async fn insert(
        &self,
        owner_id: Uuid,
        uid: &str,
        submission: &VideoSubmission,
        playback_url: &str,
        thumbnail_url: &str,
        duration_secs: Option<i64>,
    ) -> Result<VideoRecord> {
        let video: VideoRecord = sqlx::query_as::<Postgres, VideoRecord>(
            r#"
            INSERT INTO videos (
                owner_id, uid, title, description, playback_url, thumbnail_url,
                duration_secs, keywords, locations, brand_tags,
                is_draft, is_scheduled, scheduled_at, age_restricted, paid_promotion
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING
                id, owner_id, uid, title, description, playback_url, thumbnail_url,
                duration_secs, keywords, locations, brand_tags,
                is_draft, is_scheduled, scheduled_at, age_restricted, paid_promotion,
                created_at
            "#,
        )
        .bind(owner_id)
        .bind(uid)
        .bind(&submission.title)
        .bind(&submission.description)
        .bind(playback_url)
        .bind(thumbnail_url)
        .bind(duration_secs)
        .bind(&submission.keywords)
        .bind(&submission.locations)
        .bind(&submission.brand_tags)
        .bind(submission.is_draft)
        .bind(submission.is_scheduled)
        .bind(submission.scheduled_at)
        .bind(submission.age_restricted)
        .bind(submission.paid_promotion)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert video into catalog")?;

        tracing::info!(
            video_id = %video.id,
            owner_id = %owner_id,
            uid = uid,
            "Video committed to catalog"
        );

        Ok(video)
    }

    /// Get a catalog row by id with owner check.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, owner_id: Uuid, video_id: Uuid) -> Result<Option<VideoRecord>> {
        let video: Option<VideoRecord> = sqlx::query_as::<Postgres, VideoRecord>(
            r#"
            SELECT
                id, owner_id, uid, title, description, playback_url, thumbnail_url,
                duration_secs, keywords, locations, brand_tags,
                is_draft, is_scheduled, scheduled_at, age_restricted, paid_promotion,
                created_at
            FROM videos
            WHERE owner_id = $1 AND id = $2
            "#,
        )
        .bind(owner_id)
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch video")?;

        Ok(video)
    }

    /// List an owner's videos, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_owner(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<VideoRecord>> {
        let limit = limit.clamp(1, 100);

        let videos: Vec<VideoRecord> = sqlx::query_as::<Postgres, VideoRecord>(
            r#"
            SELECT
                id, owner_id, uid, title, description, playback_url, thumbnail_url,
                duration_secs, keywords, locations, brand_tags,
                is_draft, is_scheduled, scheduled_at, age_restricted, paid_promotion,
                created_at
            FROM videos
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list videos")?;

        Ok(videos)
    }
}
