use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use clipstream_core::models::UploadSession;

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a session row. The id is supplied by the caller because it
    /// doubles as the ingest job id.
    #[tracing::instrument(skip(self))]
    pub async fn create(
        &self,
        id: Uuid,
        owner_id: Uuid,
        local_temp_path: &str,
    ) -> Result<UploadSession> {
        let session: UploadSession = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            INSERT INTO upload_sessions (id, owner_id, local_temp_path)
            VALUES ($1, $2, $3)
            RETURNING id, owner_id, remote_endpoint, local_temp_path, cancelled,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(local_temp_path)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create upload session")?;

        tracing::debug!(session_id = %id, owner_id = %owner_id, "Upload session created");

        Ok(session)
    }

    /// Get a session by id. No owner filter; callers that enforce ownership
    /// compare `owner_id` on the returned row so they can distinguish
    /// not-found from forbidden.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, session_id: Uuid) -> Result<Option<UploadSession>> {
        let session: Option<UploadSession> = sqlx::query_as::<Postgres, UploadSession>(
            r#"
            SELECT id, owner_id, remote_endpoint, local_temp_path, cancelled,
                   created_at, updated_at
            FROM upload_sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch upload session")?;

        Ok(session)
    }

    /// Record the remote resumable-upload URL as soon as the session opens,
    /// so an interrupted transfer can be resumed or aborted later.
    #[tracing::instrument(skip(self))]
    pub async fn set_remote_endpoint(&self, session_id: Uuid, endpoint: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upload_sessions
            SET remote_endpoint = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(endpoint)
        .execute(&self.pool)
        .await
        .context("Failed to set remote endpoint")?;

        Ok(())
    }

    /// Clear the staged-file path after cleanup removed the files.
    #[tracing::instrument(skip(self))]
    pub async fn clear_temp_path(&self, session_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upload_sessions
            SET local_temp_path = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .context("Failed to clear temp path")?;

        Ok(())
    }

    /// Request cancellation with a conditional flip. Returns true if this
    /// call set the flag, false if it was already set. Readers observe the
    /// flag through [`is_cancelled`](Self::is_cancelled); there is no
    /// read-modify-write anywhere.
    #[tracing::instrument(skip(self))]
    pub async fn request_cancel(&self, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_sessions
            SET cancelled = TRUE,
                updated_at = NOW()
            WHERE id = $1 AND cancelled = FALSE
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .context("Failed to request cancellation")?;

        let flipped = result.rows_affected() > 0;
        if flipped {
            tracing::info!(session_id = %session_id, "Cancellation requested");
        }

        Ok(flipped)
    }

    /// Fresh read of the cancel flag. The worker calls this before every
    /// chunk and before the catalog commit; never cache the answer.
    #[tracing::instrument(skip(self))]
    pub async fn is_cancelled(&self, session_id: Uuid) -> Result<bool> {
        let cancelled: Option<bool> = sqlx::query_scalar::<Postgres, bool>(
            r#"
            SELECT cancelled FROM upload_sessions WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read cancel flag")?;

        // A missing row means the session was never created; treat as not
        // cancelled and let the pipeline fail on the missing staged file.
        Ok(cancelled.unwrap_or(false))
    }
}
