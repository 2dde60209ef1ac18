use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use clipstream_core::models::{IngestJob, JobKind, CANCELLED_BY_USER};

/// Channel workers LISTEN on; notified inside the enqueue transaction so a
/// worker wakes immediately instead of waiting for the next poll tick.
pub const JOB_NOTIFY_CHANNEL: &str = "clipstream_new_job";

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a new job. The id is supplied by the caller because it
    /// doubles as the upload session id, which clients use to poll status
    /// and request cancellation.
    #[tracing::instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        id: Uuid,
        owner_id: Uuid,
        kind: JobKind,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<IngestJob> {
        // Insert and notify inside one transaction so workers never see a
        // notification for a job that failed to commit.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for job enqueue")?;

        let job: IngestJob = sqlx::query_as::<Postgres, IngestJob>(
            r#"
            INSERT INTO ingest_jobs (
                id, owner_id, kind, state, payload, scheduled_at, max_retries, timeout_seconds
            )
            VALUES ($1, $2, $3, 'pending', $4, NOW(), $5, $6)
            RETURNING
                id,
                owner_id,
                kind,
                state,
                payload,
                result,
                error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(kind.to_string())
        .bind(payload)
        .bind(max_retries)
        .bind(timeout_seconds)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert job")?;

        // Non-fatal: workers fall back to the poll interval if LISTEN/NOTIFY
        // is unavailable.
        if let Err(e) = sqlx::query(&format!("SELECT pg_notify('{}', '')", JOB_NOTIFY_CHANNEL))
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                job_id = %job.id,
                "Failed to send pg_notify for new job, workers will discover it via polling"
            );
        }

        tx.commit()
            .await
            .context("Failed to commit job enqueue transaction")?;

        tracing::info!(
            job_id = %job.id,
            owner_id = %owner_id,
            kind = %job.kind,
            "Job enqueued"
        );

        Ok(job)
    }

    /// Get a job by id with owner check. Used by the status/cancel handlers.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, owner_id: Uuid, job_id: Uuid) -> Result<Option<IngestJob>> {
        let job: Option<IngestJob> = sqlx::query_as::<Postgres, IngestJob>(
            r#"
            SELECT
                id,
                owner_id,
                kind,
                state,
                payload,
                result,
                error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            FROM ingest_jobs
            WHERE owner_id = $1 AND id = $2
            "#,
        )
        .bind(owner_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job")?;

        Ok(job)
    }

    /// Atomically claim the next runnable job and flip it to running.
    ///
    /// FOR UPDATE SKIP LOCKED lets concurrent workers claim distinct rows
    /// without blocking each other.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next(&self) -> Result<Option<IngestJob>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin claim transaction")?;

        let job: Option<IngestJob> = sqlx::query_as::<Postgres, IngestJob>(
            r#"
            SELECT
                id,
                owner_id,
                kind,
                state,
                payload,
                result,
                error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            FROM ingest_jobs
            WHERE state = 'pending'
                AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next job")?;

        if let Some(job) = job {
            let claimed: IngestJob = sqlx::query_as::<Postgres, IngestJob>(
                r#"
                UPDATE ingest_jobs
                SET state = 'running',
                    started_at = NOW(),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING
                    id,
                    owner_id,
                    kind,
                    state,
                    payload,
                    result,
                    error,
                    scheduled_at,
                    started_at,
                    completed_at,
                    retry_count,
                    max_retries,
                    timeout_seconds,
                    created_at,
                    updated_at
                "#,
            )
            .bind(job.id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to flip claimed job to running")?;

            tx.commit().await.context("Failed to commit job claim")?;

            tracing::debug!(
                job_id = %claimed.id,
                owner_id = %claimed.owner_id,
                kind = %claimed.kind,
                "Job claimed"
            );

            Ok(Some(claimed))
        } else {
            tx.rollback().await.ok();
            Ok(None)
        }
    }

    /// Mark a job succeeded with its result payload.
    #[tracing::instrument(skip(self, result))]
    pub async fn mark_succeeded(&self, job_id: Uuid, result: serde_json::Value) -> Result<IngestJob> {
        let job: IngestJob = sqlx::query_as::<Postgres, IngestJob>(
            r#"
            UPDATE ingest_jobs
            SET state = 'succeeded',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id,
                owner_id,
                kind,
                state,
                payload,
                result,
                error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(job_id)
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job as succeeded")?;

        tracing::info!(
            job_id = %job_id,
            owner_id = %job.owner_id,
            "Job succeeded"
        );

        Ok(job)
    }

    /// Mark a job failed with an error message.
    #[tracing::instrument(skip(self, error))]
    pub async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<IngestJob> {
        let job: IngestJob = sqlx::query_as::<Postgres, IngestJob>(
            r#"
            UPDATE ingest_jobs
            SET state = 'failed',
                error = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id,
                owner_id,
                kind,
                state,
                payload,
                result,
                error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(job_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job as failed")?;

        tracing::error!(
            job_id = %job_id,
            owner_id = %job.owner_id,
            retry_count = job.retry_count,
            error = error,
            "Job failed"
        );

        Ok(job)
    }

    /// Mark a job cancelled. Stores the cancellation sentinel so older
    /// readers that only look at `error` still see why the job stopped.
    #[tracing::instrument(skip(self))]
    pub async fn mark_cancelled(&self, job_id: Uuid) -> Result<IngestJob> {
        let job: IngestJob = sqlx::query_as::<Postgres, IngestJob>(
            r#"
            UPDATE ingest_jobs
            SET state = 'cancelled',
                error = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id,
                owner_id,
                kind,
                state,
                payload,
                result,
                error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(job_id)
        .bind(CANCELLED_BY_USER)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job as cancelled")?;

        tracing::info!(
            job_id = %job_id,
            owner_id = %job.owner_id,
            "Job cancelled"
        );

        Ok(job)
    }

    /// Reschedule a recoverable failure: bump the retry count, reset to
    /// pending, and push `scheduled_at` out for backoff.
    #[tracing::instrument(skip(self))]
    pub async fn increment_retry(
        &self,
        job_id: Uuid,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<IngestJob> {
        let job: IngestJob = sqlx::query_as::<Postgres, IngestJob>(
            r#"
            UPDATE ingest_jobs
            SET state = 'pending',
                retry_count = retry_count + 1,
                started_at = NULL,
                scheduled_at = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id,
                owner_id,
                kind,
                state,
                payload,
                result,
                error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(job_id)
        .bind(next_attempt_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to increment retry count")?;

        tracing::info!(
            job_id = %job_id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "Job retry scheduled"
        );

        Ok(job)
    }

    /// Cancel a job that has not started yet. Returns None if the job is
    /// already running or terminal; running jobs are cancelled cooperatively
    /// through the session flag instead.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_if_pending(&self, owner_id: Uuid, job_id: Uuid) -> Result<Option<IngestJob>> {
        let job: Option<IngestJob> = sqlx::query_as::<Postgres, IngestJob>(
            r#"
            UPDATE ingest_jobs
            SET state = 'cancelled',
                error = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE owner_id = $1
                AND id = $2
                AND state = 'pending'
            RETURNING
                id,
                owner_id,
                kind,
                state,
                payload,
                result,
                error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(owner_id)
        .bind(job_id)
        .bind(CANCELLED_BY_USER)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to cancel pending job")?;

        if let Some(ref job) = job {
            tracing::info!(
                job_id = %job.id,
                owner_id = %owner_id,
                "Pending job cancelled before it started"
            );
        }

        Ok(job)
    }

    /// Delete terminal jobs older than the given number of days. Returns
    /// the number of rows deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_old_finished(&self, older_than_days: i32) -> Result<u64> {
        use sqlx::Row;

        let result = sqlx::query(
            r#"
            WITH deleted AS (
                DELETE FROM ingest_jobs
                WHERE state IN ('succeeded', 'failed', 'cancelled')
                    AND COALESCE(completed_at, updated_at) < NOW() - ($1 * interval '1 day')
                RETURNING id
            )
            SELECT COUNT(*)::bigint FROM deleted
            "#,
        )
        .bind(older_than_days)
        .fetch_one(&self.pool)
        .await
        .context("Failed to delete old finished jobs")?;

        let count: i64 = result.get(0);
        let count = count.max(0) as u64;

        if count > 0 {
            tracing::info!(
                count = count,
                older_than_days = older_than_days,
                "Deleted old finished jobs"
            );
        }

        Ok(count)
    }
}
