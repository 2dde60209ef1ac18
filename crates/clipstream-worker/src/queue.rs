//! Job queue: worker pool, LISTEN/NOTIFY or polling, retry, and submission.
//!
//! Shutdown: [`JobQueue::shutdown`] signals the pool to stop; it does not
//! wait for in-flight jobs. For graceful shutdown, coordinate with your
//! runtime and allow time for running jobs to finish before process exit.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{interval, sleep};
use uuid::Uuid;

use clipstream_core::models::{IngestJob, IngestJobPayload, JobKind};
use clipstream_core::{Config, JobError};
use clipstream_db::{JobRepository, JOB_NOTIFY_CHANNEL};

use crate::context::JobHandlerContext;

/// Maximum delay in seconds before retrying a failed job. Caps exponential
/// backoff so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given retry count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    (2_u64.pow(retry_count as u32)).min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone)]
pub struct JobQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub default_timeout_seconds: i32,
    pub max_retries: i32,
    /// Terminal jobs older than this are deleted by the hourly sweep.
    pub retention_days: i32,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            default_timeout_seconds: 3600,
            max_retries: 3,
            retention_days: 30,
        }
    }
}

impl JobQueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.job_queue_max_workers(),
            poll_interval_ms: config.job_queue_poll_interval_ms(),
            default_timeout_seconds: config.job_queue_default_timeout_seconds(),
            max_retries: config.job_queue_max_retries(),
            retention_days: config.job_retention_days(),
        }
    }
}

pub struct JobQueue {
    repository: JobRepository,
    config: JobQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobQueue {
    /// Create a new JobQueue with a weak reference to the dispatch context.
    ///
    /// If `pool` is `Some`, the worker uses PostgreSQL LISTEN/NOTIFY to wake
    /// immediately when jobs are enqueued, in addition to polling at
    /// `poll_interval_ms`. If `pool` is `None`, only polling is used.
    pub fn new(
        repository: JobRepository,
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let repo_clone = repository.clone();
        let config_clone = config.clone();

        tokio::spawn(async move {
            Self::worker_pool(repo_clone, config_clone, context, shutdown_rx, pool).await;
        });

        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    /// Submit a new ingest job to the queue. The session id in the payload
    /// becomes the job id, so one handle covers both.
    #[tracing::instrument(skip(self, payload))]
    pub async fn submit(&self, owner_id: Uuid, payload: &IngestJobPayload) -> Result<Uuid> {
        let job = self
            .repository
            .enqueue(
                payload.session_id,
                owner_id,
                JobKind::VideoIngest,
                IngestJob::payload_from(payload),
                self.config.max_retries,
                Some(self.config.default_timeout_seconds),
            )
            .await
            .context("Failed to enqueue job")?;

        tracing::info!(
            job_id = %job.id,
            owner_id = %owner_id,
            "Job submitted to queue"
        );

        Ok(job.id)
    }

    async fn worker_pool(
        repository: JobRepository,
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Job queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY
        // (avoids blocking on recv when no pool is configured).
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(JOB_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Hourly sweep of terminal jobs past the retention window.
        {
            let repo = repository.clone();
            let retention_days = config.retention_days;
            tokio::spawn(async move {
                let mut sweep_interval = interval(Duration::from_secs(3600));
                loop {
                    sweep_interval.tick().await;
                    match repo.delete_old_finished(retention_days).await {
                        Ok(0) => {}
                        Ok(deleted) => {
                            tracing::info!(deleted, retention_days, "Deleted old finished jobs");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to clean up old finished jobs");
                        }
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job queue worker pool shutting down");
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&repository, &semaphore, &context).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&repository, &semaphore, &context).await;
                }
            }
        }

        tracing::info!("Job queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        repository: &JobRepository,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn JobHandlerContext>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match repository.claim_next().await {
            Ok(Some(job)) => {
                let repo = repository.clone();
                let ctx = context.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_job(job, repo, ctx).await {
                        tracing::error!(error = %e, "Job processing failed after retries");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim job from queue");
            }
        }
    }

    #[tracing::instrument(skip(repository, context), fields(job.id = %job.id, job.kind = %job.kind))]
    async fn process_job(
        job: IngestJob,
        repository: JobRepository,
        context: Weak<dyn JobHandlerContext>,
    ) -> Result<()> {
        let ctx = context
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("JobHandlerContext was dropped, cannot process job"))?;

        let timeout_duration = job
            .timeout_seconds
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(Duration::from_secs(3600));

        let result = tokio::time::timeout(timeout_duration, ctx.dispatch_job(&job)).await;

        match result {
            Ok(Ok(job_result)) => {
                repository
                    .mark_succeeded(job.id, job_result)
                    .await
                    .context("Failed to mark job as succeeded")?;
                tracing::info!(job_id = %job.id, kind = %job.kind, "Job completed successfully");
                Ok(())
            }
            Ok(Err(e)) => Self::settle_failure(job, e, &repository).await,
            Err(_) => {
                tracing::error!(
                    job_id = %job.id,
                    timeout_seconds = ?job.timeout_seconds,
                    "Job execution timed out"
                );
                if job.can_retry() {
                    let backoff_seconds = compute_retry_backoff_seconds(job.retry_count);
                    let next_attempt =
                        Utc::now() + chrono::Duration::seconds(backoff_seconds as i64);
                    repository.increment_retry(job.id, next_attempt).await?;
                    Ok(())
                } else {
                    repository
                        .mark_failed(job.id, "job execution timed out")
                        .await?;
                    Err(anyhow::anyhow!("Job execution timed out"))
                }
            }
        }
    }

    /// Settle a failed dispatch. Cancellation and terminal errors never
    /// retry; recoverable errors retry with exponential backoff until the
    /// retry budget runs out.
    async fn settle_failure(
        job: IngestJob,
        error: anyhow::Error,
        repository: &JobRepository,
    ) -> Result<()> {
        let (is_cancelled, is_recoverable) = match error.downcast_ref::<JobError>() {
            Some(je) => (je.is_cancelled(), je.is_recoverable()),
            // Untyped errors default to recoverable, matching JobError's
            // From<anyhow::Error>.
            None => (false, true),
        };

        if is_cancelled {
            repository
                .mark_cancelled(job.id)
                .await
                .context("Failed to mark job as cancelled")?;
            tracing::info!(job_id = %job.id, "Job cancelled by owner");
            return Ok(());
        }

        tracing::error!(
            job_id = %job.id,
            error = %error,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            recoverable = is_recoverable,
            "Job execution failed"
        );

        if !is_recoverable {
            repository
                .mark_failed(job.id, &error.to_string())
                .await
                .context("Failed to mark job as failed")?;
            return Err(error);
        }

        if job.can_retry() {
            let backoff_seconds = compute_retry_backoff_seconds(job.retry_count);
            tracing::info!(
                job_id = %job.id,
                retry_count = job.retry_count + 1,
                backoff_seconds = backoff_seconds,
                "Scheduling job retry"
            );
            let next_attempt = Utc::now() + chrono::Duration::seconds(backoff_seconds as i64);
            repository.increment_retry(job.id, next_attempt).await?;
            Ok(())
        } else {
            repository
                .mark_failed(job.id, &error.to_string())
                .await
                .context("Failed to mark job as failed")?;
            tracing::error!(job_id = %job.id, "Job failed after max retries");
            Err(error)
        }
    }

    /// Signals the worker pool to stop claiming new jobs and exit the main
    /// loop. Returns immediately; already-spawned handlers continue running
    /// until they complete or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for JobQueue {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}
