//! Video ingest pipeline
//!
//! Runs the claimed job end to end: re-verify the staged input, transcode,
//! resumable upload with cooperative cancellation, detail fetch with
//! fallback, optional thumbnail, atomic catalog commit, cache eviction, and
//! cleanup on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

use clipstream_core::models::{IngestJobPayload, IngestOutcome, VideoRecord, VideoSubmission};
use clipstream_core::JobError;
use clipstream_db::cache::{listing_prefix, ListingCache};
use clipstream_db::{SessionRepository, VideoRepository};
use clipstream_origin::{CancelProbe, MediaOrigin, UploadError, VideoDetails};
use clipstream_processing::TranscodeStep;

/// Session state the pipeline needs while a job runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn set_remote_endpoint(&self, session_id: Uuid, endpoint: &str) -> Result<()>;
    async fn clear_temp_path(&self, session_id: Uuid) -> Result<()>;
    /// Fresh read of the cancel flag; never cached.
    async fn is_cancelled(&self, session_id: Uuid) -> Result<bool>;
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn set_remote_endpoint(&self, session_id: Uuid, endpoint: &str) -> Result<()> {
        SessionRepository::set_remote_endpoint(self, session_id, endpoint).await
    }

    async fn clear_temp_path(&self, session_id: Uuid) -> Result<()> {
        SessionRepository::clear_temp_path(self, session_id).await
    }

    async fn is_cancelled(&self, session_id: Uuid) -> Result<bool> {
        SessionRepository::is_cancelled(self, session_id).await
    }
}

/// The single externally visible effect of a successful ingest.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn commit(
        &self,
        owner_id: Uuid,
        uid: &str,
        submission: &VideoSubmission,
        playback_url: &str,
        thumbnail_url: &str,
        duration_secs: Option<i64>,
    ) -> Result<VideoRecord>;
}

#[async_trait]
impl VideoCatalog for VideoRepository {
    async fn commit(
        &self,
        owner_id: Uuid,
        uid: &str,
        submission: &VideoSubmission,
        playback_url: &str,
        thumbnail_url: &str,
        duration_secs: Option<i64>,
    ) -> Result<VideoRecord> {
        self.insert(
            owner_id,
            uid,
            submission,
            playback_url,
            thumbnail_url,
            duration_secs,
        )
        .await
    }
}

/// Cancel probe backed by the session row. Each call is a fresh database
/// read, so a cancellation request lands within one chunk of work.
struct SessionCancelProbe {
    sessions: Arc<dyn SessionStore>,
    session_id: Uuid,
}

#[async_trait]
impl CancelProbe for SessionCancelProbe {
    async fn is_cancelled(&self) -> Result<bool> {
        self.sessions.is_cancelled(self.session_id).await
    }
}

pub struct IngestPipeline {
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn VideoCatalog>,
    cache: Arc<dyn ListingCache>,
    transcoder: Arc<dyn TranscodeStep>,
    origin: Arc<dyn MediaOrigin>,
}

impl IngestPipeline {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn VideoCatalog>,
        cache: Arc<dyn ListingCache>,
        transcoder: Arc<dyn TranscodeStep>,
        origin: Arc<dyn MediaOrigin>,
    ) -> Self {
        Self {
            sessions,
            catalog,
            cache,
            transcoder,
            origin,
        }
    }

    /// Run the full pipeline for one job. Staging files are removed on every
    /// exit path, including cancellation.
    #[tracing::instrument(skip(self, payload), fields(session_id = %payload.session_id))]
    pub async fn run(&self, payload: &IngestJobPayload) -> Result<IngestOutcome, JobError> {
        let staged = PathBuf::from(&payload.staged_path);
        let transcoded = transcoded_path(&staged);

        let result = self.execute(payload, &staged, &transcoded).await;

        self.cleanup(payload, &staged, &transcoded).await;

        result
    }

    async fn execute(
        &self,
        payload: &IngestJobPayload,
        staged: &Path,
        transcoded: &Path,
    ) -> Result<IngestOutcome, JobError> {
        let session_id = payload.session_id;
        let probe = SessionCancelProbe {
            sessions: self.sessions.clone(),
            session_id,
        };

        // The staged file was validated at submission time; a retried job
        // may find it gone after a previous attempt's cleanup.
        if tokio::fs::metadata(staged).await.is_err() {
            return Err(JobError::terminal(anyhow::anyhow!(
                "staged input {} no longer exists",
                staged.display()
            )));
        }

        if self.check_cancelled(&probe).await? {
            return Err(JobError::cancelled());
        }

        self.transcoder
            .transcode(staged, transcoded)
            .await
            .map_err(|e| JobError::terminal(anyhow::Error::new(e)))?;

        let file_size = tokio::fs::metadata(transcoded)
            .await
            .map(|m| m.len())
            .context("Failed to stat transcoded output")
            .map_err(JobError::terminal)?;

        let session_url = self
            .origin
            .open_session(file_size, &payload.original_filename)
            .await
            .map_err(map_upload_error)?;

        // Persist the session URL before any byte moves, so an interrupted
        // transfer can still be aborted or resumed.
        if let Err(e) = self
            .sessions
            .set_remote_endpoint(session_id, &session_url)
            .await
        {
            tracing::warn!(
                session_id = %session_id,
                error = %e,
                "Failed to persist remote endpoint"
            );
        }

        let uid = self
            .origin
            .upload(&session_url, transcoded, &probe)
            .await
            .map_err(map_upload_error)?;

        tracing::info!(session_id = %session_id, uid = uid, "Upload complete");

        // The upload already succeeded, so a failed detail fetch degrades to
        // synthesized URLs instead of failing the job.
        let details = match self.origin.fetch_details(&uid).await {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(
                    uid = uid,
                    error = %e,
                    "Detail fetch failed, using fallback URLs"
                );
                VideoDetails::default()
            }
        };

        let playback_url = details
            .playback_url
            .unwrap_or_else(|| self.origin.fallback_playback_url(&uid));
        let mut thumbnail_url = details
            .thumbnail_url
            .unwrap_or_else(|| self.origin.fallback_thumbnail_url(&uid));

        // Best-effort custom thumbnail; the fallback URL already points at
        // the origin-generated frame.
        if let Some(ref thumb_path) = payload.staged_thumbnail_path {
            match self
                .origin
                .upload_thumbnail(&uid, Path::new(thumb_path))
                .await
            {
                Ok(url) => thumbnail_url = url,
                Err(e) => {
                    tracing::warn!(
                        uid = uid,
                        error = %e,
                        "Thumbnail upload failed, keeping origin thumbnail"
                    );
                }
            }
        }

        // Last cancellation window: after this check the commit goes through.
        if self.check_cancelled(&probe).await? {
            return Err(JobError::cancelled());
        }

        let duration_secs = details.duration_secs.map(|d| d.round() as i64);

        let video = self
            .catalog
            .commit(
                payload.owner_id,
                &uid,
                &payload.submission,
                &playback_url,
                &thumbnail_url,
                duration_secs,
            )
            .await
            .map_err(|e| {
                // The remote object exists but the catalog row does not;
                // operators reconcile by uid.
                tracing::error!(
                    session_id = %session_id,
                    uid = uid,
                    error = %e,
                    "Catalog commit failed, remote object orphaned"
                );
                JobError::terminal(e)
            })?;

        self.cache
            .invalidate_prefix(&listing_prefix(payload.owner_id))
            .await;

        Ok(IngestOutcome {
            video_id: video.id,
            remote_uid: uid,
            playback_url,
            thumbnail_url,
            duration_secs,
        })
    }

    async fn check_cancelled(&self, probe: &SessionCancelProbe) -> Result<bool, JobError> {
        probe
            .is_cancelled()
            .await
            .context("Failed to read cancel flag")
            .map_err(JobError::recoverable)
    }

    /// Remove staging files and clear the session's temp path. Failures are
    /// logged, never surfaced; cleanup must not change the job outcome.
    async fn cleanup(&self, payload: &IngestJobPayload, staged: &Path, transcoded: &Path) {
        for path in [staged, transcoded] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove staging file");
                }
            }
        }

        if let Some(ref thumb) = payload.staged_thumbnail_path {
            if let Err(e) = tokio::fs::remove_file(thumb).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = thumb, error = %e, "Failed to remove staged thumbnail");
                }
            }
        }

        if let Err(e) = self.sessions.clear_temp_path(payload.session_id).await {
            tracing::warn!(
                session_id = %payload.session_id,
                error = %e,
                "Failed to clear session temp path"
            );
        }
    }
}

/// Staging path for the transcoded intermediate, next to the source.
fn transcoded_path(staged: &Path) -> PathBuf {
    let stem = staged
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("source");
    staged.with_file_name(format!("{stem}.transcoded.mp4"))
}

/// Map upload failures onto the queue's retry taxonomy. Exhausted retries
/// are terminal (the client already retried internally); cancellation is the
/// distinguished outcome; anything else gets a job-level retry.
fn map_upload_error(err: UploadError) -> JobError {
    match err {
        UploadError::Cancelled => JobError::cancelled(),
        err @ UploadError::RetriesExhausted { .. } => JobError::terminal(anyhow::Error::new(err)),
        err => JobError::recoverable(anyhow::Error::new(err)),
    }
}
