//! Ingest pipeline tests against in-memory fakes.
//!
//! Covers the externally observable contract: cancellation never commits,
//! terminal failures clean up, degraded detail fetches fall back, thumbnail
//! failures stay non-fatal, and success commits exactly once.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use clipstream_core::models::{IngestJobPayload, VideoRecord, VideoSubmission};
use clipstream_db::ListingCache;
use clipstream_origin::{CancelProbe, MediaOrigin, UploadError, VideoDetails};
use clipstream_processing::{TranscodeError, TranscodeStep};
use clipstream_worker::{IngestPipeline, SessionStore, VideoCatalog};

#[derive(Default)]
struct FakeSessionStore {
    cancelled: AtomicBool,
    endpoint: Mutex<Option<String>>,
    temp_cleared: AtomicBool,
}

#[async_trait]
impl SessionStore for FakeSessionStore {
    async fn set_remote_endpoint(&self, _session_id: Uuid, endpoint: &str) -> Result<()> {
        *self.endpoint.lock().unwrap() = Some(endpoint.to_string());
        Ok(())
    }

    async fn clear_temp_path(&self, _session_id: Uuid) -> Result<()> {
        self.temp_cleared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_cancelled(&self, _session_id: Uuid) -> Result<bool> {
        Ok(self.cancelled.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
struct Commit {
    uid: String,
    playback_url: String,
    thumbnail_url: String,
    duration_secs: Option<i64>,
}

#[derive(Default)]
struct FakeCatalog {
    commits: Mutex<Vec<Commit>>,
    fail: bool,
}

#[async_trait]
impl VideoCatalog for FakeCatalog {
    async fn commit(
        &self,
        owner_id: Uuid,
        uid: &str,
        submission: &VideoSubmission,
        playback_url: &str,
        thumbnail_url: &str,
        duration_secs: Option<i64>,
    ) -> Result<VideoRecord> {
        if self.fail {
            anyhow::bail!("catalog unavailable");
        }

        self.commits.lock().unwrap().push(Commit {
            uid: uid.to_string(),
            playback_url: playback_url.to_string(),
            thumbnail_url: thumbnail_url.to_string(),
            duration_secs,
        });

        Ok(VideoRecord {
            id: Uuid::new_v4(),
            owner_id,
            uid: uid.to_string(),
            title: submission.title.clone(),
            description: submission.description.clone(),
            playback_url: playback_url.to_string(),
            thumbnail_url: thumbnail_url.to_string(),
            duration_secs,
            keywords: submission.keywords.clone(),
            locations: submission.locations.clone(),
            brand_tags: submission.brand_tags.clone(),
            is_draft: submission.is_draft,
            is_scheduled: submission.is_scheduled,
            scheduled_at: submission.scheduled_at,
            age_restricted: submission.age_restricted,
            paid_promotion: submission.paid_promotion,
            created_at: Utc::now(),
        })
    }
}

#[derive(Default)]
struct CountingCache {
    invalidations: AtomicUsize,
}

#[async_trait]
impl ListingCache for CountingCache {
    async fn get(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }

    async fn put(&self, _key: &str, _value: serde_json::Value) {}

    async fn invalidate_prefix(&self, _prefix: &str) -> usize {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        0
    }
}

/// Stand-in transcode: copies input to output.
struct CopyTranscoder;

#[async_trait]
impl TranscodeStep for CopyTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        tokio::fs::copy(input, output)
            .await
            .map_err(|e| TranscodeError::Spawn(e.into()))?;
        Ok(())
    }
}

struct FailingTranscoder;

#[async_trait]
impl TranscodeStep for FailingTranscoder {
    async fn transcode(&self, _input: &Path, _output: &Path) -> Result<(), TranscodeError> {
        Err(TranscodeError::Failed {
            exit_code: 1,
            stderr: "Invalid data found when processing input".to_string(),
        })
    }
}

struct FakeOrigin {
    uid: String,
    /// None makes the detail fetch fail, exercising URL fallback.
    details: Option<VideoDetails>,
    fail_thumbnail: bool,
    uploads: AtomicUsize,
}

impl FakeOrigin {
    fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            details: Some(VideoDetails {
                playback_url: Some(format!("https://origin.example/hls/{uid}.m3u8")),
                thumbnail_url: Some(format!("https://origin.example/thumbs/{uid}.jpg")),
                duration_secs: Some(93.4),
            }),
            fail_thumbnail: false,
            uploads: AtomicUsize::new(0),
        }
    }

    fn without_details(mut self) -> Self {
        self.details = None;
        self
    }

    fn failing_thumbnail(mut self) -> Self {
        self.fail_thumbnail = true;
        self
    }
}

#[async_trait]
impl MediaOrigin for FakeOrigin {
    async fn open_session(&self, _file_size: u64, _filename: &str) -> Result<String, UploadError> {
        Ok(format!("https://origin.example/videos/uploads/{}", self.uid))
    }

    async fn upload(
        &self,
        _session_url: &str,
        path: &Path,
        cancel: &dyn CancelProbe,
    ) -> Result<String, UploadError> {
        if cancel.is_cancelled().await.unwrap_or(false) {
            return Err(UploadError::Cancelled);
        }
        // The transcoded intermediate must exist when the transfer starts.
        tokio::fs::metadata(path).await?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(self.uid.clone())
    }

    async fn fetch_details(&self, _uid: &str) -> Result<VideoDetails, UploadError> {
        match &self.details {
            Some(details) => Ok(details.clone()),
            None => Err(UploadError::Protocol {
                status: 502,
                message: "details unavailable".to_string(),
            }),
        }
    }

    async fn upload_thumbnail(&self, uid: &str, _path: &Path) -> Result<String, UploadError> {
        if self.fail_thumbnail {
            return Err(UploadError::Protocol {
                status: 500,
                message: "image service down".to_string(),
            });
        }
        Ok(format!("https://origin.example/custom-thumbs/{uid}.jpg"))
    }

    async fn abort_session(&self, _session_url: &str) -> Result<(), UploadError> {
        Ok(())
    }

    fn fallback_playback_url(&self, uid: &str) -> String {
        format!("https://origin.example/delivery/{uid}/watch")
    }

    fn fallback_thumbnail_url(&self, uid: &str) -> String {
        format!("https://origin.example/delivery/{uid}/thumbnails/thumbnail.jpg")
    }
}

struct Harness {
    sessions: Arc<FakeSessionStore>,
    catalog: Arc<FakeCatalog>,
    cache: Arc<CountingCache>,
    origin: Arc<FakeOrigin>,
    pipeline: IngestPipeline,
    // Keeps the staging dir alive for the test's duration.
    staging: tempfile::TempDir,
    payload: IngestJobPayload,
}

fn harness_with(origin: FakeOrigin, transcoder: Arc<dyn TranscodeStep>, catalog: FakeCatalog) -> Harness {
    let staging = tempfile::tempdir().expect("create staging dir");
    let staged_path = staging.path().join("source.mp4");
    let mut file = std::fs::File::create(&staged_path).expect("create staged file");
    file.write_all(&[0u8; 4096]).expect("write staged file");

    let sessions = Arc::new(FakeSessionStore::default());
    let catalog = Arc::new(catalog);
    let cache = Arc::new(CountingCache::default());
    let origin = Arc::new(origin);

    let pipeline = IngestPipeline::new(
        sessions.clone(),
        catalog.clone(),
        cache.clone(),
        transcoder,
        origin.clone(),
    );

    let session_id = Uuid::new_v4();
    let payload = IngestJobPayload {
        session_id,
        owner_id: Uuid::new_v4(),
        staged_path: staged_path.to_string_lossy().into_owned(),
        original_filename: "clip.mp4".to_string(),
        staged_thumbnail_path: None,
        submission: VideoSubmission::new("My clip".to_string()),
    };

    Harness {
        sessions,
        catalog,
        cache,
        origin,
        pipeline,
        staging,
        payload,
    }
}

fn harness(origin: FakeOrigin) -> Harness {
    harness_with(origin, Arc::new(CopyTranscoder), FakeCatalog::default())
}

#[tokio::test]
async fn successful_ingest_commits_once_and_cleans_up() {
    let h = harness(FakeOrigin::new("vid42"));

    let outcome = h.pipeline.run(&h.payload).await.expect("pipeline succeeds");

    // The uid returned by the upload is the uid committed to the catalog.
    let commits = h.catalog.commits.lock().unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].uid, "vid42");
    assert_eq!(outcome.remote_uid, "vid42");
    assert_eq!(commits[0].duration_secs, Some(93));
    assert_eq!(outcome.playback_url, "https://origin.example/hls/vid42.m3u8");

    // Listing caches evicted exactly once.
    assert_eq!(h.cache.invalidations.load(Ordering::SeqCst), 1);

    // Staging files removed, session temp path cleared, endpoint persisted.
    assert!(!PathBuf::from(&h.payload.staged_path).exists());
    assert!(h.sessions.temp_cleared.load(Ordering::SeqCst));
    assert!(h.sessions.endpoint.lock().unwrap().is_some());
}

#[tokio::test]
async fn cancellation_before_work_never_commits() {
    let h = harness(FakeOrigin::new("vid42"));
    h.sessions.cancelled.store(true, Ordering::SeqCst);

    let err = h.pipeline.run(&h.payload).await.unwrap_err();

    assert!(err.is_cancelled(), "expected cancelled outcome, got {err}");
    assert!(h.catalog.commits.lock().unwrap().is_empty());
    assert_eq!(h.origin.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(h.cache.invalidations.load(Ordering::SeqCst), 0);
    // Cleanup still ran.
    assert!(!PathBuf::from(&h.payload.staged_path).exists());
    assert!(h.sessions.temp_cleared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancellation_during_upload_is_cancelled_not_failed() {
    // FakeOrigin's upload consults the probe the way the real client does
    // before each chunk.
    let h = harness(FakeOrigin::new("vid42"));

    // Flag set after the pipeline starts would race; setting before the
    // upload begins exercises the same probe path.
    h.sessions.cancelled.store(true, Ordering::SeqCst);

    let err = h.pipeline.run(&h.payload).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn transcode_failure_is_terminal_and_cleans_up() {
    let h = harness_with(
        FakeOrigin::new("vid42"),
        Arc::new(FailingTranscoder),
        FakeCatalog::default(),
    );

    let err = h.pipeline.run(&h.payload).await.unwrap_err();

    assert!(!err.is_recoverable());
    assert!(!err.is_cancelled());
    assert_eq!(h.origin.uploads.load(Ordering::SeqCst), 0);
    assert!(h.catalog.commits.lock().unwrap().is_empty());
    assert!(!PathBuf::from(&h.payload.staged_path).exists());
}

#[tokio::test]
async fn missing_staged_input_is_terminal() {
    let h = harness(FakeOrigin::new("vid42"));
    std::fs::remove_file(&h.payload.staged_path).unwrap();

    let err = h.pipeline.run(&h.payload).await.unwrap_err();

    assert!(!err.is_recoverable());
    assert!(h.catalog.commits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn degraded_details_fall_back_to_synthesized_urls() {
    let h = harness(FakeOrigin::new("vid42").without_details());

    let outcome = h.pipeline.run(&h.payload).await.expect("upload succeeded");

    assert_eq!(
        outcome.playback_url,
        "https://origin.example/delivery/vid42/watch"
    );
    assert_eq!(
        outcome.thumbnail_url,
        "https://origin.example/delivery/vid42/thumbnails/thumbnail.jpg"
    );
    assert_eq!(outcome.duration_secs, None);

    // Degradation still commits.
    assert_eq!(h.catalog.commits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn custom_thumbnail_replaces_origin_thumbnail() {
    let mut h = harness(FakeOrigin::new("vid42"));

    let thumb_path = h.staging.path().join("thumb.jpg");
    std::fs::write(&thumb_path, b"jpeg").unwrap();
    h.payload.staged_thumbnail_path = Some(thumb_path.to_string_lossy().into_owned());

    let outcome = h.pipeline.run(&h.payload).await.unwrap();

    assert_eq!(
        outcome.thumbnail_url,
        "https://origin.example/custom-thumbs/vid42.jpg"
    );
    assert!(!thumb_path.exists(), "staged thumbnail not cleaned up");
}

#[tokio::test]
async fn thumbnail_failure_is_not_fatal() {
    let mut h = harness(FakeOrigin::new("vid42").failing_thumbnail());

    let thumb_path = h.staging.path().join("thumb.jpg");
    std::fs::write(&thumb_path, b"jpeg").unwrap();
    h.payload.staged_thumbnail_path = Some(thumb_path.to_string_lossy().into_owned());

    let outcome = h.pipeline.run(&h.payload).await.expect("job still succeeds");

    // Falls back to the origin-reported thumbnail.
    assert_eq!(
        outcome.thumbnail_url,
        "https://origin.example/thumbs/vid42.jpg"
    );
    assert_eq!(h.catalog.commits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn catalog_commit_failure_is_terminal() {
    let h = harness_with(
        FakeOrigin::new("vid42"),
        Arc::new(CopyTranscoder),
        FakeCatalog {
            fail: true,
            ..Default::default()
        },
    );

    let err = h.pipeline.run(&h.payload).await.unwrap_err();

    assert!(!err.is_recoverable());
    assert_eq!(h.cache.invalidations.load(Ordering::SeqCst), 0);
    // Cleanup still ran despite the failure.
    assert!(!PathBuf::from(&h.payload.staged_path).exists());
}
