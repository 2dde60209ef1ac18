//! Integration tests for the resumable upload client against a mock origin.

use std::io::Write;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use clipstream_origin::{CancelProbe, NeverCancelled, TusClient, UploadError};

const SESSION_PATH: &str = "/videos/uploads/vid123";

/// Stateful PATCH responder. Tracks the accepted offset the way a real tus
/// server would, optionally failing the first N requests and optionally
/// accepting only part of each chunk.
struct PatchResponder {
    offset: Arc<AtomicU64>,
    fail_first: u32,
    failures_seen: AtomicU32,
    /// Bytes the server stores from a request that is answered with 500,
    /// simulating a write that landed before the error.
    partial_on_failure: u64,
    /// Cap on bytes accepted per successful request.
    accept_at_most: Option<u64>,
}

impl PatchResponder {
    fn new(offset: Arc<AtomicU64>) -> Self {
        Self {
            offset,
            fail_first: 0,
            failures_seen: AtomicU32::new(0),
            partial_on_failure: 0,
            accept_at_most: None,
        }
    }

    fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    fn storing_on_failure(mut self, bytes: u64) -> Self {
        self.partial_on_failure = bytes;
        self
    }

    fn accepting_at_most(mut self, bytes: u64) -> Self {
        self.accept_at_most = Some(bytes);
        self
    }
}

impl Respond for PatchResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let request_offset: u64 = request
            .headers
            .get("Upload-Offset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .expect("PATCH without Upload-Offset header");

        if self.failures_seen.load(Ordering::SeqCst) < self.fail_first {
            self.failures_seen.fetch_add(1, Ordering::SeqCst);
            let stored = std::cmp::min(self.partial_on_failure, request.body.len() as u64);
            self.offset.store(request_offset + stored, Ordering::SeqCst);
            return ResponseTemplate::new(500);
        }

        // A correct client always resumes from the server's offset.
        assert_eq!(
            request_offset,
            self.offset.load(Ordering::SeqCst),
            "client sent a chunk at a stale offset"
        );

        let body_len = request.body.len() as u64;
        let accepted = match self.accept_at_most {
            Some(cap) => std::cmp::min(cap, body_len),
            None => body_len,
        };
        let new_offset = request_offset + accepted;
        self.offset.store(new_offset, Ordering::SeqCst);

        ResponseTemplate::new(204).insert_header("Upload-Offset", new_offset.to_string().as_str())
    }
}

/// HEAD responder reporting the server-side offset.
struct HeadResponder {
    offset: Arc<AtomicU64>,
}

impl Respond for HeadResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).insert_header(
            "Upload-Offset",
            self.offset.load(Ordering::SeqCst).to_string().as_str(),
        )
    }
}

struct AlwaysCancelled;

#[async_trait]
impl CancelProbe for AlwaysCancelled {
    async fn is_cancelled(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

async fn mock_origin(offset: Arc<AtomicU64>, patch: PatchResponder) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/videos/uploads"))
        .respond_with(ResponseTemplate::new(201).insert_header("Location", SESSION_PATH))
        .mount(&server)
        .await;

    Mock::given(method("HEAD"))
        .and(path(SESSION_PATH))
        .respond_with(HeadResponder { offset })
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(SESSION_PATH))
        .respond_with(patch)
        .mount(&server)
        .await;

    server
}

fn client_for(server: &MockServer, chunk_size: u64, max_retries: u32) -> TusClient {
    TusClient::new(
        format!("{}/videos/uploads", server.uri()),
        "test-token".to_string(),
        chunk_size,
        max_retries,
    )
    .with_retry_wait_step(Duration::from_millis(1))
}

fn staged_file(size: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    file.write_all(&data).expect("write temp file");
    file
}

async fn patch_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "PATCH")
        .count()
}

#[tokio::test]
async fn small_file_uploads_in_a_single_chunk() {
    let offset = Arc::new(AtomicU64::new(0));
    let server = mock_origin(offset.clone(), PatchResponder::new(offset.clone())).await;
    let client = client_for(&server, 1024, 10);
    let file = staged_file(10);

    let uid = client.upload(file.path(), &NeverCancelled).await.unwrap();

    assert_eq!(uid, "vid123");
    assert_eq!(offset.load(Ordering::SeqCst), 10);
    assert_eq!(patch_count(&server).await, 1);
}

#[tokio::test]
async fn chunk_count_matches_file_size() {
    let offset = Arc::new(AtomicU64::new(0));
    let server = mock_origin(offset.clone(), PatchResponder::new(offset.clone())).await;
    let client = client_for(&server, 1024, 10);
    // Exactly 4 chunks, no remainder.
    let file = staged_file(4096);

    client.upload(file.path(), &NeverCancelled).await.unwrap();

    assert_eq!(offset.load(Ordering::SeqCst), 4096);
    assert_eq!(patch_count(&server).await, 4);
}

#[tokio::test]
async fn transient_failures_resume_from_server_offset() {
    let offset = Arc::new(AtomicU64::new(0));
    // First two PATCHes fail; the server keeps 7 bytes of the first failed
    // chunk, so the client must re-sync via HEAD instead of assuming zero.
    let patch = PatchResponder::new(offset.clone())
        .failing_first(2)
        .storing_on_failure(7);
    let server = mock_origin(offset.clone(), patch).await;
    let client = client_for(&server, 64, 10);
    let file = staged_file(100);

    let uid = client.upload(file.path(), &NeverCancelled).await.unwrap();

    assert_eq!(uid, "vid123");
    // The stale-offset assertion inside the responder guarantees no byte
    // range was sent twice; here we just confirm everything arrived.
    assert_eq!(offset.load(Ordering::SeqCst), 100);
}

#[tokio::test]
async fn retries_exhausted_stops_all_requests() {
    let offset = Arc::new(AtomicU64::new(0));
    let patch = PatchResponder::new(offset.clone()).failing_first(u32::MAX);
    let server = mock_origin(offset.clone(), patch).await;
    let client = client_for(&server, 1024, 3);
    let file = staged_file(10);

    let err = client
        .upload(file.path(), &NeverCancelled)
        .await
        .unwrap_err();

    match err {
        UploadError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    // Exactly the budgeted attempts, nothing after exhaustion.
    assert_eq!(patch_count(&server).await, 3);
}

#[tokio::test]
async fn server_may_accept_fewer_bytes_than_sent() {
    let offset = Arc::new(AtomicU64::new(0));
    let patch = PatchResponder::new(offset.clone()).accepting_at_most(40);
    let server = mock_origin(offset.clone(), patch).await;
    let client = client_for(&server, 100, 10);
    let file = staged_file(100);

    client.upload(file.path(), &NeverCancelled).await.unwrap();

    // 40 + 40 + 20: the client followed the server's offset each time.
    assert_eq!(offset.load(Ordering::SeqCst), 100);
    assert_eq!(patch_count(&server).await, 3);
}

#[tokio::test]
async fn cancellation_before_first_chunk_sends_nothing() {
    let offset = Arc::new(AtomicU64::new(0));
    let server = mock_origin(offset.clone(), PatchResponder::new(offset.clone())).await;
    let client = client_for(&server, 1024, 10);
    let file = staged_file(10);

    let err = client
        .upload(file.path(), &AlwaysCancelled)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Cancelled));
    assert_eq!(patch_count(&server).await, 0);
}

#[tokio::test]
async fn resume_continues_from_head_offset() {
    let offset = Arc::new(AtomicU64::new(60));
    let server = mock_origin(offset.clone(), PatchResponder::new(offset.clone())).await;
    let client = client_for(&server, 25, 10);
    let file = staged_file(100);

    let session_url = format!("{}{}", server.uri(), SESSION_PATH);
    let uid = client
        .resume(&session_url, file.path(), &NeverCancelled)
        .await
        .unwrap();

    assert_eq!(uid, "vid123");
    assert_eq!(offset.load(Ordering::SeqCst), 100);
    // 40 remaining bytes at a 25-byte chunk size.
    assert_eq!(patch_count(&server).await, 2);
}

#[tokio::test]
async fn abort_tolerates_missing_session() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server, 1024, 3);
    let session_url = format!("{}{}", server.uri(), SESSION_PATH);
    assert!(client.abort(&session_url).await.is_ok());
}
