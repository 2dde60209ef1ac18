//! Resumable upload client (tus 1.0.0)
//!
//! Upload state machine: a session is created with POST (INIT ->
//! SESSION_OPEN), chunks are sent with PATCH at the current offset
//! (UPLOADING), and the transfer completes when the server-reported offset
//! reaches the file size. The server's `Upload-Offset` response header is
//! the only source of truth for progress; the client never advances the
//! cursor by local arithmetic, which keeps partial chunk acceptance safe.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::cancel::CancelProbe;
use crate::error::UploadError;

const TUS_RESUMABLE: &str = "1.0.0";
const MAX_RETRY_WAIT_SECS: u64 = 30;
const RETRY_WAIT_STEP_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct TusClient {
    http: reqwest::Client,
    create_url: String,
    api_token: String,
    chunk_size: u64,
    max_retries: u32,
    retry_wait_step: Duration,
}

impl TusClient {
    pub fn new(create_url: String, api_token: String, chunk_size: u64, max_retries: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            create_url,
            api_token,
            chunk_size,
            max_retries,
            retry_wait_step: Duration::from_secs(RETRY_WAIT_STEP_SECS),
        }
    }

    /// Override the backoff step between chunk retries.
    pub fn with_retry_wait_step(mut self, step: Duration) -> Self {
        self.retry_wait_step = step;
        self
    }

    fn base_headers(&self) -> Result<HeaderMap, UploadError> {
        let mut headers = HeaderMap::new();
        headers.insert("Tus-Resumable", HeaderValue::from_static(TUS_RESUMABLE));
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.api_token))
                .map_err(|_| UploadError::MissingHeader("Authorization"))?,
        );
        Ok(headers)
    }

    /// Create an upload session and return its URL (INIT -> SESSION_OPEN).
    #[tracing::instrument(skip(self, filename))]
    pub async fn create_session(
        &self,
        file_size: u64,
        filename: &str,
    ) -> Result<String, UploadError> {
        let mut headers = self.base_headers()?;
        headers.insert(
            "Upload-Length",
            HeaderValue::from_str(&file_size.to_string())
                .map_err(|_| UploadError::MissingHeader("Upload-Length"))?,
        );
        let encoded = base64::prelude::BASE64_STANDARD.encode(filename);
        headers.insert(
            "Upload-Metadata",
            HeaderValue::from_str(&format!("filename {}", encoded))
                .map_err(|_| UploadError::MissingHeader("Upload-Metadata"))?,
        );

        let response = self
            .http
            .post(&self.create_url)
            .headers(headers)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(UploadError::Protocol {
                status: response.status().as_u16(),
                message: "Failed to create upload session".to_string(),
            });
        }

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or(UploadError::MissingHeader("Location"))?;

        let session_url = self.resolve_location(&location)?;
        tracing::info!(file_size, "Upload session created");
        Ok(session_url)
    }

    /// Resolve a possibly-relative Location header against the creation
    /// endpoint's origin.
    fn resolve_location(&self, location: &str) -> Result<String, UploadError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(location.to_string());
        }

        let origin = origin_of(&self.create_url)
            .ok_or_else(|| UploadError::InvalidSessionUrl(self.create_url.clone()))?;
        Ok(format!("{}{}", origin, location))
    }

    /// Query the authoritative offset for an open session.
    pub async fn head_offset(&self, session_url: &str) -> Result<u64, UploadError> {
        let response = self
            .http
            .head(session_url)
            .headers(self.base_headers()?)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(UploadError::Protocol {
                status: status.as_u16(),
                message: "Failed to query upload offset".to_string(),
            });
        }

        parse_offset_header(response.headers())
    }

    /// Send one chunk at `offset` and return the server-reported new offset.
    async fn upload_chunk(
        &self,
        session_url: &str,
        offset: u64,
        chunk: Vec<u8>,
    ) -> Result<u64, UploadError> {
        let mut headers = self.base_headers()?;
        headers.insert(
            "Upload-Offset",
            HeaderValue::from_str(&offset.to_string())
                .map_err(|_| UploadError::MissingHeader("Upload-Offset"))?,
        );
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/offset+octet-stream"),
        );

        let response = self
            .http
            .patch(session_url)
            .headers(headers)
            .body(chunk)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::Protocol {
                status: response.status().as_u16(),
                message: "Failed to patch chunk".to_string(),
            });
        }

        parse_offset_header(response.headers())
    }

    /// Transfer the file into an open session, starting at `start_offset`.
    ///
    /// Per chunk: the cancel probe is consulted first, then a PATCH is sent
    /// at the current offset. Failures are retried with a bounded backoff
    /// (`min(5 * attempt, 30)` seconds); before each retry the offset is
    /// re-queried with HEAD so bytes the server already accepted are never
    /// resent or double counted. After `max_retries` consecutive failures
    /// the transfer aborts with `RetriesExhausted` and no further requests
    /// are made. Returns the object uid parsed from the session URL.
    #[tracing::instrument(skip(self, path, cancel), fields(session_url = %session_url))]
    pub async fn upload_to(
        &self,
        session_url: &str,
        path: &Path,
        start_offset: u64,
        cancel: &dyn CancelProbe,
    ) -> Result<String, UploadError> {
        let mut file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();

        let mut offset = start_offset;
        let mut attempt: u32 = 0;

        while offset < file_size {
            if cancel.is_cancelled().await.map_err(UploadError::Other)? {
                tracing::info!(offset, "Cancellation observed, stopping upload");
                return Err(UploadError::Cancelled);
            }

            file.seek(SeekFrom::Start(offset)).await?;
            let want = std::cmp::min(self.chunk_size, file_size - offset) as usize;
            let mut chunk = vec![0u8; want];
            file.read_exact(&mut chunk).await?;

            match self.upload_chunk(session_url, offset, chunk).await {
                Ok(new_offset) => {
                    tracing::debug!(offset, new_offset, "Chunk accepted");
                    offset = new_offset;
                    attempt = 0;
                }
                Err(err @ (UploadError::Transport(_) | UploadError::Protocol { .. })) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        tracing::error!(
                            attempts = attempt,
                            error = %err,
                            "Upload retries exhausted"
                        );
                        return Err(UploadError::RetriesExhausted {
                            attempts: attempt,
                            last_error: Box::new(err),
                        });
                    }

                    let wait = retry_wait(self.retry_wait_step, attempt);
                    tracing::warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Chunk failed, retrying"
                    );
                    tokio::time::sleep(wait).await;

                    // Re-sync with the server; it may have accepted part of
                    // the failed chunk.
                    match self.head_offset(session_url).await {
                        Ok(server_offset) => offset = server_offset,
                        Err(head_err) => {
                            tracing::warn!(error = %head_err, "Offset re-query failed");
                        }
                    }
                }
                Err(other) => return Err(other),
            }
        }

        let uid = parse_uid(session_url)?;
        tracing::info!(file_size, uid = %uid, "Upload complete");
        Ok(uid)
    }

    /// Create a session and transfer the whole file. Convenience over
    /// `create_session` + `upload_to` for callers that do not persist the
    /// session URL.
    pub async fn upload(
        &self,
        path: &Path,
        cancel: &dyn CancelProbe,
    ) -> Result<String, UploadError> {
        let file_size = tokio::fs::metadata(path).await?.len();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        let session_url = self.create_session(file_size, filename).await?;
        self.upload_to(&session_url, path, 0, cancel).await
    }

    /// Continue a previously opened session from the server's offset.
    pub async fn resume(
        &self,
        session_url: &str,
        path: &Path,
        cancel: &dyn CancelProbe,
    ) -> Result<String, UploadError> {
        let offset = self.head_offset(session_url).await?;
        self.upload_to(session_url, path, offset, cancel).await
    }

    /// Abort an open session. A 404 means the session is already gone and
    /// counts as success.
    #[tracing::instrument(skip(self))]
    pub async fn abort(&self, session_url: &str) -> Result<(), UploadError> {
        let response = self
            .http
            .delete(session_url)
            .headers(self.base_headers()?)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(UploadError::Protocol {
                status: status.as_u16(),
                message: "Failed to abort upload session".to_string(),
            })
        }
    }
}

/// Bounded backoff: `min(step * attempt, 30s)` with the default 5s step.
fn retry_wait(step: Duration, attempt: u32) -> Duration {
    std::cmp::min(step * attempt, Duration::from_secs(MAX_RETRY_WAIT_SECS))
}

fn parse_offset_header(headers: &HeaderMap) -> Result<u64, UploadError> {
    headers
        .get("Upload-Offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or(UploadError::MissingHeader("Upload-Offset"))
}

/// Scheme + authority of a URL, without trailing slash.
fn origin_of(url: &str) -> Option<String> {
    let scheme_end = url.find("://")?;
    let rest = &url[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    Some(format!(
        "{}://{}",
        &url[..scheme_end],
        &rest[..authority_end]
    ))
}

/// The object uid assigned by the origin is the last path segment of the
/// session URL, with any query string stripped.
pub fn parse_uid(session_url: &str) -> Result<String, UploadError> {
    let without_query = session_url
        .split_once('?')
        .map(|(head, _)| head)
        .unwrap_or(session_url);

    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);

    after_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| UploadError::InvalidSessionUrl(session_url.to_string()))
}
