//! Media origin service
//!
//! Wraps the resumable upload client together with the origin's detail and
//! image APIs behind one trait the ingest worker can depend on.

use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::cancel::CancelProbe;
use crate::error::UploadError;
use crate::tus::TusClient;

/// Authoritative metadata reported by the origin after an upload. Every
/// field is optional; the pipeline substitutes synthesized fallbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoDetails {
    pub playback_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Everything the ingest worker needs from the remote media origin.
#[async_trait]
pub trait MediaOrigin: Send + Sync {
    /// Open a resumable upload session; returns the session URL.
    async fn open_session(&self, file_size: u64, filename: &str) -> Result<String, UploadError>;

    /// Transfer a file into an open session; returns the object uid.
    async fn upload(
        &self,
        session_url: &str,
        path: &Path,
        cancel: &dyn CancelProbe,
    ) -> Result<String, UploadError>;

    /// Fetch playback metadata for an uploaded object.
    async fn fetch_details(&self, uid: &str) -> Result<VideoDetails, UploadError>;

    /// Upload a thumbnail image for an object; returns its URL.
    async fn upload_thumbnail(&self, uid: &str, path: &Path) -> Result<String, UploadError>;

    /// Abort an open session (explicit cancellation only).
    async fn abort_session(&self, session_url: &str) -> Result<(), UploadError>;

    /// Synthesized playback URL used when the detail fetch degrades.
    fn fallback_playback_url(&self, uid: &str) -> String;

    /// Synthesized thumbnail URL used when no thumbnail was stored.
    fn fallback_thumbnail_url(&self, uid: &str) -> String;
}

/// Production origin client.
#[derive(Debug, Clone)]
pub struct StreamOrigin {
    tus: TusClient,
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl StreamOrigin {
    pub fn new(
        base_url: String,
        api_token: String,
        chunk_size: u64,
        upload_max_retries: u32,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let tus = TusClient::new(
            format!("{}/videos/uploads", base_url),
            api_token.clone(),
            chunk_size,
            upload_max_retries,
        );
        Self {
            tus,
            http: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }
}

#[async_trait]
impl MediaOrigin for StreamOrigin {
    async fn open_session(&self, file_size: u64, filename: &str) -> Result<String, UploadError> {
        self.tus.create_session(file_size, filename).await
    }

    async fn upload(
        &self,
        session_url: &str,
        path: &Path,
        cancel: &dyn CancelProbe,
    ) -> Result<String, UploadError> {
        self.tus.upload_to(session_url, path, 0, cancel).await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_details(&self, uid: &str) -> Result<VideoDetails, UploadError> {
        let response = self
            .http
            .get(format!("{}/videos/{}", self.base_url, uid))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::Protocol {
                status: response.status().as_u16(),
                message: "Failed to fetch video details".to_string(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(UploadError::Transport)?;

        Ok(parse_details(&body))
    }

    #[tracing::instrument(skip(self, path))]
    async fn upload_thumbnail(&self, uid: &str, path: &Path) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("thumbnail.jpg")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .text("uid", uid.to_string())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/images", self.base_url))
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await?;

        if response.status() != StatusCode::OK && response.status() != StatusCode::CREATED {
            return Err(UploadError::Protocol {
                status: response.status().as_u16(),
                message: "Failed to upload thumbnail".to_string(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(UploadError::Transport)?;

        body["result"]["url"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or(UploadError::MissingHeader("result.url"))
    }

    async fn abort_session(&self, session_url: &str) -> Result<(), UploadError> {
        self.tus.abort(session_url).await
    }

    fn fallback_playback_url(&self, uid: &str) -> String {
        format!("{}/delivery/{}/watch", self.base_url, uid)
    }

    fn fallback_thumbnail_url(&self, uid: &str) -> String {
        format!("{}/delivery/{}/thumbnails/thumbnail.jpg", self.base_url, uid)
    }
}

/// Pull the fields we care about out of the origin's detail response,
/// tolerating any missing piece.
fn parse_details(body: &serde_json::Value) -> VideoDetails {
    let result = &body["result"];
    VideoDetails {
        playback_url: result["playback"]["hls"]
            .as_str()
            .map(|s| s.to_string()),
        thumbnail_url: result["thumbnail"].as_str().map(|s| s.to_string()),
        duration_secs: result["duration"].as_f64(),
    }
}
