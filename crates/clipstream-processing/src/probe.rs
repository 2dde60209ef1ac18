//! Media probing - duration and stream metadata via ffprobe

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
fn validate_path(path: &str) -> Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }

    if path.contains("..") {
        return Err(anyhow!("Path contains directory traversal: {}", path));
    }

    Ok(())
}

/// Validate and canonicalize a file path to prevent directory traversal
fn validate_and_canonicalize_path(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    validate_path(&path_str)?;

    path.canonicalize()
        .map_err(|e| anyhow!("Failed to canonicalize path: {}", e))
}

/// Metadata extracted from a staged video file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
}

/// Seam for duration probing. The worker and the upload handler fake this in
/// tests; production uses [`FfprobeProbe`].
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;
}

pub struct FfprobeProbe {
    ffprobe_path: String,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: String) -> Result<Self> {
        validate_path(&ffprobe_path)
            .context("Invalid ffprobe_path: contains dangerous characters")?;

        if !ffprobe_path.chars().all(|c| {
            c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\'
        }) {
            return Err(anyhow!("Invalid ffprobe_path: contains unsafe characters"));
        }

        Ok(Self { ffprobe_path })
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    #[tracing::instrument(skip(self, path), fields(
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let start = std::time::Instant::now();

        let validated_path = validate_and_canonicalize_path(path).context("Invalid video path")?;

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(&validated_path)
            .output()
            .await
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let info = parse_probe_output(&output.stdout)?;

        let elapsed = start.elapsed();
        tracing::info!(
            duration_ms = elapsed.as_millis(),
            video_duration = info.duration_secs,
            "Video probe completed"
        );

        Ok(info)
    }
}

/// Parse ffprobe's JSON output into [`MediaInfo`].
fn parse_probe_output(stdout: &[u8]) -> Result<MediaInfo> {
    let probe_data: serde_json::Value =
        serde_json::from_slice(stdout).context("Failed to parse ffprobe output")?;

    let format = &probe_data["format"];

    let duration_secs = format["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| anyhow!("Could not parse duration"))?;

    let stream = probe_data["streams"].get(0);

    let width = stream
        .and_then(|s| s["width"].as_u64())
        .map(|w| w as u32);
    let height = stream
        .and_then(|s| s["height"].as_u64())
        .map(|h| h as u32);
    let codec = stream
        .and_then(|s| s["codec_name"].as_str())
        .map(|c| c.to_string());

    Ok(MediaInfo {
        duration_secs,
        width,
        height,
        codec,
    })
}
