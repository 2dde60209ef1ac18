//! Transcoding - normalization of uploaded videos via ffmpeg

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// ffmpeg could not be started at all.
    #[error("Failed to run ffmpeg: {0}")]
    Spawn(#[source] anyhow::Error),

    /// ffmpeg ran and exited non-zero. Terminal for the job; retrying the
    /// same input produces the same result.
    #[error("ffmpeg exited with {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },
}

/// Seam for the transcode step so worker tests can fake it.
#[async_trait]
pub trait TranscodeStep: Send + Sync {
    /// Normalize `input` into `output`. No partial output may be referenced
    /// on failure; callers treat `output` as garbage unless Ok is returned.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

const STDERR_TAIL_BYTES: usize = 2048;

/// Tail of ffmpeg's stderr; the banner buries the actual error. The cut
/// must land on a char boundary: lossy-decoded output carries multi-byte
/// characters from stream metadata.
fn stderr_tail(stderr: &str) -> &str {
    if stderr.len() <= STDERR_TAIL_BYTES {
        return stderr;
    }
    let mut idx = stderr.len() - STDERR_TAIL_BYTES;
    while !stderr.is_char_boundary(idx) {
        idx += 1;
    }
    &stderr[idx..]
}

/// ffmpeg-backed normalization to a uniform H.264/AAC MP4.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: String) -> Self {
        Self { ffmpeg_path }
    }
}

#[async_trait]
impl TranscodeStep for FfmpegTranscoder {
    #[tracing::instrument(skip(self, input, output), fields(
        process.executable.path = %self.ffmpeg_path,
        ffmpeg.operation = "transcode"
    ))]
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let start = std::time::Instant::now();

        let result = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(input)
            .args([
                "-c:v",
                "libx264",
                "-preset",
                "fast",
                "-profile:v",
                "main",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-movflags",
                "+faststart",
                "-y",
            ])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to execute ffmpeg");

        let output_result = result.map_err(TranscodeError::Spawn)?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(TranscodeError::Failed {
                exit_code: output_result.status.code().unwrap_or(-1),
                stderr: stderr_tail(&stderr).to_string(),
            });
        }

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            "Transcode completed"
        );

        Ok(())
    }
}
