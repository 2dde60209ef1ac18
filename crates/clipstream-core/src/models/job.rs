use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Error message stored on a job that was cancelled by the owner.
///
/// Cancellation lands in its own terminal state, but a handler may also
/// surface this sentinel through a generic failure path; the status
/// projector re-labels such failed rows as cancelled.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    VideoIngest,
}

impl Display for JobKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobKind::VideoIngest => write!(f, "video_ingest"),
        }
    }
}

impl FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video_ingest" => Ok(JobKind::VideoIngest),
            _ => Err(anyhow::anyhow!("Invalid job kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "job_state", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for IngestJob {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(IngestJob {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            kind: row.get::<String, _>("kind").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse job kind: {}", e).into())
            })?,
            state: row.get("state"),
            payload: row.get("payload"),
            result: row.get("result"),
            error: row.get("error"),
            scheduled_at: row.get("scheduled_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            timeout_seconds: row.get("timeout_seconds"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl IngestJob {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: JobPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Create a payload value from a typed struct.
    /// Use this when enqueuing jobs to keep payload shapes consistent.
    pub fn payload_from<P: JobPayload>(payload: &P) -> serde_json::Value {
        serde_json::to_value(payload).unwrap_or_default()
    }
}

/// Trait for type-safe job payloads
pub trait JobPayload: Serialize + for<'de> Deserialize<'de> {
    fn kind() -> JobKind;
}

/// Payload of a video ingest job. The job id doubles as the upload session
/// id, so the worker resolves staging paths and the cancel flag through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJobPayload {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub staged_path: String,
    pub original_filename: String,
    /// Custom thumbnail supplied with the submission, staged next to the
    /// video. Uploaded best-effort after the video lands.
    #[serde(default)]
    pub staged_thumbnail_path: Option<String>,
    pub submission: super::video::VideoSubmission,
}

impl JobPayload for IngestJobPayload {
    fn kind() -> JobKind {
        JobKind::VideoIngest
    }
}

/// Result stored on a successfully completed ingest job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestOutcome {
    pub video_id: Uuid,
    /// Object identifier assigned by the remote media origin.
    pub remote_uid: String,
    pub playback_url: String,
    pub thumbnail_url: String,
    pub duration_secs: Option<i64>,
}

/// Response model for the job status endpoint
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_state(state: JobState) -> IngestJob {
        IngestJob {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            kind: JobKind::VideoIngest,
            state,
            payload: serde_json::json!({}),
            result: None,
            error: None,
            scheduled_at: Utc::now() - chrono::Duration::seconds(10),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            timeout_seconds: Some(3600),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_job_kind_display() {
        assert_eq!(JobKind::VideoIngest.to_string(), "video_ingest");
    }

    #[test]
    fn test_job_kind_from_str() {
        assert_eq!(
            "video_ingest".parse::<JobKind>().unwrap(),
            JobKind::VideoIngest
        );
        assert!("invalid_kind".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_job_state_display() {
        assert_eq!(JobState::Pending.to_string(), "pending");
        assert_eq!(JobState::Running.to_string(), "running");
        assert_eq!(JobState::Succeeded.to_string(), "succeeded");
        assert_eq!(JobState::Failed.to_string(), "failed");
        assert_eq!(JobState::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_job_state_from_str() {
        assert_eq!("pending".parse::<JobState>().unwrap(), JobState::Pending);
        assert_eq!("running".parse::<JobState>().unwrap(), JobState::Running);
        assert_eq!(
            "succeeded".parse::<JobState>().unwrap(),
            JobState::Succeeded
        );
        assert_eq!("failed".parse::<JobState>().unwrap(), JobState::Failed);
        assert_eq!(
            "cancelled".parse::<JobState>().unwrap(),
            JobState::Cancelled
        );
        assert!("invalid_state".parse::<JobState>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_job_can_retry_when_under_limit() {
        let mut job = job_with_state(JobState::Failed);
        job.retry_count = 2;
        assert!(job.can_retry());
    }

    #[test]
    fn test_job_cannot_retry_when_at_limit() {
        let mut job = job_with_state(JobState::Failed);
        job.retry_count = 3;
        assert!(!job.can_retry());
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = IngestJobPayload {
            session_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            staged_path: "/tmp/staged.mp4".to_string(),
            original_filename: "clip.mp4".to_string(),
            staged_thumbnail_path: None,
            submission: super::super::video::VideoSubmission::new("My clip".to_string()),
        };

        let mut job = job_with_state(JobState::Pending);
        job.payload = IngestJob::payload_from(&payload);

        let parsed: IngestJobPayload = job.try_payload_as().unwrap();
        assert_eq!(parsed.session_id, payload.session_id);
        assert_eq!(parsed.staged_path, "/tmp/staged.mp4");
        assert_eq!(parsed.submission.title, "My clip");
    }

    #[test]
    fn test_job_payload_trait_kind() {
        assert_eq!(IngestJobPayload::kind(), JobKind::VideoIngest);
    }
}
