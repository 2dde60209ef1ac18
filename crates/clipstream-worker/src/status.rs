//! Client-facing job status projection
//!
//! Maps the raw job row onto the response model. A failed row whose stored
//! error equals the cancellation sentinel is re-labeled here, so clients
//! only ever see CANCELLED no matter which path recorded the outcome.
//! Projection never mutates; polling a terminal job is idempotent.

use clipstream_core::models::{IngestJob, JobResponse, JobState, CANCELLED_BY_USER};

pub fn project_status(job: &IngestJob) -> JobResponse {
    let state = match job.state {
        JobState::Failed if job.error.as_deref() == Some(CANCELLED_BY_USER) => JobState::Cancelled,
        state => state,
    };

    let result = match state {
        JobState::Succeeded => job.result.clone(),
        _ => None,
    };

    JobResponse {
        id: job.id,
        kind: job.kind.clone(),
        state,
        message: job.error.clone(),
        result,
        started_at: job.started_at,
        completed_at: job.completed_at,
        retry_count: job.retry_count,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use clipstream_core::models::JobKind;

    fn job(state: JobState, error: Option<&str>) -> IngestJob {
        IngestJob {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            kind: JobKind::VideoIngest,
            state,
            payload: serde_json::json!({}),
            result: None,
            error: error.map(|e| e.to_string()),
            scheduled_at: Utc::now(),
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
    fn test_plain_states_pass_through() {
        assert_eq!(project_status(&job(JobState::Pending, None)).state, JobState::Pending);
        assert_eq!(project_status(&job(JobState::Running, None)).state, JobState::Running);
        assert_eq!(
            project_status(&job(JobState::Cancelled, Some(CANCELLED_BY_USER))).state,
            JobState::Cancelled
        );
    }

    #[test]
    fn test_sentinel_failed_job_relabelled_cancelled() {
        let projected = project_status(&job(JobState::Failed, Some(CANCELLED_BY_USER)));
        assert_eq!(projected.state, JobState::Cancelled);
        assert_eq!(projected.message.as_deref(), Some(CANCELLED_BY_USER));
    }

    #[test]
    fn test_ordinary_failure_stays_failed() {
        let projected = project_status(&job(JobState::Failed, Some("transcode failed")));
        assert_eq!(projected.state, JobState::Failed);
    }

    #[test]
    fn test_result_exposed_only_on_success() {
        let mut succeeded = job(JobState::Succeeded, None);
        succeeded.result = Some(serde_json::json!({"remote_uid": "abc"}));
        assert!(project_status(&succeeded).result.is_some());

        let mut failed = job(JobState::Failed, Some("boom"));
        failed.result = Some(serde_json::json!({"partial": true}));
        assert!(project_status(&failed).result.is_none());
    }

    #[test]
    fn test_projection_is_idempotent() {
        let terminal = job(JobState::Failed, Some(CANCELLED_BY_USER));
        let first = project_status(&terminal);
        let second = project_status(&terminal);
        assert_eq!(first.state, second.state);
        assert_eq!(first.message, second.message);
    }
}
