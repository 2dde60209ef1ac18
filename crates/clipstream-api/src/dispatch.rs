//! Job dispatch context
//!
//! The queue holds a weak reference to this dispatcher and calls it for every
//! claimed job. Kept separate from AppState so the queue never keeps the HTTP
//! state alive.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use clipstream_core::models::{IngestJob, IngestJobPayload, JobKind};
use clipstream_core::JobError;
use clipstream_worker::{IngestPipeline, JobHandlerContext};

pub struct IngestDispatcher {
    pipeline: IngestPipeline,
}

impl IngestDispatcher {
    pub fn new(pipeline: IngestPipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandlerContext for IngestDispatcher {
    async fn dispatch_job(self: Arc<Self>, job: &IngestJob) -> Result<serde_json::Value> {
        match job.kind {
            JobKind::VideoIngest => {
                // A payload that does not parse will never parse; fail
                // terminally instead of burning retries.
                let payload: IngestJobPayload = job.try_payload_as().map_err(|e| {
                    anyhow::Error::new(JobError::terminal(anyhow::anyhow!(
                        "invalid ingest payload: {}",
                        e
                    )))
                })?;

                let outcome = self
                    .pipeline
                    .run(&payload)
                    .await
                    .map_err(anyhow::Error::new)?;

                Ok(serde_json::to_value(outcome)?)
            }
        }
    }
}
