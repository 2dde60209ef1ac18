//! Job handler context trait
//!
//! The API implements this trait for its dispatcher. The worker calls
//! `dispatch_job` when processing a claimed job; the implementation matches
//! on job kind and invokes the appropriate pipeline.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use clipstream_core::models::IngestJob;

/// Context for job dispatch.
///
/// The worker holds a weak reference so that dropping the dispatcher tears
/// the pool down cleanly instead of keeping it alive forever.
#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    /// Dispatch a job to the appropriate handler and return its result value.
    async fn dispatch_job(self: Arc<Self>, job: &IngestJob) -> Result<serde_json::Value>;
}
