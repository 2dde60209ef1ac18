//! Clipstream worker – background job queue and the video ingest pipeline.
//!
//! This crate provides the job queue (polling, LISTEN/NOTIFY, retry, worker
//! pool), the `JobHandlerContext` trait the API implements for dispatch, the
//! ingest pipeline itself, and the client-facing status projection.

mod context;
mod ingest;
mod queue;
mod status;

pub use context::JobHandlerContext;
pub use ingest::{IngestPipeline, SessionStore, VideoCatalog};
pub use queue::{JobQueue, JobQueueConfig};
pub use status::project_status;
