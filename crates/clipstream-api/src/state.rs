//! Application state shared by all handlers.

use std::sync::Arc;

use sqlx::PgPool;

use clipstream_core::Config;
use clipstream_db::{JobRepository, ListingCache, SessionRepository, VideoRepository};
use clipstream_origin::MediaOrigin;
use clipstream_processing::{DurationProbe, IngestValidator};
use clipstream_worker::JobQueue;

use crate::dispatch::IngestDispatcher;

pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub jobs: JobRepository,
    pub sessions: SessionRepository,
    pub videos: VideoRepository,
    pub cache: Arc<dyn ListingCache>,
    pub origin: Arc<dyn MediaOrigin>,
    pub probe: Arc<dyn DurationProbe>,
    pub validator: IngestValidator,
    pub queue: JobQueue,
    /// The queue only holds a weak reference to the dispatcher; this keeps
    /// it alive for the process lifetime.
    pub dispatcher: Arc<IngestDispatcher>,
}

// Handlers receive Arc<AppState> through axum's State extractor.
const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AppState>();
};
