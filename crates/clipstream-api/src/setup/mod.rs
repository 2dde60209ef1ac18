//! Application setup and initialization
//!
//! All initialization logic lives here instead of main.rs so the wiring is
//! testable and main stays a thin entry point.

pub mod routes;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};

use clipstream_core::Config;
use clipstream_db::{
    setup_database, JobRepository, MemoryListingCache, SessionRepository, VideoRepository,
};
use clipstream_origin::{MediaOrigin, StreamOrigin};
use clipstream_processing::{DurationProbe, FfmpegTranscoder, FfprobeProbe, IngestValidator};
use clipstream_worker::{IngestPipeline, JobHandlerContext, JobQueue, JobQueueConfig};

use crate::dispatch::IngestDispatcher;
use crate::state::AppState;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    crate::telemetry::init_telemetry();

    tracing::info!("Configuration loaded and validated successfully");

    let pool = setup_database(&config).await?;

    tokio::fs::create_dir_all(config.staging_dir())
        .await
        .context("Failed to create staging directory")?;

    let jobs = JobRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool.clone());
    let videos = VideoRepository::new(pool.clone());
    let cache = Arc::new(MemoryListingCache::default());

    let origin: Arc<dyn MediaOrigin> = Arc::new(StreamOrigin::new(
        config.origin_base_url().to_string(),
        config.origin_api_token().to_string(),
        config.upload_chunk_size_bytes(),
        config.upload_max_retries(),
    ));

    let probe: Arc<dyn DurationProbe> = Arc::new(
        FfprobeProbe::new(config.ffprobe_path().to_string())
            .context("Failed to configure ffprobe")?,
    );

    let transcoder = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path().to_string()));

    let pipeline = IngestPipeline::new(
        Arc::new(sessions.clone()),
        Arc::new(videos.clone()),
        cache.clone(),
        transcoder,
        origin.clone(),
    );

    // The queue holds a weak reference so shutdown ordering never deadlocks;
    // AppState keeps the dispatcher alive.
    let dispatcher = Arc::new(IngestDispatcher::new(pipeline));
    let context: Arc<dyn JobHandlerContext> = dispatcher.clone();

    let queue = JobQueue::new(
        jobs.clone(),
        JobQueueConfig::from_config(&config),
        Arc::downgrade(&context),
        Some(pool.clone()),
    );

    let validator = IngestValidator::new(
        config.max_video_size_bytes(),
        config.video_allowed_extensions().to_vec(),
        config.max_title_chars(),
        config.max_duration_secs(),
    );

    let state = Arc::new(AppState {
        config,
        pool,
        jobs,
        sessions,
        videos,
        cache,
        origin,
        probe,
        validator,
        queue,
        dispatcher,
    });

    let router = routes::setup_routes(&state.config, state.clone())?;

    Ok((state, router))
}
