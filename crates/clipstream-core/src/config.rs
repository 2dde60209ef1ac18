//! Configuration module
//!
//! Environment-driven configuration for the API, the ingest worker, and the
//! media origin client.

use std::env;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Base configuration shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
}

/// Ingest pipeline configuration
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub base: BaseConfig,
    pub database_url: String,
    // Submission validation
    pub max_video_size_bytes: u64,
    pub video_allowed_extensions: Vec<String>,
    pub max_title_chars: usize,
    pub max_duration_secs: f64,
    // Transcoding
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub staging_dir: String,
    // Media origin (resumable uploads)
    pub origin_base_url: String,
    pub origin_api_token: String,
    pub upload_chunk_size_bytes: u64,
    pub upload_max_retries: u32,
    // Job queue
    pub job_queue_max_workers: usize,
    pub job_queue_poll_interval_ms: u64,
    pub job_queue_default_timeout_seconds: i32,
    pub job_queue_max_retries: i32,
    pub job_retention_days: i32,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<IngestConfig>);

impl Config {
    fn inner(&self) -> &IngestConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = IngestConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn max_video_size_bytes(&self) -> u64 {
        self.inner().max_video_size_bytes
    }

    pub fn video_allowed_extensions(&self) -> &[String] {
        &self.inner().video_allowed_extensions
    }

    pub fn max_title_chars(&self) -> usize {
        self.inner().max_title_chars
    }

    pub fn max_duration_secs(&self) -> f64 {
        self.inner().max_duration_secs
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.inner().ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &str {
        &self.inner().ffprobe_path
    }

    pub fn staging_dir(&self) -> &str {
        &self.inner().staging_dir
    }

    pub fn origin_base_url(&self) -> &str {
        &self.inner().origin_base_url
    }

    pub fn origin_api_token(&self) -> &str {
        &self.inner().origin_api_token
    }

    pub fn upload_chunk_size_bytes(&self) -> u64 {
        self.inner().upload_chunk_size_bytes
    }

    pub fn upload_max_retries(&self) -> u32 {
        self.inner().upload_max_retries
    }

    pub fn job_queue_max_workers(&self) -> usize {
        self.inner().job_queue_max_workers
    }

    pub fn job_queue_poll_interval_ms(&self) -> u64 {
        self.inner().job_queue_poll_interval_ms
    }

    pub fn job_queue_default_timeout_seconds(&self) -> i32 {
        self.inner().job_queue_default_timeout_seconds
    }

    pub fn job_queue_max_retries(&self) -> i32 {
        self.inner().job_queue_max_retries
    }

    pub fn job_retention_days(&self) -> i32 {
        self.inner().job_retention_days
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_VIDEO_SIZE_MB: u64 = 250;
        const MAX_TITLE_CHARS: usize = 200;
        const MAX_DURATION_SECS: f64 = 600.0;
        const UPLOAD_CHUNK_SIZE_MB: u64 = 50;
        const UPLOAD_MAX_RETRIES: u32 = 10;
        const JOB_QUEUE_MAX_WORKERS: usize = 4;
        const JOB_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
        const JOB_QUEUE_DEFAULT_TIMEOUT_SECS: i32 = 3600;
        const JOB_QUEUE_MAX_RETRIES: i32 = 3;
        const JOB_RETENTION_DAYS: i32 = 30;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
        };

        let config = IngestConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            max_video_size_bytes: env::var("MAX_VIDEO_SIZE_MB")
                .unwrap_or_else(|_| MAX_VIDEO_SIZE_MB.to_string())
                .parse::<u64>()
                .unwrap_or(MAX_VIDEO_SIZE_MB)
                * 1024
                * 1024,
            video_allowed_extensions: env::var("VIDEO_ALLOWED_EXTENSIONS")
                .unwrap_or_else(|_| "mp4,mov".to_string())
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .collect(),
            max_title_chars: env::var("MAX_TITLE_CHARS")
                .unwrap_or_else(|_| MAX_TITLE_CHARS.to_string())
                .parse()
                .unwrap_or(MAX_TITLE_CHARS),
            max_duration_secs: env::var("MAX_DURATION_SECS")
                .unwrap_or_else(|_| MAX_DURATION_SECS.to_string())
                .parse()
                .unwrap_or(MAX_DURATION_SECS),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            staging_dir: env::var("STAGING_DIR").unwrap_or_else(|_| "/tmp".to_string()),
            origin_base_url: env::var("ORIGIN_BASE_URL")
                .map_err(|_| anyhow::anyhow!("ORIGIN_BASE_URL must be set"))?,
            origin_api_token: env::var("ORIGIN_API_TOKEN")
                .map_err(|_| anyhow::anyhow!("ORIGIN_API_TOKEN must be set"))?,
            upload_chunk_size_bytes: env::var("UPLOAD_CHUNK_SIZE_MB")
                .unwrap_or_else(|_| UPLOAD_CHUNK_SIZE_MB.to_string())
                .parse::<u64>()
                .unwrap_or(UPLOAD_CHUNK_SIZE_MB)
                * 1024
                * 1024,
            upload_max_retries: env::var("UPLOAD_MAX_RETRIES")
                .unwrap_or_else(|_| UPLOAD_MAX_RETRIES.to_string())
                .parse()
                .unwrap_or(UPLOAD_MAX_RETRIES),
            job_queue_max_workers: env::var("JOB_QUEUE_MAX_WORKERS")
                .unwrap_or_else(|_| JOB_QUEUE_MAX_WORKERS.to_string())
                .parse()
                .unwrap_or(JOB_QUEUE_MAX_WORKERS),
            job_queue_poll_interval_ms: env::var("JOB_QUEUE_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| JOB_QUEUE_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(JOB_QUEUE_POLL_INTERVAL_MS),
            job_queue_default_timeout_seconds: env::var("JOB_QUEUE_DEFAULT_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| JOB_QUEUE_DEFAULT_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(JOB_QUEUE_DEFAULT_TIMEOUT_SECS),
            job_queue_max_retries: env::var("JOB_QUEUE_MAX_RETRIES")
                .unwrap_or_else(|_| JOB_QUEUE_MAX_RETRIES.to_string())
                .parse()
                .unwrap_or(JOB_QUEUE_MAX_RETRIES),
            job_retention_days: env::var("JOB_RETENTION_DAYS")
                .unwrap_or_else(|_| JOB_RETENTION_DAYS.to_string())
                .parse()
                .unwrap_or(JOB_RETENTION_DAYS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://") {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if !self.origin_base_url.starts_with("http://")
            && !self.origin_base_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!("ORIGIN_BASE_URL must be an http(s) URL"));
        }

        if self.upload_chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("UPLOAD_CHUNK_SIZE_MB must be positive"));
        }

        if self.video_allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!(
                "VIDEO_ALLOWED_EXTENSIONS must list at least one extension"
            ));
        }

        Ok(())
    }
}
