//! Clipstream Core Library
//!
//! This crate provides the domain models, error types, and configuration
//! shared across all clipstream components: the HTTP surface, the ingest
//! worker, and the persistence layer.

pub mod config;
pub mod error;
pub mod job_error;
pub mod models;

// Re-export commonly used types
pub use config::{Config, IngestConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::JobError;
