//! Clipstream processing
//!
//! Local media handling for the ingest pipeline: submission validation,
//! duration probing via ffprobe, and normalization via ffmpeg. Everything
//! here runs against staged files on local disk; nothing talks to the
//! network or the database.

pub mod probe;
pub mod transcode;
pub mod validator;

pub use probe::{DurationProbe, FfprobeProbe, MediaInfo};
pub use transcode::{FfmpegTranscoder, TranscodeError, TranscodeStep};
pub use validator::{IngestValidator, ValidationError};
