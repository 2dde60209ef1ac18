//! Clipstream media origin client
//!
//! Talks to the remote media origin: resumable (tus 1.0.0) uploads of
//! transcoded videos, detail lookups for playback metadata, and best-effort
//! thumbnail uploads. The ingest worker consumes everything through the
//! [`MediaOrigin`] trait so its tests can run against fakes.

pub mod cancel;
pub mod error;
pub mod stream;
pub mod tus;

pub use cancel::{CancelProbe, NeverCancelled};
pub use error::UploadError;
pub use stream::{MediaOrigin, StreamOrigin, VideoDetails};
pub use tus::TusClient;
