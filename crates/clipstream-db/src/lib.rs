//! Clipstream database layer
//!
//! Repositories over the Postgres schema (jobs, upload sessions, video
//! catalog), connection setup, and the in-process listing cache.

pub mod cache;
pub mod job;
pub mod session;
pub mod setup;
pub mod video;

pub use cache::{ListingCache, MemoryListingCache};
pub use job::{JobRepository, JOB_NOTIFY_CHANNEL};
pub use session::SessionRepository;
pub use setup::setup_database;
pub use video::VideoRepository;
