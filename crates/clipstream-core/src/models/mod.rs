pub mod job;
pub mod session;
pub mod video;

pub use job::{
    IngestJob, IngestJobPayload, IngestOutcome, JobKind, JobPayload, JobResponse, JobState,
    CANCELLED_BY_USER,
};
pub use session::UploadSession;
pub use video::{VideoRecord, VideoSubmission};
