use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload session row. Its id doubles as the ingest job id, which is the
/// handle clients use to poll status and request cancellation.
///
/// The row outlives the files it references: `local_temp_path` is cleared
/// when staging files are removed, and the row itself is kept after the job
/// reaches a terminal state for auditing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UploadSession {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Resumable-upload session URL on the media origin, set as soon as the
    /// session is created so an open session can be resumed or aborted.
    pub remote_endpoint: Option<String>,
    pub local_temp_path: Option<String>,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
