use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog row for a published video. Written exactly once per successful
/// ingest; there is no partially-visible intermediate state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Object identifier on the remote media origin.
    pub uid: String,
    pub title: String,
    pub description: Option<String>,
    pub playback_url: String,
    pub thumbnail_url: String,
    pub duration_secs: Option<i64>,
    pub keywords: Vec<String>,
    pub locations: Vec<String>,
    pub brand_tags: Vec<String>,
    pub is_draft: bool,
    pub is_scheduled: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub age_restricted: bool,
    pub paid_promotion: bool,
    pub created_at: DateTime<Utc>,
}

/// Typed, validated submission metadata parsed from the upload request.
///
/// Parsed once at the HTTP boundary and carried through the job payload, so
/// the worker never re-reads raw form fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSubmission {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub brand_tags: Vec<String>,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub is_scheduled: bool,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub age_restricted: bool,
    #[serde(default)]
    pub paid_promotion: bool,
}

impl VideoSubmission {
    pub fn new(title: String) -> Self {
        Self {
            title,
            description: None,
            keywords: Vec::new(),
            locations: Vec::new(),
            brand_tags: Vec::new(),
            is_draft: false,
            is_scheduled: false,
            scheduled_at: None,
            age_restricted: false,
            paid_promotion: false,
        }
    }
}
