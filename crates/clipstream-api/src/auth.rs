//! Owner identity extraction
//!
//! Real authentication happens at the upstream gateway, which injects the
//! authenticated owner as the `x-owner-id` header. Requests without it are
//! rejected; nothing here verifies credentials.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use clipstream_core::AppError;

use crate::error::HttpAppError;

pub const OWNER_ID_HEADER: &str = "x-owner-id";

/// Authenticated owner of the request.
#[derive(Debug, Clone, Copy)]
pub struct OwnerId(pub Uuid);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                HttpAppError(AppError::Forbidden(format!(
                    "Missing {} header",
                    OWNER_ID_HEADER
                )))
            })?;

        let owner_id = raw.parse::<Uuid>().map_err(|_| {
            HttpAppError(AppError::InvalidInput(format!(
                "{} must be a UUID",
                OWNER_ID_HEADER
            )))
        })?;

        Ok(OwnerId(owner_id))
    }
}
