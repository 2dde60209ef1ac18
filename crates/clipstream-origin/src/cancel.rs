//! Cooperative cancellation probe
//!
//! The upload loop asks the probe before sending each chunk. Production
//! wires this to a fresh database read of the session's cancel flag, so a
//! cancellation request lands within one chunk of work.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CancelProbe: Send + Sync {
    /// Returns true once the owner has requested cancellation. Must read
    /// fresh state on every call; cached answers defeat the protocol.
    async fn is_cancelled(&self) -> Result<bool>;
}

/// Probe that never reports cancellation. For tooling and tests.
pub struct NeverCancelled;

#[async_trait]
impl CancelProbe for NeverCancelled {
    async fn is_cancelled(&self) -> Result<bool> {
        Ok(false)
    }
}
