//! Job execution error types
//!
//! This module provides error types specifically for job execution, allowing
//! a job handler to indicate whether an error is recoverable (should be
//! retried), terminal (should fail immediately), or the distinguished
//! cancelled outcome (the owner asked the job to stop).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobErrorKind {
    Recoverable,
    Terminal,
    Cancelled,
}

/// Job execution error carrying the retry decision for the queue.
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    kind: JobErrorKind,
}

impl JobError {
    /// Create a terminal job error.
    ///
    /// Terminal errors fail the job immediately without retrying. Use this
    /// for errors like:
    /// - Transcode failures (the input will not change on retry)
    /// - Exhausted upload retries (the client already retried internally)
    /// - Catalog commit failures
    pub fn terminal(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            kind: JobErrorKind::Terminal,
        }
    }

    /// Create a recoverable job error.
    ///
    /// Recoverable errors are retried according to the job's retry policy.
    /// Use this for errors like:
    /// - Transient infrastructure failures outside the upload loop
    /// - Temporary resource unavailability
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            kind: JobErrorKind::Recoverable,
        }
    }

    /// Create the cancelled outcome. The queue marks the job cancelled
    /// rather than failed, and never retries it.
    pub fn cancelled() -> Self {
        Self {
            inner: anyhow::anyhow!(crate::models::job::CANCELLED_BY_USER),
            kind: JobErrorKind::Cancelled,
        }
    }

    /// Check if this error is recoverable (should be retried)
    pub fn is_recoverable(&self) -> bool {
        self.kind == JobErrorKind::Recoverable
    }

    /// Check if this error is the cancelled outcome
    pub fn is_cancelled(&self) -> bool {
        self.kind == JobErrorKind::Cancelled
    }

    /// Get the inner error
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    /// Consume self and return the inner error
    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Default conversion from anyhow::Error creates a recoverable error
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

// Note: From<JobError> for anyhow::Error is automatically implemented by
// anyhow via its blanket implementation for std::error::Error types.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_error() {
        let err = JobError::terminal(anyhow::anyhow!("ffmpeg exited with status 1"));
        assert!(!err.is_recoverable());
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("ffmpeg"));
    }

    #[test]
    fn test_recoverable_error() {
        let err = JobError::recoverable(anyhow::anyhow!("Network timeout"));
        assert!(err.is_recoverable());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_outcome() {
        let err = JobError::cancelled();
        assert!(err.is_cancelled());
        assert!(!err.is_recoverable());
        assert_eq!(
            err.to_string(),
            crate::models::job::CANCELLED_BY_USER
        );
    }

    #[test]
    fn test_from_anyhow() {
        let err: JobError = anyhow::anyhow!("Some error").into();
        assert!(err.is_recoverable(), "Default should be recoverable");
    }

}
