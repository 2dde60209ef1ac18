//! Upload error taxonomy

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Connection-level failure before any HTTP status was received.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The origin answered with an unexpected status.
    #[error("Protocol error: status {status}: {message}")]
    Protocol { status: u16, message: String },

    /// A required tus header was missing or unparseable.
    #[error("Missing or invalid header: {0}")]
    MissingHeader(&'static str),

    /// The session URL could not be interpreted.
    #[error("Invalid session URL: {0}")]
    InvalidSessionUrl(String),

    /// The bounded retry budget ran out. Terminal; the caller must not
    /// issue further requests for this attempt.
    #[error("Upload retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Box<UploadError>,
    },

    /// The cancel probe reported cancellation. Distinguished from failure
    /// so the job lands in the cancelled state.
    #[error("Upload cancelled by owner")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl UploadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_exhausted_carries_last_error() {
        let err = UploadError::RetriesExhausted {
            attempts: 10,
            last_error: Box::new(UploadError::Protocol {
                status: 502,
                message: "bad gateway".to_string(),
            }),
        };
        assert!(err.to_string().contains("10"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("502"));
    }

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(UploadError::Cancelled.is_cancelled());
        assert!(!UploadError::MissingHeader("Upload-Offset").is_cancelled());
    }
}
