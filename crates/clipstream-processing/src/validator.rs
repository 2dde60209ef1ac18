use std::path::Path;

/// Validation errors for video submissions
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Title is required")]
    TitleMissing,

    #[error("Title too long: {length} characters (max: {max})")]
    TitleTooLong { length: usize, max: usize },

    #[error("Invalid file extension: {extension} (allowed: {allowed:?})")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Video too long: {duration_secs:.1}s (max: {max_secs:.0}s)")]
    DurationTooLong { duration_secs: f64, max_secs: f64 },

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Empty file")]
    EmptyFile,
}

/// Submission validator
///
/// Read-only gate over a staged file and its declared metadata. Checks run
/// in a fixed order and stop at the first violation, so a response carries
/// exactly one structured error.
pub struct IngestValidator {
    max_file_size: u64,
    allowed_extensions: Vec<String>,
    max_title_chars: usize,
    max_duration_secs: f64,
}

impl IngestValidator {
    pub fn new(
        max_file_size: u64,
        allowed_extensions: Vec<String>,
        max_title_chars: usize,
        max_duration_secs: f64,
    ) -> Self {
        Self {
            max_file_size,
            allowed_extensions,
            max_title_chars,
            max_duration_secs,
        }
    }

    /// Validate the declared title
    pub fn validate_title(&self, title: &str) -> Result<(), ValidationError> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::TitleMissing);
        }

        let length = trimmed.chars().count();
        if length > self.max_title_chars {
            return Err(ValidationError::TitleTooLong {
                length,
                max: self.max_title_chars,
            });
        }

        Ok(())
    }

    /// Validate the file extension
    pub fn validate_extension(&self, filename: &str) -> Result<(), ValidationError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| ValidationError::InvalidFilename(filename.to_string()))?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }

        Ok(())
    }

    /// Validate the probed duration.
    ///
    /// `None` means the probe could not determine a duration (ffprobe missing
    /// or the container defeated it). The check is skipped in that case; the
    /// ceiling is enforced again downstream once the origin reports one.
    pub fn validate_duration(&self, duration_secs: Option<f64>) -> Result<(), ValidationError> {
        match duration_secs {
            Some(duration_secs) if duration_secs > self.max_duration_secs => {
                Err(ValidationError::DurationTooLong {
                    duration_secs,
                    max_secs: self.max_duration_secs,
                })
            }
            Some(_) => Ok(()),
            None => {
                tracing::warn!("Duration unavailable, skipping duration check");
                Ok(())
            }
        }
    }

    /// Validate file size
    pub fn validate_file_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Validate a full submission, stopping at the first violated rule.
    pub fn validate_submission(
        &self,
        title: &str,
        filename: &str,
        duration_secs: Option<f64>,
        file_size: u64,
    ) -> Result<(), ValidationError> {
        self.validate_title(title)?;
        self.validate_extension(filename)?;
        self.validate_duration(duration_secs)?;
        self.validate_file_size(file_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> IngestValidator {
        IngestValidator::new(
            250 * 1024 * 1024,
            vec!["mp4".to_string(), "mov".to_string()],
            200,
            600.0,
        )
    }

    #[test]
    fn test_validate_title_ok() {
        assert!(test_validator().validate_title("My vacation clip").is_ok());
    }

    #[test]
    fn test_validate_title_missing() {
        let validator = test_validator();
        assert!(matches!(
            validator.validate_title(""),
            Err(ValidationError::TitleMissing)
        ));
        assert!(matches!(
            validator.validate_title("   "),
            Err(ValidationError::TitleMissing)
        ));
    }

    #[test]
    fn test_validate_title_too_long() {
        let validator = test_validator();
        let long_title = "x".repeat(201);
        assert!(matches!(
            validator.validate_title(&long_title),
            Err(ValidationError::TitleTooLong { length: 201, max: 200 })
        ));
    }

    #[test]
    fn test_validate_title_at_limit() {
        let validator = test_validator();
        let title = "x".repeat(200);
        assert!(validator.validate_title(&title).is_ok());
    }

    #[test]
    fn test_validate_extension_ok() {
        let validator = test_validator();
        assert!(validator.validate_extension("clip.mp4").is_ok());
        assert!(validator.validate_extension("clip.MOV").is_ok()); // case insensitive
    }

    #[test]
    fn test_validate_extension_invalid() {
        let validator = test_validator();
        assert!(matches!(
            validator.validate_extension("clip.avi"),
            Err(ValidationError::InvalidExtension { .. })
        ));
    }

    #[test]
    fn test_validate_extension_none() {
        let validator = test_validator();
        assert!(matches!(
            validator.validate_extension("noextension"),
            Err(ValidationError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_validate_duration_ok() {
        assert!(test_validator().validate_duration(Some(599.9)).is_ok());
        assert!(test_validator().validate_duration(Some(600.0)).is_ok());
    }

    #[test]
    fn test_validate_duration_too_long() {
        assert!(matches!(
            test_validator().validate_duration(Some(600.1)),
            Err(ValidationError::DurationTooLong { .. })
        ));
    }

    #[test]
    fn test_validate_duration_unknown_is_skipped() {
        assert!(test_validator().validate_duration(None).is_ok());
    }

    #[test]
    fn test_validate_file_size_ok() {
        assert!(test_validator().validate_file_size(100 * 1024 * 1024).is_ok());
    }

    #[test]
    fn test_validate_file_size_too_large() {
        assert!(matches!(
            test_validator().validate_file_size(251 * 1024 * 1024),
            Err(ValidationError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_file_size_empty() {
        assert!(matches!(
            test_validator().validate_file_size(0),
            Err(ValidationError::EmptyFile)
        ));
    }

    #[test]
    fn test_validate_submission_ok() {
        assert!(test_validator()
            .validate_submission("Title", "clip.mp4", Some(120.0), 1024)
            .is_ok());
    }

    #[test]
    fn test_validate_submission_fails_fast_on_title() {
        // Title violation reported even though the extension is also bad.
        assert!(matches!(
            test_validator().validate_submission("", "clip.avi", Some(9999.0), 0),
            Err(ValidationError::TitleMissing)
        ));
    }

    #[test]
    fn test_validate_submission_duration_before_size() {
        assert!(matches!(
            test_validator().validate_submission("Title", "clip.mp4", Some(9999.0), 0),
            Err(ValidationError::DurationTooLong { .. })
        ));
    }
}
