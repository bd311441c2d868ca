//! Error types for filedrop.

use thiserror::Error;

/// Message shown for anything in the "file unavailable" family.
pub const UNAVAILABLE_MESSAGE: &str = "That file link is invalid or has expired.";

/// Message shown for anything in the "upload failed" family.
pub const RETRY_MESSAGE: &str = "Upload failed, please retry.";

/// Common error type for filedrop.
#[derive(Error, Debug)]
pub enum DropError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata or blob could not be persisted.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The identifier space is saturated.
    ///
    /// Raised after `attempts` consecutive collisions instead of looping forever.
    #[error("identifier space exhausted after {attempts} attempts")]
    AllocationExhausted { attempts: usize },

    /// No live metadata record for the identifier.
    #[error("{0} not found")]
    NotFound(String),

    /// A metadata record exists but its blob is gone.
    #[error("blob missing for {0}")]
    BlobMissing(String),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DropError {
    /// Whether this error belongs to the "file unavailable" family.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DropError::NotFound(_) | DropError::BlobMissing(_))
    }

    /// Whether this error belongs to the "upload failed, retry" family.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            DropError::Io(_) | DropError::Persistence(_) | DropError::AllocationExhausted { .. }
        )
    }

    /// The uniform user-facing text for this error.
    ///
    /// Internal details never leak: callers get one of two fixed messages,
    /// except for validation and configuration errors which describe the input.
    pub fn user_message(&self) -> String {
        if self.is_not_found() {
            UNAVAILABLE_MESSAGE.to_string()
        } else if self.is_persistence() {
            RETRY_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Result type alias for filedrop operations.
pub type Result<T> = std::result::Result<T, DropError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error_display() {
        let err = DropError::NotFound("file ab12".to_string());
        assert_eq!(err.to_string(), "file ab12 not found");
    }

    #[test]
    fn test_allocation_exhausted_display() {
        let err = DropError::AllocationExhausted { attempts: 1000 };
        assert_eq!(
            err.to_string(),
            "identifier space exhausted after 1000 attempts"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        let err: DropError = io_err.into();
        assert!(matches!(err, DropError::Io(_)));
        assert!(err.to_string().contains("read-only fs"));
    }

    #[test]
    fn test_families() {
        assert!(DropError::NotFound("x".into()).is_not_found());
        assert!(DropError::BlobMissing("x".into()).is_not_found());
        assert!(!DropError::BlobMissing("x".into()).is_persistence());

        assert!(DropError::Persistence("x".into()).is_persistence());
        assert!(DropError::AllocationExhausted { attempts: 1 }.is_persistence());
        assert!(DropError::Io(std::io::Error::other("x")).is_persistence());
        assert!(!DropError::Persistence("x".into()).is_not_found());

        assert!(!DropError::Validation("x".into()).is_not_found());
        assert!(!DropError::Validation("x".into()).is_persistence());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let missing = DropError::BlobMissing("uploads/ab12".into());
        assert_eq!(missing.user_message(), UNAVAILABLE_MESSAGE);

        let failed = DropError::Persistence("disk full at /var/uploads".into());
        assert_eq!(failed.user_message(), RETRY_MESSAGE);

        let invalid = DropError::Validation("file too large".into());
        assert_eq!(invalid.user_message(), "validation error: file too large");
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(DropError::NotFound("test".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
