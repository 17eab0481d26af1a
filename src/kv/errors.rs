//! # Store Errors

use thiserror::Error;

use crate::jsonfile::FileError;

/// Result type for namespaced store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Namespaced store errors
///
/// `NotFound` is a normal outcome for a lookup and is kept apart from
/// `Backend`, which signals that the store itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error only reports an absent key
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<FileError> for StoreError {
    fn from(e: FileError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = StoreError::NotFound("counter".into());
        assert_eq!(err.to_string(), "key not found: counter");
        assert!(err.is_not_found());
        assert!(!StoreError::Backend("io".into()).is_not_found());
    }
}
