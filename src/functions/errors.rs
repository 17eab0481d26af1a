//! # Function Errors

use thiserror::Error;

use crate::jsonfile::FileError;
use crate::kv::StoreError;

/// Result type for function operations
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Function errors
#[derive(Debug, Clone, Error)]
pub enum FunctionError {
    #[error("Function not found: {0}")]
    NotFound(String),

    #[error("Function already exists: {0}")]
    AlreadyExists(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Invalid retention period: {0} days (allowed: 7, 15, 30, 365)")]
    InvalidRetention(u32),

    #[error("Invalid state transition for execution {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FunctionError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            FunctionError::NotFound(_) => 404,
            FunctionError::VersionNotFound(_) => 404,
            FunctionError::ExecutionNotFound(_) => 404,
            FunctionError::AlreadyExists(_) => 409,
            FunctionError::InvalidRetention(_) => 400,
            FunctionError::InvalidTransition { .. } => 409,
            FunctionError::InvalidCron(_) => 400,
            FunctionError::Storage(_) => 500,
            FunctionError::Internal(_) => 500,
        }
    }
}

impl From<FileError> for FunctionError {
    fn from(e: FileError) -> Self {
        FunctionError::Storage(e.to_string())
    }
}

impl From<StoreError> for FunctionError {
    fn from(e: StoreError) -> Self {
        FunctionError::Storage(e.to_string())
    }
}
