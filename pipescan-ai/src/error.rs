//! Error types for pipescan-ai
//!
//! Three kinds of failure are kept apart:
//! - External service failures ([`ServiceError`]) degrade to "no result" at
//!   the call site and are logged, the pipeline continues
//! - Cancellation ([`AiError::Cancelled`]) terminates the enclosing operation
//!   without being treated as a failure
//! - Store and I/O failures propagate to the caller
//!
//! Validation and plausibility problems are never errors; they are recorded
//! as flags on the observation.

use crate::types::ServiceError;
use thiserror::Error;

/// pipescan-ai error type
#[derive(Debug, Error)]
pub enum AiError {
    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// External model service failure
    #[error("Service error: {0}")]
    Service(ServiceError),

    /// Knowledge base store error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// pipescan-common error
    #[error("Common error: {0}")]
    Common(#[from] pipescan_common::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AiError {
    /// True for cancellation, which callers must propagate instead of swallowing
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AiError::Cancelled | AiError::Service(ServiceError::Cancelled))
    }

    /// True when SQLite reported a lock conflict
    pub fn is_database_locked(&self) -> bool {
        match self {
            AiError::Database(db_err) => db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}

impl From<ServiceError> for AiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Cancelled => AiError::Cancelled,
            other => AiError::Service(other),
        }
    }
}

/// Convenience result type
pub type AiResult<T> = Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_service_error_maps_to_cancelled() {
        let err: AiError = ServiceError::Cancelled.into();
        assert!(matches!(err, AiError::Cancelled));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_timeout_is_not_cancellation() {
        let err: AiError = ServiceError::Timeout(30).into();
        assert!(!err.is_cancelled());
        assert!(matches!(err, AiError::Service(ServiceError::Timeout(30))));
    }

    #[test]
    fn test_non_database_error_is_not_locked() {
        let err = AiError::InvalidInput("database is locked".to_string());
        assert!(!err.is_database_locked());
    }
}
