//! Data store error types

use docload_resilience::Retryable;
use std::time::Duration;

/// Result alias for data store operations
pub type DataStoreResult<T> = Result<T, DataStoreError>;

/// Error type for data store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum DataStoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {operation}: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No user credentials set for {0}")]
    MissingCredentials(&'static str),
}

impl DataStoreError {
    pub fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
        DataStoreError::InvalidResponse {
            operation,
            message: message.into(),
        }
    }
}

impl Retryable for DataStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            DataStoreError::Network(_) | DataStoreError::Timeout(_) => true,
            DataStoreError::Status { status, .. } => *status == 429 || *status >= 500,
            DataStoreError::InvalidResponse { .. }
            | DataStoreError::InvalidUrl(_)
            | DataStoreError::MissingCredentials(_) => false,
        }
    }

    fn retry_delay(&self) -> Option<Duration> {
        match self {
            // Give an overloaded service a moment before hammering it again
            DataStoreError::Status { status: 503, .. } => Some(Duration::from_millis(500)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> DataStoreError {
        DataStoreError::Status {
            operation: "bulk_docs",
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DataStoreError::Network("reset".into()).is_retryable());
        assert!(DataStoreError::Timeout("120s".into()).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(409).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!DataStoreError::invalid_response("changes", "bad json").is_retryable());
    }

    #[test]
    fn test_unavailable_has_custom_delay() {
        assert_eq!(status(503).retry_delay(), Some(Duration::from_millis(500)));
        assert_eq!(status(500).retry_delay(), None);
    }
}
