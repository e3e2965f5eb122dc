//! Service error types.

use crate::assets::AssetError;
use crate::executor::{AdmissionError, PoolError};
use crate::payload::PayloadError;
use thiserror::Error;

/// Errors that can occur during service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request input was rejected before admission.
    #[error("Invalid request: {0}")]
    Payload(#[from] PayloadError),

    /// No asset could be resolved for the request.
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// The scheduler refused the job.
    #[error("Request refused: {0}")]
    Admission(#[from] AdmissionError),

    /// The session pool could not be started.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// The service has been shut down.
    #[error("Service not running")]
    NotRunning,
}

impl ServiceError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Admission(e) => !matches!(e, AdmissionError::ShuttingDown),
            Self::Pool(e) => !matches!(e, PoolError::Closed),
            Self::Payload(_) | Self::Asset(_) | Self::NotRunning => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ServiceError::Admission(AdmissionError::RateLimited).is_retryable());
        assert!(ServiceError::Admission(AdmissionError::QueueFull { capacity: 1 }).is_retryable());
        assert!(!ServiceError::Admission(AdmissionError::ShuttingDown).is_retryable());
        assert!(!ServiceError::Payload(PayloadError::EmptyText).is_retryable());
        assert!(!ServiceError::NotRunning.is_retryable());
        assert!(ServiceError::Pool(PoolError::Cancelled).is_retryable());
        assert!(!ServiceError::Pool(PoolError::Closed).is_retryable());
    }

    #[test]
    fn test_display_wraps_source() {
        let err = ServiceError::from(PayloadError::EmptyText);
        assert_eq!(err.to_string(), "Invalid request: caption text is empty");
    }
}
