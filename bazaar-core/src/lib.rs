pub mod carrier;
pub mod notify;

pub use carrier::{CarrierError, CarrierGateway};
pub use notify::{dispatch_best_effort, LogSink, NotificationSink};

/// Error taxonomy shared by every component of the fulfilment core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed or missing input. Nothing was mutated.
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Duplicate creation, double decision, concurrent modification.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// An intentional business-rule rejection.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error(transparent)]
    Carrier(#[from] CarrierError),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    /// Stable machine-readable kind used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::ValidationError(_) => "validation_error",
            CoreError::NotFound(_) => "not_found",
            CoreError::Conflict(_) => "conflict",
            CoreError::InvalidOperation(_) => "invalid_operation",
            CoreError::Carrier(_) => "carrier_error",
            CoreError::InternalError(_) => "internal",
        }
    }

    /// Carrier failures are the only kind a caller may blindly retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Carrier(CarrierError::Unavailable(_))
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carrier_error_converts() {
        let err: CoreError = CarrierError::Unavailable("timeout after 15s".to_string()).into();
        assert_eq!(err.kind(), "carrier_error");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Carrier unavailable: timeout after 15s");
    }

    #[test]
    fn test_business_rejection_is_not_retryable() {
        let err = CoreError::InvalidOperation("returns not allowed for upfront model".to_string());
        assert_eq!(err.kind(), "invalid_operation");
        assert!(!err.is_retryable());
    }
}
