//! Error types for the certificate importer

use thiserror::Error;

/// Main error type for certificate import operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// An ACM API call failed
    #[error("ACM {operation} failed: {message}")]
    Acm {
        /// ACM operation name (e.g. "ImportCertificate")
        operation: &'static str,
        /// Description of what failed
        message: String,
    },

    /// ACM reported that the certificate does not exist
    #[error("ACM certificate not found: {0}")]
    AcmNotFound(String),

    /// A Certificate resource cannot be processed as given
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an ACM error for the named operation
    pub fn acm(operation: &'static str, msg: impl Into<String>) -> Self {
        Self::Acm {
            operation,
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the error means the target object is already gone
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::AcmNotFound(_) => true,
            Error::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }

    /// Check if retrying the same call could succeed
    ///
    /// Kubernetes 4xx responses other than 409 Conflict need the object to
    /// change first. ACM call failures are treated as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(ae)) => ae.code == 409 || !(400..500).contains(&ae.code),
            Error::Kube(_) => true,
            Error::Acm { .. } => true,
            Error::AcmNotFound(_) => false,
            Error::Validation(_) => false,
            Error::Internal(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    /// Story: ACM failures name the operation that failed
    ///
    /// Import and tagging are separate calls, so an operator reading the log
    /// must be able to tell a failed import from a failed tag assignment.
    #[test]
    fn story_acm_errors_name_the_failing_operation() {
        let err = Error::acm("AddTagsToCertificate", "throttled");
        assert!(err.to_string().contains("AddTagsToCertificate"));
        assert!(err.to_string().contains("throttled"));
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_covers_acm_and_kubernetes() {
        assert!(Error::AcmNotFound("arn:aws:acm:x".to_string()).is_not_found());
        assert!(api_error(404).is_not_found());
        assert!(!api_error(500).is_not_found());
        assert!(!Error::acm("DeleteCertificate", "boom").is_not_found());
    }

    #[test]
    fn conflicts_are_retryable_but_other_client_errors_are_not() {
        assert!(api_error(409).is_retryable());
        assert!(api_error(503).is_retryable());
        assert!(!api_error(422).is_retryable());
        assert!(!Error::validation("certificate has no namespace").is_retryable());
    }
}
