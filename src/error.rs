//! Call error taxonomy.
//!
//! Every failure a caller can see is one of these recoverable values;
//! none terminate the process or the connection. Each variant carries a
//! stable wire kind plus a human-readable message.

use thiserror::Error;

use crate::store::StoreError;

/// Errors reported back to the caller as structured failures.
#[derive(Debug, Error)]
pub enum CallError {
    /// A governing rule failed. Rules that panic or whose async check
    /// fails are coerced to a denial and surface here, never as a crash.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The payload failed persistence-level validation after masking.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CallError {
    /// Stable wire kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::PermissionDenied(_) => "permission_denied",
            CallError::NotFound(_) => "not_found",
            CallError::ValidationFailed(_) => "validation_failed",
            CallError::MissingArgument(_) => "missing_argument",
            CallError::UnknownCollection(_) => "unknown_collection",
            CallError::Unsupported(_) => "unsupported_operation",
            CallError::Handler(_) => "handler_failed",
            CallError::Storage(_) => "storage_error",
        }
    }
}

impl From<StoreError> for CallError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Validation(message) => CallError::ValidationFailed(message),
            StoreError::Backend(message) => CallError::Storage(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(CallError::PermissionDenied("x".into()).kind(), "permission_denied");
        assert_eq!(CallError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(CallError::MissingArgument("id").kind(), "missing_argument");
    }

    #[test]
    fn test_store_validation_maps_to_validation_failed() {
        let error: CallError = StoreError::Validation("bad field".into()).into();
        assert_eq!(error.kind(), "validation_failed");

        let error: CallError = StoreError::Backend("disk gone".into()).into();
        assert_eq!(error.kind(), "storage_error");
    }
}
