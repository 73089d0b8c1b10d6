//! Client error types

use shared::error::StoreError;
use thiserror::Error;

/// Sync client error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Reachability probe failed
    #[error("Network error: {0}")]
    Network(String),

    /// Backend client did not become ready in time
    #[error("SDK load error: {0}")]
    SdkLoad(String),

    /// Backend rejected the request (security rules)
    #[error("Permission denied: {0}")]
    Permission(String),

    /// No session / subscription yet
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Create / update / delete failed
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Required form field missing or invalid
    #[error("Validation error: {0}")]
    Validation(String),

    /// Handshake failed for any other reason
    #[error("Initialization failed: {0}")]
    Init(String),

    /// CSV export failed
    #[error("Export failed: {0}")]
    Export(String),
}

impl SyncError {
    /// Whether the connect loop may try again after this failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permission(_) | Self::SdkLoad(_))
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }

    /// Message without the variant prefix, for user-facing notifications
    pub fn detail(&self) -> &str {
        match self {
            Self::Network(msg)
            | Self::SdkLoad(msg)
            | Self::Permission(msg)
            | Self::NotReady(msg)
            | Self::Operation(msg)
            | Self::Validation(msg)
            | Self::Init(msg)
            | Self::Export(msg) => msg,
        }
    }

    /// Classify a store failure raised during the connect handshake
    pub fn from_handshake(err: StoreError) -> Self {
        if err.is_permission_denied() {
            Self::Permission(err.message)
        } else {
            Self::Init(err.to_string())
        }
    }

    /// Classify a store failure raised by a record operation
    pub fn from_operation(err: StoreError) -> Self {
        if err.is_permission_denied() {
            Self::Permission(err.message)
        } else {
            Self::Operation(err.to_string())
        }
    }
}

/// Result type for sync client operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(SyncError::Network("offline".into()).is_retryable());
        assert!(SyncError::Init("boom".into()).is_retryable());
        assert!(!SyncError::Permission("denied".into()).is_retryable());
        assert!(!SyncError::SdkLoad("timeout".into()).is_retryable());
    }

    #[test]
    fn test_store_error_classification() {
        let denied = StoreError::permission_denied("rules");
        assert_eq!(
            SyncError::from_handshake(denied.clone()),
            SyncError::Permission("rules".into())
        );
        assert!(SyncError::from_operation(denied).is_permission());

        let down = StoreError::unavailable("down");
        assert!(matches!(SyncError::from_handshake(down.clone()), SyncError::Init(_)));
        assert!(matches!(SyncError::from_operation(down), SyncError::Operation(_)));
    }
}
