//! Backend error types
//!
//! - [`StoreErrorCode`]: canonical failure codes reported by the document store
//! - [`StoreError`]: a failed store call, code plus message
//!
//! # Example
//!
//! ```
//! use shared::error::{StoreError, StoreErrorCode};
//!
//! let err = StoreError::permission_denied("Missing or insufficient permissions.");
//! assert!(err.is_permission_denied());
//! assert_eq!(err.code, StoreErrorCode::PermissionDenied);
//! ```

mod codes;

pub use codes::{InvalidStoreErrorCode, StoreErrorCode};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failed call against the document store
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::PermissionDenied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Internal, message)
    }

    /// The one failure the client never retries
    pub fn is_permission_denied(&self) -> bool {
        self.code == StoreErrorCode::PermissionDenied
    }
}

/// Result type for store calls
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = StoreError::unavailable("backend down");
        assert_eq!(err.to_string(), "unavailable: backend down");
        assert!(!err.is_permission_denied());
    }
}
