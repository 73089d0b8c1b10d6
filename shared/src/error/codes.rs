//! Canonical backend failure codes
//!
//! The document store reports failures with the canonical status codes
//! shared by Google-style APIs. Only `permission-denied` changes control
//! flow on the client; the rest are carried for logging and messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend failure code
///
/// Serialized in the kebab-case form the store SDKs use
/// (`permission-denied`, `unavailable`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreErrorCode {
    /// Security rules rejected the request
    PermissionDenied,
    /// Caller is not authenticated
    Unauthenticated,
    /// Backend unreachable or temporarily down
    Unavailable,
    /// Deadline expired before the request completed
    DeadlineExceeded,
    /// Document does not exist
    NotFound,
    /// Document already exists
    AlreadyExists,
    /// Malformed request or payload
    InvalidArgument,
    /// Precondition on the document failed
    FailedPrecondition,
    /// Quota or rate limit hit
    ResourceExhausted,
    /// Backend internal error
    Internal,
    /// Anything else
    Unknown,
}

impl StoreErrorCode {
    /// Kebab-case code string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission-denied",
            Self::Unauthenticated => "unauthenticated",
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::NotFound => "not-found",
            Self::AlreadyExists => "already-exists",
            Self::InvalidArgument => "invalid-argument",
            Self::FailedPrecondition => "failed-precondition",
            Self::ResourceExhausted => "resource-exhausted",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }

    /// Map a REST status string (`PERMISSION_DENIED`) to a code
    pub fn from_status(status: &str) -> Self {
        match status {
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "UNAUTHENTICATED" => Self::Unauthenticated,
            "UNAVAILABLE" => Self::Unavailable,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "NOT_FOUND" => Self::NotFound,
            "ALREADY_EXISTS" => Self::AlreadyExists,
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "FAILED_PRECONDITION" => Self::FailedPrecondition,
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "INTERNAL" => Self::Internal,
            _ => Self::Unknown,
        }
    }

    /// Map an HTTP status to a code when the body carries no status string
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            400 => Self::InvalidArgument,
            412 => Self::FailedPrecondition,
            429 => Self::ResourceExhausted,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            500..=599 => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized code strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStoreErrorCode(pub String);

impl fmt::Display for InvalidStoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid store error code: {}", self.0)
    }
}

impl std::error::Error for InvalidStoreErrorCode {}

impl FromStr for StoreErrorCode {
    type Err = InvalidStoreErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s {
            "permission-denied" => Self::PermissionDenied,
            "unauthenticated" => Self::Unauthenticated,
            "unavailable" => Self::Unavailable,
            "deadline-exceeded" => Self::DeadlineExceeded,
            "not-found" => Self::NotFound,
            "already-exists" => Self::AlreadyExists,
            "invalid-argument" => Self::InvalidArgument,
            "failed-precondition" => Self::FailedPrecondition,
            "resource-exhausted" => Self::ResourceExhausted,
            "internal" => Self::Internal,
            "unknown" => Self::Unknown,
            other => return Err(InvalidStoreErrorCode(other.to_string())),
        };
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_string_roundtrip() {
        for code in [
            StoreErrorCode::PermissionDenied,
            StoreErrorCode::Unavailable,
            StoreErrorCode::FailedPrecondition,
            StoreErrorCode::Unknown,
        ] {
            assert_eq!(code.as_str().parse::<StoreErrorCode>().unwrap(), code);
        }
        assert!("bogus".parse::<StoreErrorCode>().is_err());
    }

    #[test]
    fn test_from_rest_status() {
        assert_eq!(
            StoreErrorCode::from_status("PERMISSION_DENIED"),
            StoreErrorCode::PermissionDenied
        );
        assert_eq!(StoreErrorCode::from_status("WHATEVER"), StoreErrorCode::Unknown);
        assert_eq!(
            StoreErrorCode::from_http_status(403),
            StoreErrorCode::PermissionDenied
        );
        assert_eq!(StoreErrorCode::from_http_status(502), StoreErrorCode::Internal);
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&StoreErrorCode::PermissionDenied).unwrap();
        assert_eq!(json, "\"permission-denied\"");
    }
}
