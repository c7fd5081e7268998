//! Error taxonomy for the observer library
//!
//! Construction and bounds errors fail fast at the call site. Platform
//! errors carry a [`PlatformErrorKind`] so the retry policy can decide
//! whether to try again.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Classification of failures reported by the platform's health and
/// cluster APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformErrorKind {
    Timeout,
    Unavailable,
    Busy,
    NotFound,
    /// A newer report already exists for the same key
    StaleReport,
    InvalidArgument,
    Unauthorized,
    Cancelled,
    Other,
}

impl std::fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlatformErrorKind::Timeout => "timeout",
            PlatformErrorKind::Unavailable => "unavailable",
            PlatformErrorKind::Busy => "busy",
            PlatformErrorKind::NotFound => "not_found",
            PlatformErrorKind::StaleReport => "stale_report",
            PlatformErrorKind::InvalidArgument => "invalid_argument",
            PlatformErrorKind::Unauthorized => "unauthorized",
            PlatformErrorKind::Cancelled => "cancelled",
            PlatformErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors produced by the observer library
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ObserverError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("platform error ({kind}): {message}")]
    Platform {
        kind: PlatformErrorKind,
        message: String,
    },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl ObserverError {
    pub fn platform(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        ObserverError::Platform {
            kind,
            message: message.into(),
        }
    }

    /// Platform classification used by the retry policy
    pub fn platform_kind(&self) -> PlatformErrorKind {
        match self {
            ObserverError::Platform { kind, .. } => *kind,
            ObserverError::Timeout(_) => PlatformErrorKind::Timeout,
            ObserverError::Cancelled => PlatformErrorKind::Cancelled,
            ObserverError::InvalidArgument(_) => PlatformErrorKind::InvalidArgument,
            _ => PlatformErrorKind::Other,
        }
    }

    /// Returns true if this error, possibly wrapped in an `anyhow::Error`,
    /// is a cancellation
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<ObserverError>(),
            Some(ObserverError::Cancelled)
        )
    }
}

pub type ObserverResult<T> = std::result::Result<T, ObserverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_kind_mapping() {
        let err = ObserverError::platform(PlatformErrorKind::Busy, "throttled");
        assert_eq!(err.platform_kind(), PlatformErrorKind::Busy);
        assert_eq!(
            ObserverError::Timeout(Duration::from_secs(1)).platform_kind(),
            PlatformErrorKind::Timeout
        );
        assert_eq!(
            ObserverError::InvalidOperation("empty".into()).platform_kind(),
            PlatformErrorKind::Other
        );
    }

    #[test]
    fn test_cancellation_through_anyhow() {
        let err: anyhow::Error = ObserverError::Cancelled.into();
        assert!(ObserverError::is_cancellation(&err));

        let other = anyhow::anyhow!("boom");
        assert!(!ObserverError::is_cancellation(&other));
    }

    #[test]
    fn test_error_display() {
        let err = ObserverError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(err.to_string(), "index 4 is out of range for length 2");
    }
}
