//! Common error types and classification shared across Relay crates
//!
//! The error handling system has three pieces:
//!
//! 1. **`CommonError`**: generic failure shapes used by the primitives in this
//!    crate (invalid configuration, timeouts, serialization).
//! 2. **`ErrorClassification`**: the interface every error in the workspace
//!    implements so retry loops and log routing can ask the same questions of
//!    any error.
//! 3. **`ErrorSeverity`**: the severity scale used for log levels and
//!    alerting.
//!
//! Domain errors compose with these rather than duplicating them:
//!
//! ```rust,ignore
//! impl ErrorClassification for IntegrationError {
//!     fn is_retryable(&self) -> bool { self.is_transient() }
//!     fn severity(&self) -> ErrorSeverity { /* ... */ }
//!     fn is_critical(&self) -> bool { /* ... */ }
//!     fn retry_after(&self) -> Option<Duration> { /* ... */ }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Common error variants that appear across multiple modules
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommonError {
    /// Configuration-related errors
    #[error("Configuration error in field '{field}': {message}")]
    Config { field: String, message: String },

    /// Serialization or deserialization errors
    #[error("Serialization error ({format}): {message}")]
    Serialization { format: String, message: String },

    /// Timeout errors
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// Storage errors (file I/O and similar)
    #[error("Storage error during '{operation}': {message}")]
    Storage { operation: String, message: String },

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CommonError {
    /// Build a configuration error for a named field
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { field: field.into(), message: message.into() }
    }

    /// Build a serialization error for a named format ("JSON", "TOML")
    pub fn serialization_format(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization { format: format.into(), message: message.into() }
    }

    /// Build a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Build a storage error
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage { operation: operation.into(), message: message.into() }
    }

    /// Build an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Storage { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Config { .. } | Self::Serialization { .. } | Self::Storage { .. } => {
                ErrorSeverity::Error
            }
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_format("JSON", err.to_string())
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::storage("io", err.to_string())
    }
}

/// Standard classification interface for errors
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again: network timeouts, rate limiting, temporary unavailability.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when the failure carried a specific hint
    /// (for example a `Retry-After` header).
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error classification.
    use super::*;

    /// Validates the severity ordering scenario.
    ///
    /// Assertions:
    /// - Confirms `Info < Warning < Error < Critical`.
    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
    }

    /// Validates `CommonError` classification for each variant.
    ///
    /// Assertions:
    /// - Timeouts are retryable warnings.
    /// - Config errors are not retryable.
    /// - Internal errors are critical.
    #[test]
    fn test_common_error_classification() {
        let timeout = CommonError::timeout("acquire", Duration::from_secs(1));
        assert!(timeout.is_retryable());
        assert_eq!(timeout.severity(), ErrorSeverity::Warning);

        let config = CommonError::config("capacity", "must be greater than 0");
        assert!(!config.is_retryable());
        assert_eq!(config.to_string(), "Configuration error in field 'capacity': must be greater than 0");

        assert!(CommonError::internal("bug").is_critical());
    }

    /// Validates conversion from `serde_json::Error`.
    ///
    /// Assertions:
    /// - The converted error is a `Serialization` variant tagged "JSON".
    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let common: CommonError = err.into();
        assert!(matches!(common, CommonError::Serialization { ref format, .. } if format == "JSON"));
    }
}
