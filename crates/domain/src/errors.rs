//! Error taxonomy of the integration core
//!
//! Every failure `execute` can return is one of these variants. The enum is
//! `Clone` so that one refresh failure can be handed to every caller waiting
//! on the same single-flight refresh.

use std::time::Duration;

use relay_common::{ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_status_conversions;
use crate::types::ServiceId;

/// Why a token could not be obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    /// Refresh token rejected upstream; an operator must re-authorize
    ReauthorizationRequired,
    /// Refresh failed for a reason that may clear up on its own
    Transient,
}

impl_domain_status_conversions!(AuthErrorKind {
    ReauthorizationRequired => "reauthorization_required",
    Transient => "transient",
});

/// Classified upstream HTTP outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// 4xx the caller must fix
    ClientError,
    /// 5xx that persisted through retries
    ServerError,
    /// Timeout or connection failure that persisted through retries
    Transient,
}

impl_domain_status_conversions!(ApiErrorKind {
    ClientError => "client_error",
    ServerError => "server_error",
    Transient => "transient",
});

/// Failure of a dispatched call or one of its stages
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    /// Unknown service, missing credentials or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error for {service} ({kind}): {message}")]
    Auth { service: ServiceId, kind: AuthErrorKind, message: String },

    /// Bucket exhausted in fail-fast mode
    #[error("Rate limited for {service}")]
    RateLimited { service: ServiceId, retry_after: Option<Duration> },

    /// Bucket stayed exhausted for the whole blocking window
    #[error("Timed out after {waited:?} waiting for rate limit admission for {service}")]
    RateLimitTimeout { service: ServiceId, waited: Duration },

    #[error("API error ({kind}{}): {message}", status_suffix(.status))]
    Api { kind: ApiErrorKind, status: Option<u16>, message: String },

    /// Request may or may not have been applied upstream
    #[error("Ambiguous outcome for {service}/{operation}: {message}")]
    AmbiguousOutcome { service: ServiceId, operation: String, message: String },

    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    #[error("Token store error: {0}")]
    Storage(String),

    /// Caller cancelled before the request was sent
    #[error("Cancelled before the request was sent")]
    Cancelled,
}

impl IntegrationError {
    /// Invalid configuration
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Service missing from the configuration
    pub fn unknown_service(service: &ServiceId) -> Self {
        Self::Config(format!("unknown service '{service}'"))
    }

    /// Service has no usable OAuth client
    pub fn missing_credentials(service: &ServiceId) -> Self {
        Self::Config(format!("missing credentials for service '{service}'"))
    }

    /// Refresh token rejected; a person has to authorize again
    pub fn reauthorization_required(service: ServiceId, message: impl Into<String>) -> Self {
        Self::Auth { service, kind: AuthErrorKind::ReauthorizationRequired, message: message.into() }
    }

    /// Refresh failed in a way that may succeed later
    pub fn auth_transient(service: ServiceId, message: impl Into<String>) -> Self {
        Self::Auth { service, kind: AuthErrorKind::Transient, message: message.into() }
    }

    /// Upstream API failure
    pub fn api(kind: ApiErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api { kind, status, message: message.into() }
    }

    /// Token store failure
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Audit sink failure
    pub fn audit_write(message: impl Into<String>) -> Self {
        Self::AuditWrite(message.into())
    }

    /// Stable snake_case label for logs and audit records
    pub fn label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Auth { kind: AuthErrorKind::ReauthorizationRequired, .. } => {
                "auth_reauthorization_required"
            }
            Self::Auth { kind: AuthErrorKind::Transient, .. } => "auth_transient",
            Self::RateLimited { .. } => "rate_limited",
            Self::RateLimitTimeout { .. } => "rate_limit_timeout",
            Self::Api { kind: ApiErrorKind::ClientError, .. } => "api_client_error",
            Self::Api { kind: ApiErrorKind::ServerError, .. } => "api_server_error",
            Self::Api { kind: ApiErrorKind::Transient, .. } => "api_transient",
            Self::AmbiguousOutcome { .. } => "ambiguous_outcome",
            Self::AuditWrite(_) => "audit_write_error",
            Self::Storage(_) => "storage_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// "Needs human action": nothing will change until someone intervenes
    pub fn requires_operator_action(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Auth { kind: AuthErrorKind::ReauthorizationRequired, .. }
        )
    }

    /// "Try again later"
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::RateLimitTimeout { .. }
                | Self::Auth { kind: AuthErrorKind::Transient, .. }
                | Self::Api { kind: ApiErrorKind::Transient | ApiErrorKind::ServerError, .. }
        )
    }

    /// HTTP status carried by the error, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }
}

impl ErrorClassification for IntegrationError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::AuditWrite(_) => ErrorSeverity::Critical,
            Self::Config(_)
            | Self::Auth { kind: AuthErrorKind::ReauthorizationRequired, .. }
            | Self::AmbiguousOutcome { .. }
            | Self::Storage(_) => ErrorSeverity::Error,
            Self::Auth { kind: AuthErrorKind::Transient, .. }
            | Self::RateLimited { .. }
            | Self::RateLimitTimeout { .. }
            | Self::Api { .. } => ErrorSeverity::Warning,
            Self::Cancelled => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(", status {s}")).unwrap_or_default()
}

/// Result type alias for integration operations
pub type Result<T> = std::result::Result<T, IntegrationError>;
