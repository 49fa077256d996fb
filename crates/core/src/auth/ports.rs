//! Port interfaces for credential lifecycle
//!
//! These traits define the boundaries between the token manager and the
//! infrastructure that persists credentials and talks to the OAuth endpoint.

use std::time::Duration;

use async_trait::async_trait;
use relay_domain::{Credential, Result, ServiceConfig, ServiceId, TokenGrant};
use thiserror::Error;

/// Durable storage of one credential record per service
///
/// Pure data access. Failures surface as `IntegrationError::Storage`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Stored credential for `service`, if any
    async fn load(&self, service: &ServiceId) -> Result<Option<Credential>>;

    /// Replace the stored credential for `credential.service`
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Forget the credential for `service`; deleting a missing record is not
    /// an error
    async fn delete(&self, service: &ServiceId) -> Result<()>;
}

/// Failure of one refresh-token grant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The refresh token was rejected (`invalid_grant` or equivalent)
    #[error("refresh token rejected: {0}")]
    InvalidGrant(String),

    /// The client itself was rejected (`invalid_client`, unsupported grant,
    /// missing client credentials); the refresh token is still good
    #[error("refresh client misconfigured: {0}")]
    Config(String),

    /// Network failure, timeout, 5xx or 429 from the token endpoint
    #[error("transient refresh failure: {message}")]
    Transient {
        /// What went wrong
        message: String,
        /// Server-requested delay before the next attempt
        retry_after: Option<Duration>,
    },
}

impl RefreshError {
    /// Transient failure without a retry hint
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into(), retry_after: None }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Performs the OAuth refresh-token grant against a service's token endpoint
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `refresh_token` for a new access token
    async fn refresh(
        &self,
        service: &ServiceId,
        config: &ServiceConfig,
        refresh_token: &str,
    ) -> std::result::Result<TokenGrant, RefreshError>;
}
