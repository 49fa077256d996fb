//! OAuth refresh-token grant over HTTP
//!
//! Some providers answer a rejected grant with `200 OK` and an `error`
//! member in the body, so the body is inspected regardless of status.
//! Throttling of the token endpoint is reported as a 400 with an
//! `error_description` mentioning too many requests; that case is transient.
//!
//! Only a rejected refresh token (`invalid_grant` and its provider aliases)
//! is reported as [`RefreshError::InvalidGrant`]. A rejected client is
//! [`RefreshError::Config`]; everything else is transient.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use relay_core::{parse_retry_after, RefreshError, TokenRefresher};
use relay_domain::{ServiceConfig, ServiceId, TokenGrant};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};

/// [`TokenRefresher`] posting `grant_type=refresh_token` to the service's
/// token URL
#[derive(Debug, Clone)]
pub struct OAuthRefreshClient {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl OAuthRefreshClient {
    /// Post grants with `client`
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, timeout: None }
    }

    /// Override the per-service request timeout for token calls
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefreshClient {
    #[instrument(skip_all, fields(service = %service))]
    async fn refresh(
        &self,
        service: &ServiceId,
        config: &ServiceConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, RefreshError> {
        let (client_id, client_secret) = config.client_credentials().ok_or_else(|| {
            RefreshError::Config(format!("client credentials for '{service}' are not configured"))
        })?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let response = self
            .client
            .post(&config.token_url)
            .form(&form)
            .timeout(self.timeout.unwrap_or_else(|| config.request_timeout()))
            .send()
            .await
            .map_err(|err| RefreshError::transient(format!("token endpoint unreachable: {err}")))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_retry_after(value, Utc::now()));
        let body = response
            .bytes()
            .await
            .map_err(|err| RefreshError::transient(format!("token response interrupted: {err}")))?;
        debug!(status = status.as_u16(), "token endpoint responded");

        classify_response(status, retry_after, &body)
    }
}

/// OAuth error codes meaning the refresh token itself is no longer valid
const REJECTED_TOKEN_ERRORS: &[&str] = &["invalid_grant", "invalid_code", "invalid_token"];

/// OAuth error codes meaning the client registration or request is wrong
const CLIENT_ERRORS: &[&str] = &[
    "invalid_client",
    "invalid_client_secret",
    "unauthorized_client",
    "unsupported_grant_type",
    "invalid_scope",
    "invalid_request",
];

fn classify_response(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &[u8],
) -> Result<TokenGrant, RefreshError> {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        return Err(RefreshError::Transient {
            message: format!("token endpoint returned HTTP {}", status.as_u16()),
            retry_after,
        });
    }

    let document: Option<Value> = serde_json::from_slice(body).ok();
    if let Some(error) = document.as_ref().and_then(|doc| doc.get("error")).and_then(Value::as_str) {
        let description = document
            .as_ref()
            .and_then(|doc| doc.get("error_description"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(classify_error_code(error, description, retry_after));
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(RefreshError::Config("token endpoint rejected the client (HTTP 401)".into()));
    }
    if !status.is_success() {
        return Err(RefreshError::Transient {
            message: format!("token endpoint returned HTTP {}", status.as_u16()),
            retry_after,
        });
    }

    let grant: TokenGrant = serde_json::from_slice(body)
        .map_err(|err| RefreshError::transient(format!("malformed token response: {err}")))?;
    if grant.access_token.is_empty() {
        return Err(RefreshError::transient("token response without access_token"));
    }
    Ok(grant)
}

fn classify_error_code(
    error: &str,
    description: &str,
    retry_after: Option<Duration>,
) -> RefreshError {
    let code = error.trim().to_ascii_lowercase();
    if description.to_ascii_lowercase().contains("too many requests") {
        return RefreshError::Transient {
            message: format!("token endpoint throttled: {description}"),
            retry_after,
        };
    }
    if REJECTED_TOKEN_ERRORS.contains(&code.as_str()) {
        return RefreshError::InvalidGrant(error.to_string());
    }
    if CLIENT_ERRORS.contains(&code.as_str()) {
        return RefreshError::Config(format!("token endpoint rejected the client: {error}"));
    }
    RefreshError::Transient { message: format!("token endpoint error: {error}"), retry_after }
}
