//! Port interface for the HTTP transport

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use relay_domain::{HttpMethod, Payload};
use serde_json::Value;
use thiserror::Error;

/// Fully resolved request handed to the transport
#[derive(Clone, PartialEq)]
pub struct OutboundRequest {
    /// HTTP verb
    pub method: HttpMethod,
    /// Absolute URL: service base URL joined with the request path
    pub url: String,
    /// Query parameters, encoded by the transport
    pub query: Vec<(String, String)>,
    /// Caller headers plus Authorization, correlation and idempotency headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Payload,
    /// Deadline for this attempt
    pub timeout: Duration,
}

impl OutboundRequest {
    /// First header named `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// Header values are left out: the Authorization header carries the token.
impl fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("OutboundRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &header_names)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Raw upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Header names are lowercase
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Payload,
}

impl TransportResponse {
    /// Response with no headers and an empty body
    pub fn new(status: u16) -> Self {
        Self { status, headers: Vec::new(), body: Payload::Empty }
    }

    /// Response with a JSON body
    pub fn json(status: u16, body: Value) -> Self {
        Self { status, headers: Vec::new(), body: Payload::Json(body) }
    }

    /// Add a header; the name is lowercased
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// First header named `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Transport-level failure (no HTTP status available)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request never left: DNS, refused connection, TLS handshake
    #[error("connection failed: {0}")]
    Connect(String),

    /// The attempt deadline passed
    #[error("request timed out (sent: {sent})")]
    Timeout {
        /// Whether the request may have reached the upstream
        sent: bool,
    },

    /// The connection broke after the request was written
    #[error("connection interrupted: {0}")]
    Interrupted(String),
}

/// Sends one HTTP request; implementations must honour `request.timeout`
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}
