//! Transport-agnostic request and response envelopes
//!
//! Payload schemas belong to the per-service clients; at this layer bodies
//! are opaque JSON or bytes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::impl_domain_status_conversions;

/// HTTP method of an outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl_domain_status_conversions!(HttpMethod {
    Get => "get",
    Head => "head",
    Options => "options",
    Post => "post",
    Put => "put",
    Patch => "patch",
    Delete => "delete",
});

impl HttpMethod {
    /// Wire form ("GET", "POST", ...)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Methods that never change server state and may always be resent
    pub fn is_safe(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }
}

/// Opaque request or response body
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
}

impl Payload {
    /// True when there is nothing to send
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Json(_) => false,
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }

    /// JSON payload, if any
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Empty | Self::Bytes(_) => None,
        }
    }

    /// Interpret a raw body: JSON when it parses, bytes otherwise
    pub fn from_body(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        serde_json::from_slice(&bytes).map_or(Self::Bytes(bytes), Self::Json)
    }
}

/// One logical call to an upstream API, relative to the service base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP verb
    pub method: HttpMethod,
    /// Path relative to the service base URL
    pub path: String,
    /// Query parameters in insertion order
    pub query: Vec<(String, String)>,
    /// Extra headers; authorization is added by the dispatcher
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Payload,
}

impl ApiRequest {
    /// Request with no query, headers or body
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Payload::Empty,
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// POST request with a JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).json(body)
    }

    /// PUT request with a JSON body
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).json(body)
    }

    /// DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Appends a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the body with JSON
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Payload::Json(body);
        self
    }
}

/// Response as seen by the caller of `execute`
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Header names are lowercase
    pub headers: Vec<(String, String)>,
    /// Decoded body
    pub body: Payload,
}

impl ApiResponse {
    /// Response without headers
    pub fn new(status: u16, body: Payload) -> Self {
        Self { status, headers: Vec::new(), body }
    }

    /// True for 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name` case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// JSON body, if the upstream returned one
    pub fn json(&self) -> Option<&Value> {
        self.body.as_json()
    }
}

/// How a caller waits for rate-limit admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionMode {
    /// Reject immediately when the bucket is empty
    #[default]
    FailFast,
    /// Wait for a token, up to `timeout`
    Block { timeout: Duration },
}
