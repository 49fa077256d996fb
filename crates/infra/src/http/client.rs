use std::time::Duration;

use async_trait::async_trait;
use relay_core::{OutboundRequest, Transport, TransportError, TransportResponse};
use relay_domain::{HttpMethod, IntegrationError, Payload, Result};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder};
use tracing::debug;

use crate::errors::transport_error;

/// reqwest-backed [`Transport`]
///
/// Sends exactly one request per call; retries belong to the dispatcher.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    /// Start building a new transport.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Shared reqwest client, also used for the token endpoint
    pub fn client(&self) -> &ReqwestClient {
        &self.client
    }

    fn request(&self, request: OutboundRequest) -> RequestBuilder {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match request.body {
            Payload::Empty => builder,
            Payload::Json(value) => builder.json(&value),
            Payload::Bytes(bytes) => builder.body(bytes),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: OutboundRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let method = request.method.as_str();
        let url = request.url.clone();
        debug!(%method, %url, "sending HTTP request");

        let response = self.request(request).send().await.map_err(|err| {
            debug!(%method, %url, error = %err, "HTTP request failed");
            transport_error(&err)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        debug!(%method, %url, status, "received HTTP response");

        // Losing the body after the status line means the upstream acted.
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Interrupted(err.to_string()))?;

        Ok(TransportResponse { status, headers, body: Payload::from_body(body.to_vec()) })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    connect_timeout: Duration,
    user_agent: Option<String>,
    accept_invalid_certs: bool,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: Some(concat!("relay/", env!("CARGO_PKG_VERSION")).to_string()),
            accept_invalid_certs: false,
        }
    }
}

impl HttpTransportBuilder {
    /// Bound on TCP and TLS setup; the per-request timeout covers the rest.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// User-Agent sent with every request
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Test-only helper to allow insecure TLS (e.g., self-signed certs).
    #[cfg(test)]
    pub fn accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        let mut builder = ReqwestClient::builder().connect_timeout(self.connect_timeout);

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|err| IntegrationError::config(format!("failed to build HTTP client: {err}")))?;

        Ok(HttpTransport { client })
    }
}
