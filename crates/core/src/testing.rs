//! Test doubles for the core ports
//!
//! Shared by the unit tests of this crate, its integration tests and the
//! adapter tests in `relay-infra`. Nothing here touches the network or disk.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_domain::{AuditEvent, IntegrationConfig, ServiceConfig, ServiceId, TokenGrant};
use serde_json::Value;
use tokio::time::Instant;

use crate::audit::{AuditSink, AuditSinkError};
use crate::auth::{RefreshError, TokenRefresher};
use crate::dispatch::{OutboundRequest, Transport, TransportError, TransportResponse};

/// Configuration with the four stock services pointing at `*.test` hosts
///
/// Every service carries a configured refresh token
/// (`config-refresh-<service>`) so a token can be bootstrapped from an empty
/// store.
pub fn sample_config() -> IntegrationConfig {
    let services = [
        (ServiceId::CRM, "https://crm.test/crm/v2"),
        (ServiceId::BOOKS, "https://books.test/api/v3"),
        (ServiceId::PROJECTS, "https://projects.test/restapi"),
        (ServiceId::WORKDRIVE, "https://workdrive.test/api/v1"),
    ]
    .into_iter()
    .map(|(name, base_url)| {
        let mut service = ServiceConfig::new(base_url, "https://accounts.test/oauth/v2/token");
        service.client_id = Some(format!("client-{name}"));
        service.client_secret = Some(format!("secret-{name}"));
        service.refresh_token = Some(format!("config-refresh-{name}"));
        (name.to_string(), service)
    })
    .collect::<BTreeMap<_, _>>();

    IntegrationConfig { services, ..IntegrationConfig::default() }
}

/// Scripted [`TokenRefresher`]
///
/// Queued results are returned first; afterwards every call succeeds with
/// `access-<n>`, where `n` counts calls including failed ones.
#[derive(Debug)]
pub struct MockTokenRefresher {
    calls: AtomicU32,
    script: Mutex<VecDeque<Result<TokenGrant, RefreshError>>>,
    seen: Mutex<Vec<String>>,
    expires_in: u64,
    delay: Option<Duration>,
}

impl Default for MockTokenRefresher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTokenRefresher {
    /// Refresher answering `access-<n>` with a one hour lifetime
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            expires_in: 3600,
            delay: None,
        }
    }

    /// Lifetime of generated tokens
    #[must_use]
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = seconds;
        self
    }

    /// Sleep before answering, to hold a refresh in flight
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue the result of a future call
    pub fn push_result(&self, result: Result<TokenGrant, RefreshError>) {
        self.script.lock().push_back(result);
    }

    /// Number of refresh calls so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented, in call order
    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl TokenRefresher for MockTokenRefresher {
    async fn refresh(
        &self,
        _service: &ServiceId,
        _config: &ServiceConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, RefreshError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().push(refresh_token.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(TokenGrant {
                access_token: format!("access-{call}"),
                refresh_token: None,
                expires_in: Some(self.expires_in),
                scope: None,
                token_type: Some("Bearer".to_string()),
            })
        })
    }
}

/// One scripted transport outcome
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond(TransportResponse),
    Fail(TransportError),
    /// Never completes; used to cancel a request in flight
    Hang,
}

/// Scripted [`Transport`] that records every request it receives
///
/// Replies are consumed in order; once the script runs out every request is
/// answered with `200 {}`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<(Instant, OutboundRequest)>>,
}

impl ScriptedTransport {
    /// Transport with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply
    pub fn push(&self, reply: ScriptedReply) -> &Self {
        self.script.lock().push_back(reply);
        self
    }

    /// Queue an HTTP response
    pub fn respond(&self, response: TransportResponse) -> &Self {
        self.push(ScriptedReply::Respond(response))
    }

    /// Queue a response with a JSON body
    pub fn respond_json(&self, status: u16, body: Value) -> &Self {
        self.respond(TransportResponse::json(status, body))
    }

    /// Queue a transport failure
    pub fn fail(&self, error: TransportError) -> &Self {
        self.push(ScriptedReply::Fail(error))
    }

    /// Queue a request that never completes
    pub fn hang(&self) -> &Self {
        self.push(ScriptedReply::Hang)
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().iter().map(|(_, request)| request.clone()).collect()
    }

    /// Number of requests seen so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// When each request was sent, on the tokio clock
    pub fn sent_at(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(at, _)| *at).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push((Instant::now(), request));
        let reply = self.script.lock().pop_front();
        match reply {
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Fail(error)) => Err(error),
            Some(ScriptedReply::Hang) => std::future::pending().await,
            None => Ok(TransportResponse::json(200, Value::Object(serde_json::Map::new()))),
        }
    }
}

/// Audit sink that rejects every event
#[derive(Debug, Default)]
pub struct FailingAuditSink {
    attempts: AtomicU32,
}

impl FailingAuditSink {
    /// Sink failing every write
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write attempts
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _event: &AuditEvent) -> Result<(), AuditSinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditSinkError::new("disk full"))
    }
}
