//! Dispatcher: the single `execute` entry point
//!
//! Per call: `Pending -> TokenAcquired -> RateAdmitted -> Sent ->
//! {Succeeded | Retrying -> Sent | Failed}`. Token and admission failures
//! short-circuit before the network. Every call, whatever its fate, ends
//! with exactly one audit event written before `execute` returns; if that
//! write fails the call fails.
//!
//! A caller that drops the `execute` future (for example through
//! `tokio::time::timeout`) gets no result, but the call is still audited:
//! a guard records a failed event in the background, labelled
//! `ambiguous_outcome` when a request was in flight and `cancelled`
//! otherwise. Use `RequestOptions::cancellation` to observe the outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_common::{LogLevel, SecureLogger};
use relay_domain::constants::{CORRELATION_ID_HEADER, IDEMPOTENCY_KEY_HEADER};
use relay_domain::{
    ApiErrorKind, ApiRequest, ApiResponse, AuditEvent, AuditOutcome, IntegrationConfig,
    IntegrationError, Result, ServiceConfig, ServiceId,
};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::instrument;
use uuid::Uuid;

use super::options::RequestOptions;
use super::ports::{OutboundRequest, Transport, TransportError, TransportResponse};
use crate::audit::AuditLogger;
use crate::auth::TokenManager;
use crate::rate_limit::RateLimiter;
use crate::retry_policy::{parse_retry_after, Failure, RetryDecision, RetryPolicy};

struct ServiceRuntime {
    config: ServiceConfig,
    policy: RetryPolicy,
}

/// What one `execute` went through, for the audit record
#[derive(Debug, Default)]
struct CallTrace {
    attempts: u32,
    http_status: Option<u16>,
    /// A request has been handed to the transport and not answered yet
    in_flight: bool,
}

/// Audits an `execute` whose future was dropped before it finished
struct AbandonedCallGuard {
    audit: AuditLogger,
    logger: SecureLogger,
    event: Option<AuditEvent>,
    started: Instant,
    trace: CallTrace,
}

impl AbandonedCallGuard {
    fn new(audit: AuditLogger, logger: SecureLogger, event: AuditEvent, started: Instant) -> Self {
        Self { audit, logger, event: Some(event), started, trace: CallTrace::default() }
    }

    fn disarm(&mut self) {
        self.event = None;
    }
}

impl Drop for AbandonedCallGuard {
    fn drop(&mut self) {
        let Some(mut event) = self.event.take() else {
            return;
        };
        let kind = if self.trace.in_flight { "ambiguous_outcome" } else { "cancelled" };
        event.attempts = self.trace.attempts;
        event.http_status = self.trace.http_status;
        event.duration_ms = delay_ms(self.started.elapsed());
        event.error_kind = Some(kind.to_string());

        let context = json!({
            "service": event.service.as_str(),
            "operation": event.operation,
            "correlation_id": event.correlation_id,
            "attempt": event.attempts,
            "error": kind,
        });
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.logger.warn("execute abandoned by caller", &context);
                let audit = self.audit.clone();
                // `record` logs its own failures.
                handle.spawn(async move {
                    let _ = audit.record(event).await;
                });
            }
            Err(_) => {
                self.logger.error("execute abandoned outside a runtime, audit event lost", &context);
            }
        }
    }
}

struct Call<'a> {
    service: &'a ServiceId,
    operation: &'a str,
    correlation_id: &'a str,
    options: &'a RequestOptions,
}

/// Shared dispatcher used by every per-service client
pub struct Dispatcher {
    services: HashMap<ServiceId, ServiceRuntime>,
    tokens: Arc<TokenManager>,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn Transport>,
    audit: AuditLogger,
    logger: SecureLogger,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("services", &self.services.keys()).finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher for every service in `config`
    ///
    /// # Errors
    /// `Config` when the configuration does not validate.
    pub fn new(
        config: &IntegrationConfig,
        tokens: Arc<TokenManager>,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
        audit: AuditLogger,
    ) -> Result<Self> {
        config.validate()?;
        let services = config
            .services
            .iter()
            .map(|(name, service)| {
                let runtime =
                    ServiceRuntime { config: service.clone(), policy: RetryPolicy::from_config(service) };
                (ServiceId::new(name), runtime)
            })
            .collect();

        Ok(Self {
            services,
            tokens,
            limiter,
            transport,
            audit,
            logger: SecureLogger::new("dispatcher"),
        })
    }

    /// Token manager shared with the per-service clients
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Admission control for every configured service
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Settings of `service`, if it is configured
    pub fn service_config(&self, service: &ServiceId) -> Option<&ServiceConfig> {
        self.services.get(service).map(|runtime| &runtime.config)
    }

    /// Dispatch `request` to `service`
    ///
    /// Retries transient failures within the service's attempt budget and
    /// records one terminal audit event before returning.
    ///
    /// Dropping the returned future still audits the call; see the module
    /// docs.
    ///
    /// # Errors
    /// Any [`IntegrationError`]; `AuditWrite` overrides the call's own result
    /// when the audit record could not be written.
    #[instrument(skip(self, request, options), fields(service = %service, operation = %operation))]
    pub async fn execute(
        &self,
        service: &ServiceId,
        operation: &str,
        request: ApiRequest,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let started = Instant::now();
        let correlation_id =
            options.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let call = Call { service, operation, correlation_id: &correlation_id, options: &options };
        let abandoned = audit_event(
            &call,
            &request,
            &CallTrace::default(),
            &Err(IntegrationError::Cancelled),
            Duration::ZERO,
        );
        let mut guard =
            AbandonedCallGuard::new(self.audit.clone(), self.logger.clone(), abandoned, started);

        let result = self.run(&call, &request, &mut guard.trace).await;
        guard.disarm();

        let event = audit_event(&call, &request, &guard.trace, &result, started.elapsed());
        self.audit.record(event).await?;
        result
    }

    async fn run(
        &self,
        call: &Call<'_>,
        request: &ApiRequest,
        trace: &mut CallTrace,
    ) -> Result<ApiResponse> {
        let runtime = self
            .services
            .get(call.service)
            .ok_or_else(|| IntegrationError::unknown_service(call.service))?;
        let retry_safe = call.options.is_retry_safe(request.method);
        let mut refreshed = false;

        loop {
            if call.options.is_cancelled() {
                return Err(IntegrationError::Cancelled);
            }
            let token = self.until_cancelled(call, self.tokens.get_valid_token(call.service)).await?;
            self.until_cancelled(call, self.limiter.acquire(call.service, call.options.admission))
                .await?;
            if call.options.is_cancelled() {
                return Err(IntegrationError::Cancelled);
            }

            let outbound = build_request(runtime, call, request, &token);
            trace.attempts += 1;
            let attempt = trace.attempts;
            self.log(LogLevel::Debug, "sending request", call, attempt, json!({ "url": outbound.url }));

            trace.in_flight = true;
            let sent = self.send(call, outbound).await;
            trace.in_flight = false;
            let (failure, detail) = match sent? {
                Ok(response) if (200..300).contains(&response.status) => {
                    trace.http_status = Some(response.status);
                    return Ok(into_api_response(response));
                }
                Ok(response) => {
                    trace.http_status = Some(response.status);
                    let retry_after = response
                        .header("retry-after")
                        .and_then(|value| parse_retry_after(value, Utc::now()));
                    let failure = Failure::Http { status: response.status, retry_after };
                    (failure, format!("HTTP {}", response.status))
                }
                Err(error) => (transport_failure(&error), error.to_string()),
            };

            match runtime.policy.classify(&failure, attempt, retry_safe) {
                RetryDecision::RefreshToken if !refreshed => {
                    refreshed = true;
                    self.log(LogLevel::Warn, "access token rejected, refreshing", call, attempt, Value::Null);
                    self.until_cancelled(call, self.tokens.refresh_rejected(call.service, &token))
                        .await?;
                }
                RetryDecision::RetryAfter(delay) => {
                    self.log(
                        LogLevel::Warn,
                        "retrying request",
                        call,
                        attempt,
                        json!({ "reason": detail, "delay_ms": delay_ms(delay) }),
                    );
                    self.until_cancelled(call, async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    })
                    .await?;
                }
                RetryDecision::RefreshToken | RetryDecision::NoRetry | RetryDecision::GiveUp => {
                    let error = terminal_error(call, &failure, retry_safe, &detail);
                    let level = if error.is_transient() { LogLevel::Warn } else { LogLevel::Error };
                    self.log(
                        level,
                        "request failed",
                        call,
                        attempt,
                        json!({ "reason": detail, "error": error.label() }),
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Run a pre-send step, abandoning it if the caller cancels
    async fn until_cancelled<T>(
        &self,
        call: &Call<'_>,
        step: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match &call.options.cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(IntegrationError::Cancelled),
                result = step => result,
            },
            None => step.await,
        }
    }

    /// Send one attempt; cancellation while in flight makes the outcome
    /// ambiguous
    async fn send(
        &self,
        call: &Call<'_>,
        outbound: OutboundRequest,
    ) -> Result<std::result::Result<TransportResponse, TransportError>> {
        let in_flight = self.transport.send(outbound);
        match &call.options.cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(IntegrationError::AmbiguousOutcome {
                    service: call.service.clone(),
                    operation: call.operation.to_string(),
                    message: "cancelled after the request was sent".to_string(),
                }),
                result = in_flight => Ok(result),
            },
            None => Ok(in_flight.await),
        }
    }

    fn log(&self, level: LogLevel, message: &str, call: &Call<'_>, attempt: u32, details: Value) {
        self.logger.log(
            level,
            message,
            &json!({
                "service": call.service.as_str(),
                "operation": call.operation,
                "correlation_id": call.correlation_id,
                "attempt": attempt,
                "details": details,
                "context": call.options.context,
            }),
        );
    }
}

fn build_request(
    runtime: &ServiceRuntime,
    call: &Call<'_>,
    request: &ApiRequest,
    token: &str,
) -> OutboundRequest {
    let mut headers = request.headers.clone();
    headers.push(("Authorization".to_string(), format!("{} {token}", runtime.config.auth_scheme)));
    headers.push((CORRELATION_ID_HEADER.to_string(), call.correlation_id.to_string()));
    if let Some(key) = &call.options.idempotency_key {
        headers.push((IDEMPOTENCY_KEY_HEADER.to_string(), key.clone()));
    }

    OutboundRequest {
        method: request.method,
        url: join_url(&runtime.config.base_url, &request.path),
        query: request.query.clone(),
        headers,
        body: request.body.clone(),
        timeout: call.options.timeout.unwrap_or_else(|| runtime.config.request_timeout()),
    }
}

fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.trim_end_matches('/').to_string();
    }
    format!("{}/{path}", base.trim_end_matches('/'))
}

fn into_api_response(response: TransportResponse) -> ApiResponse {
    ApiResponse { status: response.status, headers: response.headers, body: response.body }
}

fn transport_failure(error: &TransportError) -> Failure {
    match error {
        TransportError::Connect(_) => Failure::Connect,
        TransportError::Timeout { sent } => Failure::Timeout { sent: *sent },
        TransportError::Interrupted(_) => Failure::Interrupted,
    }
}

fn terminal_error(
    call: &Call<'_>,
    failure: &Failure,
    retry_safe: bool,
    detail: &str,
) -> IntegrationError {
    let service = call.service;
    match *failure {
        Failure::Http { status: 401, .. } => IntegrationError::api(
            ApiErrorKind::ClientError,
            Some(401),
            format!("{service} rejected the refreshed access token"),
        ),
        Failure::Http { status: 429, .. } => IntegrationError::api(
            ApiErrorKind::Transient,
            Some(429),
            format!("{service} kept rate limiting the request"),
        ),
        Failure::Http { status, .. } if (500..600).contains(&status) => IntegrationError::api(
            ApiErrorKind::ServerError,
            Some(status),
            format!("{service} returned HTTP {status}"),
        ),
        Failure::Http { status, .. } => IntegrationError::api(
            ApiErrorKind::ClientError,
            Some(status),
            format!("{service} returned HTTP {status}"),
        ),
        ambiguous if ambiguous.is_ambiguous() && !retry_safe => IntegrationError::AmbiguousOutcome {
            service: service.clone(),
            operation: call.operation.to_string(),
            message: detail.to_string(),
        },
        Failure::Connect | Failure::Timeout { .. } | Failure::Interrupted => {
            IntegrationError::api(ApiErrorKind::Transient, None, format!("{service}: {detail}"))
        }
    }
}

fn audit_event(
    call: &Call<'_>,
    request: &ApiRequest,
    trace: &CallTrace,
    result: &Result<ApiResponse>,
    elapsed: Duration,
) -> AuditEvent {
    let outcome = match result {
        Ok(_) if trace.attempts > 1 => AuditOutcome::Retried,
        Ok(_) => AuditOutcome::Success,
        Err(_) => AuditOutcome::Failed,
    };

    let mut event =
        AuditEvent::new(call.service.clone(), call.operation, outcome, call.correlation_id);
    event.http_status = trace.http_status;
    event.duration_ms = delay_ms(elapsed);
    event.attempts = trace.attempts;
    event.error_kind = result.as_ref().err().map(|error| error.label().to_string());
    event.redacted_context = json!({
        "method": request.method.as_str(),
        "path": request.path,
        "context": call.options.context,
    });
    event
}

fn delay_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
