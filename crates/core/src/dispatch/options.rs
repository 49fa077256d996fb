//! Per-call options of `execute`

use std::time::Duration;

use relay_domain::{AdmissionMode, HttpMethod};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Caller-chosen behaviour for one `execute`
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Resending after an ambiguous failure is safe
    pub idempotent: bool,
    /// Sent as `Idempotency-Key`; implies `idempotent`
    pub idempotency_key: Option<String>,
    /// Per-attempt timeout; the service default applies when unset
    pub timeout: Option<Duration>,
    /// Fail fast or wait for a rate-limit token
    pub admission: AdmissionMode,
    /// Generated when unset
    pub correlation_id: Option<String>,
    /// Cancels the call; after send the outcome becomes ambiguous
    pub cancellation: Option<CancellationToken>,
    /// Extra metadata for logs and the audit record; redacted before use
    pub context: Value,
}

impl RequestOptions {
    /// Fail-fast admission, no idempotency, service default timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the request safe to resend
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Attach an idempotency key, making writes safe to resend
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Override the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait up to `timeout` for rate-limit admission instead of failing fast
    #[must_use]
    pub fn blocking(mut self, timeout: Duration) -> Self {
        self.admission = AdmissionMode::Block { timeout };
        self
    }

    /// Use a caller-supplied correlation id
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Cancel the call through `token`
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Attach metadata for logs and the audit record
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Whether `method` may be resent when delivery is unknown
    pub fn is_retry_safe(&self, method: HttpMethod) -> bool {
        method.is_safe() || self.idempotent || self.idempotency_key.is_some()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
