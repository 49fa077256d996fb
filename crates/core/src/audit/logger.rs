//! Audit logger
//!
//! Front end of the audit sink: redacts the event context and converts sink
//! failures into `IntegrationError::AuditWrite`, which the dispatcher turns
//! into a failed call.

use std::sync::Arc;

use relay_common::{Redactor, SecureLogger};
use relay_domain::{AuditEvent, IntegrationError, Result};
use serde_json::json;

use super::ports::AuditSink;

/// Records terminal audit events
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    redactor: Arc<Redactor>,
    logger: SecureLogger,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Logger with the default redaction rules
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_redactor(sink, Redactor::new())
    }

    /// Use custom redaction rules for event context
    pub fn with_redactor(sink: Arc<dyn AuditSink>, redactor: Redactor) -> Self {
        let logger = SecureLogger::new("audit").with_redactor(redactor.clone());
        Self { sink, redactor: Arc::new(redactor), logger }
    }

    /// Redact and persist one event
    ///
    /// # Errors
    /// `AuditWrite` when the sink is unavailable.
    pub async fn record(&self, mut event: AuditEvent) -> Result<()> {
        self.redactor.redact_in_place(&mut event.redacted_context);

        self.sink.record(&event).await.map_err(|e| {
            self.logger.error(
                "audit write failed",
                &json!({
                    "service": event.service.as_str(),
                    "operation": event.operation,
                    "correlation_id": event.correlation_id,
                    "error": e.to_string(),
                }),
            );
            IntegrationError::audit_write(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use relay_domain::{AuditOutcome, ServiceId};

    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::testing::FailingAuditSink;

    #[tokio::test]
    async fn test_context_is_redacted_before_sink() {
        let sink = Arc::new(InMemoryAuditSink::new(16));
        let logger = AuditLogger::new(Arc::clone(&sink) as Arc<dyn AuditSink>);

        let mut event = AuditEvent::new(ServiceId::crm(), "get_record", AuditOutcome::Success, "c-1");
        event.redacted_context = json!({ "headers": { "Authorization": "Bearer abc123" } });
        logger.record(event).await.unwrap();

        let stored = sink.events();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].redacted_context.to_string().contains("abc123"));
    }

    #[tokio::test]
    async fn test_sink_failure_is_audit_write_error() {
        let logger = AuditLogger::new(Arc::new(FailingAuditSink::new()));
        let event = AuditEvent::new(ServiceId::crm(), "get_record", AuditOutcome::Success, "c-1");

        let err = logger.record(event).await.unwrap_err();
        assert!(matches!(err, IntegrationError::AuditWrite(_)));
    }
}
