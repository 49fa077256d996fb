//! Port interface for durable audit storage

use async_trait::async_trait;
use relay_domain::AuditEvent;
use thiserror::Error;

/// The sink could not durably accept an event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("audit sink unavailable: {0}")]
pub struct AuditSinkError(pub String);

impl AuditSinkError {
    /// Wrap a sink-specific failure message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Append-only store of audit events (file, table, log pipeline)
///
/// `record` returns only after the event is durable as far as the sink can
/// tell. Events are never modified or removed through this interface.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}
