//! Audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ServiceId;
use crate::impl_domain_status_conversions;

/// Terminal outcome of one dispatched call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Succeeded on the first attempt
    Success,
    /// Succeeded after at least one retry
    Retried,
    Failed,
}

impl_domain_status_conversions!(AuditOutcome {
    Success => "success",
    Retried => "retried",
    Failed => "failed",
});

/// One terminal record per `execute` call; append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id
    pub id: Uuid,
    /// When the call finished
    pub timestamp: DateTime<Utc>,
    /// Target service
    pub service: ServiceId,
    /// Method and path, e.g. `GET /crm/v2/Leads`
    pub operation: String,
    /// Terminal outcome
    pub outcome: AuditOutcome,
    /// Last upstream status, if a response arrived
    pub http_status: Option<u16>,
    /// Wall time across all attempts
    pub duration_ms: u64,
    /// Caller-supplied or generated correlation id
    pub correlation_id: String,
    /// Transport attempts made
    pub attempts: u32,
    /// Error kind for failed calls
    pub error_kind: Option<String>,
    /// Safe-to-log metadata; redacted before it reaches a sink
    pub redacted_context: Value,
}

impl AuditEvent {
    /// Event stamped with a fresh id and the current time
    pub fn new(
        service: ServiceId,
        operation: impl Into<String>,
        outcome: AuditOutcome,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            service,
            operation: operation.into(),
            outcome,
            http_status: None,
            duration_ms: 0,
            correlation_id: correlation_id.into(),
            attempts: 1,
            error_kind: None,
            redacted_context: Value::Null,
        }
    }

    /// True for failed outcomes
    pub fn is_failure(&self) -> bool {
        self.outcome == AuditOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serializes_outcome_label() {
        let event = AuditEvent::new(ServiceId::crm(), "list_records", AuditOutcome::Retried, "c-1");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["outcome"], "retried");
        assert_eq!(json["service"], "crm");
        assert_eq!(json["attempts"], 1);
    }
}
