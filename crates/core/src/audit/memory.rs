//! Bounded in-memory audit sink

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_domain::{AuditEvent, AuditOutcome};
use serde::{Deserialize, Serialize};

use super::ports::{AuditSink, AuditSinkError};

/// Ring buffer of the most recent audit events
///
/// When full, the oldest event is evicted. Use a durable sink where the
/// audit trail must survive restarts.
#[derive(Debug)]
pub struct InMemoryAuditSink {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl InMemoryAuditSink {
    /// Ring holding at most `capacity` events; the oldest is evicted first
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))) }
    }

    /// Snapshot of all retained events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no event is retained
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Retained events matching `filter`, oldest first
    pub fn query(
        &self,
        filter: impl Fn(&AuditEvent) -> bool,
        limit: Option<usize>,
    ) -> Vec<AuditEvent> {
        let events = self.events.lock();
        let matching = events.iter().filter(|e| filter(e)).cloned();
        match limit {
            Some(n) => matching.take(n).collect(),
            None => matching.collect(),
        }
    }

    /// Counts by outcome and service over the retained events
    pub fn statistics(&self) -> AuditStatistics {
        let events = self.events.lock();

        let mut stats = AuditStatistics {
            total_entries: events.len(),
            by_outcome: HashMap::new(),
            by_service: HashMap::new(),
            oldest_entry: events.front().map(|e| e.timestamp),
            newest_entry: events.back().map(|e| e.timestamp),
        };
        for event in events.iter() {
            *stats.by_outcome.entry(event.outcome).or_insert(0) += 1;
            *stats.by_service.entry(event.service.to_string()).or_insert(0) += 1;
        }
        stats
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

/// Statistics about retained audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStatistics {
    /// Retained events
    pub total_entries: usize,
    /// Retained events per outcome
    pub by_outcome: HashMap<AuditOutcome, usize>,
    /// Retained events per service id
    pub by_service: HashMap<String, usize>,
    /// Timestamp of the oldest retained event
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Timestamp of the newest retained event
    pub newest_entry: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use relay_domain::ServiceId;

    use super::*;

    fn event(service: ServiceId, outcome: AuditOutcome) -> AuditEvent {
        AuditEvent::new(service, "op", outcome, "c")
    }

    #[tokio::test]
    async fn test_ring_evicts_oldest() {
        let sink = InMemoryAuditSink::new(2);
        for operation in ["first", "second", "third"] {
            let mut e = event(ServiceId::crm(), AuditOutcome::Success);
            e.operation = operation.into();
            sink.record(&e).await.unwrap();
        }

        let operations: Vec<_> = sink.events().into_iter().map(|e| e.operation).collect();
        assert_eq!(operations, vec!["second", "third"]);
    }

    /// Validates query and statistics over mixed events.
    ///
    /// Assertions:
    /// - Filters and limits apply in insertion order.
    /// - Counts are grouped by outcome and by service.
    #[tokio::test]
    async fn test_query_and_statistics() {
        let sink = InMemoryAuditSink::new(100);
        sink.record(&event(ServiceId::crm(), AuditOutcome::Success)).await.unwrap();
        sink.record(&event(ServiceId::crm(), AuditOutcome::Failed)).await.unwrap();
        sink.record(&event(ServiceId::books(), AuditOutcome::Retried)).await.unwrap();
        sink.record(&event(ServiceId::books(), AuditOutcome::Failed)).await.unwrap();

        let failures = sink.query(AuditEvent::is_failure, None);
        assert_eq!(failures.len(), 2);
        assert_eq!(sink.query(|e| e.service == ServiceId::books(), Some(1)).len(), 1);

        let stats = sink.statistics();
        assert_eq!(stats.total_entries, 4);
        assert_eq!(stats.by_outcome[&AuditOutcome::Failed], 2);
        assert_eq!(stats.by_service["books"], 2);
        assert!(stats.oldest_entry <= stats.newest_entry);
    }
}
