//! Audit trail of dispatched calls

pub mod logger;
pub mod memory;
pub mod ports;

pub use logger::AuditLogger;
pub use memory::{AuditStatistics, InMemoryAuditSink};
pub use ports::{AuditSink, AuditSinkError};
