//! # Relay Core
//!
//! Integration logic for OAuth-protected SaaS APIs - no network or disk code.
//!
//! This crate contains:
//! - Credential lifecycle with single-flight refresh ([`TokenManager`])
//! - Per-service admission control ([`RateLimiter`])
//! - Failure classification and backoff ([`RetryPolicy`])
//! - Fail-closed audit trail ([`AuditLogger`])
//! - The `execute` entry point composing all of the above ([`Dispatcher`])
//!
//! ## Architecture Principles
//! - Only depends on `relay-common` and `relay-domain`
//! - HTTP, token persistence and audit storage sit behind port traits
//! - `relay-infra` provides the production adapters

pub mod audit;
pub mod auth;
pub mod dispatch;
pub mod rate_limit;
pub mod retry_policy;
pub mod testing;

pub use audit::{AuditLogger, AuditSink, AuditSinkError, AuditStatistics, InMemoryAuditSink};
pub use auth::{InMemoryTokenStore, RefreshError, TokenManager, TokenRefresher, TokenStore};
pub use dispatch::{
    Dispatcher, OutboundRequest, RequestOptions, Transport, TransportError, TransportResponse,
};
pub use rate_limit::RateLimiter;
pub use retry_policy::{parse_retry_after, Failure, RetryDecision, RetryPolicy};
