//! Modular common utilities shared across Relay crates.
//!
//! Nothing in this crate knows about OAuth, services or HTTP. It provides
//! the building blocks the integration core is assembled from.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification, redaction rules, clocks, backoff math
//! - `runtime`: async infrastructure (retry executor, token bucket, secure
//!   logger)
//! - `observability`: tracing without the async runtime

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod privacy;
#[cfg(feature = "foundation")]
pub mod time;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod observability;
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use observability::{LogLevel, SecureLogger};
#[cfg(feature = "foundation")]
pub use privacy::{Redactor, REDACTION_MARKER};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, BucketDecision, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision,
    RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryResult, TokenBucket,
    TokenBucketConfig,
};
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SystemClock};
