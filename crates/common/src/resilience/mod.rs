//! Resilience primitives
//!
//! - [`retry`]: backoff math and a policy-driven async retry executor
//! - [`rate_limiter`]: a clock-driven token bucket
//!
//! Both are generic over the caller's error type and know nothing about HTTP
//! or OAuth. The integration core layers its own classification on top.

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{BucketDecision, TokenBucket, TokenBucketConfig};
pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
