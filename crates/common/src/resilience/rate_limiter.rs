//! Token bucket rate limiting
//!
//! Tokens are tracked as a float so fractional refill between calls is never
//! lost. Refill and check-and-decrement happen under one lock, so two callers
//! can never both spend the same token.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CommonError, CommonResult};
use crate::time::{Clock, SystemClock};

/// Configuration for token bucket rate limiter
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold
    pub capacity: u32,
    /// Tokens added per second of elapsed time (may be zero)
    pub refill_rate_per_second: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { capacity: 10, refill_rate_per_second: 1.0 }
    }
}

impl TokenBucketConfig {
    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.capacity == 0 {
            return Err(CommonError::config("capacity", "capacity must be greater than 0"));
        }
        if !self.refill_rate_per_second.is_finite() || self.refill_rate_per_second < 0.0 {
            return Err(CommonError::config(
                "refill_rate_per_second",
                "refill rate must be a finite, non-negative number",
            ));
        }
        Ok(())
    }
}

/// Result of a non-blocking acquire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BucketDecision {
    /// One token was consumed
    Granted,
    /// Not enough tokens; `retry_after` is when one token will have accrued,
    /// or `None` if the bucket never refills
    Denied { retry_after: Option<Duration> },
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter
///
/// Starts full. Each grant consumes one token; tokens accrue continuously at
/// `refill_rate_per_second` up to `capacity`.
pub struct TokenBucket<C: Clock = SystemClock> {
    config: TokenBucketConfig,
    state: Mutex<BucketState>,
    clock: C,
}

impl<C: Clock> std::fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("config", &self.config)
            .field("tokens", &self.state.lock().tokens)
            .finish_non_exhaustive()
    }
}

impl TokenBucket<SystemClock> {
    /// Create a new token bucket with system clock
    pub fn new(config: TokenBucketConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a new token bucket with custom clock
    pub fn with_clock(config: TokenBucketConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        let state =
            BucketState { tokens: f64::from(config.capacity), last_refill: clock.now() };
        Ok(Self { config, state: Mutex::new(state), clock })
    }

    /// Bucket configuration
    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let capacity = f64::from(self.config.capacity);
            state.tokens =
                (state.tokens + elapsed * self.config.refill_rate_per_second).min(capacity);
            state.last_refill = now;
        }
    }

    /// Try to take one token without waiting
    pub fn try_acquire(&self) -> BucketDecision {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            debug!(remaining = state.tokens, "token bucket grant");
            return BucketDecision::Granted;
        }

        let retry_after = self.time_to_next_token(state.tokens);
        debug!(tokens = state.tokens, ?retry_after, "token bucket exhausted");
        BucketDecision::Denied { retry_after }
    }

    /// Time until one token will have accrued; `None` when the bucket never
    /// refills or the wait does not fit in a `Duration`
    fn time_to_next_token(&self, tokens: f64) -> Option<Duration> {
        let rate = self.config.refill_rate_per_second;
        if rate <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64((1.0 - tokens) / rate).ok()
    }

    /// Take one token, waiting up to `timeout` for it to accrue
    ///
    /// # Errors
    /// Returns `CommonError::Timeout` when no token became available in time.
    pub async fn acquire_timeout(&self, timeout: Duration) -> CommonResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let wait = match self.try_acquire() {
                BucketDecision::Granted => return Ok(()),
                BucketDecision::Denied { retry_after } => retry_after,
            };

            let now = tokio::time::Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            match wait {
                Some(wait) if wait <= remaining => {
                    // Small floor so float rounding can't spin the loop.
                    tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                }
                _ => {
                    tokio::time::sleep(remaining).await;
                    if let BucketDecision::Granted = self.try_acquire() {
                        return Ok(());
                    }
                    return Err(CommonError::timeout("token_bucket_acquire", timeout));
                }
            }
        }
    }

    /// Tokens currently available (after refill)
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }
}
