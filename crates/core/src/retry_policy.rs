//! Failure classification for dispatched calls
//!
//! [`RetryPolicy::classify`] turns one failed attempt into a tagged decision;
//! the dispatcher loop acts on it. The policy holds no per-call state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_common::resilience::{BackoffStrategy, Jitter, RetryConfig};
use relay_domain::ServiceConfig;

/// What went wrong on one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Upstream answered with a non-2xx status
    Http { status: u16, retry_after: Option<Duration> },
    /// The request never left (DNS, refused connection, TLS setup)
    Connect,
    /// No response within the timeout; `sent` tells whether the request
    /// reached the wire
    Timeout { sent: bool },
    /// The connection broke after the request was sent
    Interrupted,
}

impl Failure {
    /// Delivery of the request is unknown
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout { sent: true } | Self::Interrupted)
    }
}

/// Decision for a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Surface the failure; retrying cannot help or is unsafe
    NoRetry,
    /// Send again after the delay
    RetryAfter(Duration),
    /// Force one token refresh, then send again
    RefreshToken,
    /// Retryable in principle, but the budget or the server's hint is too
    /// large
    GiveUp,
}

/// Per-service retry rules
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    backoff: RetryConfig,
    max_retry_after: Duration,
}

impl RetryPolicy {
    /// Policy from a backoff configuration and a Retry-After ceiling
    pub fn new(backoff: RetryConfig, max_retry_after: Duration) -> Self {
        Self { backoff, max_retry_after }
    }

    /// Policy from the retry settings of `config`
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(Self::backoff_config(config), config.max_retry_after())
    }

    /// Exponential backoff with equal jitter built from a service's settings
    pub fn backoff_config(config: &ServiceConfig) -> RetryConfig {
        RetryConfig {
            max_attempts: config.max_retries.max(1),
            backoff: BackoffStrategy::Exponential {
                initial_delay: config.initial_backoff(),
                base: 2.0,
                max_delay: config.max_backoff(),
            },
            jitter: Jitter::Equal,
        }
    }

    /// Attempt budget of one call, including the first attempt
    pub fn max_attempts(&self) -> u32 {
        self.backoff.max_attempts
    }

    /// Classify the failure of attempt number `attempt` (1-based)
    ///
    /// `idempotent` says whether resending is safe when delivery is unknown.
    pub fn classify(&self, failure: &Failure, attempt: u32, idempotent: bool) -> RetryDecision {
        match *failure {
            Failure::Http { status: 401, .. } => return RetryDecision::RefreshToken,
            Failure::Http { status, .. } if is_client_error(status) && status != 429 => {
                return RetryDecision::NoRetry;
            }
            Failure::Http { status, .. } if !(status == 429 || is_server_error(status)) => {
                return RetryDecision::NoRetry;
            }
            Failure::Timeout { sent: true } | Failure::Interrupted if !idempotent => {
                return RetryDecision::NoRetry;
            }
            _ => {}
        }

        if attempt >= self.max_attempts() {
            return RetryDecision::GiveUp;
        }

        match *failure {
            Failure::Http { retry_after: Some(hint), .. } => {
                if hint > self.max_retry_after {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::RetryAfter(hint)
                }
            }
            _ => RetryDecision::RetryAfter(self.next_delay(attempt)),
        }
    }

    /// Backoff before the attempt following attempt number `attempt`
    ///
    /// Exponential with jitter, capped at the configured maximum.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.backoff.delay_for(attempt.saturating_sub(1))
    }
}

fn is_client_error(status: u16) -> bool {
    (400..500).contains(&status)
}

fn is_server_error(status: u16) -> bool {
    (500..600).contains(&status)
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP-date
///
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
