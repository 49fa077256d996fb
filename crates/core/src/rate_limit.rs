//! Per-service request admission
//!
//! One [`TokenBucket`] per service. Buckets are independent: exhausting one
//! service never delays another, and no lock spans more than one bucket.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use relay_common::resilience::{BucketDecision, TokenBucket, TokenBucketConfig};
use relay_common::{Clock, CommonError, SystemClock};
use relay_domain::{AdmissionMode, IntegrationConfig, IntegrationError, Result, ServiceConfig, ServiceId};
use tracing::debug;

/// Token-bucket rate limiter keyed by service
pub struct RateLimiter<C: Clock + Clone = SystemClock> {
    buckets: DashMap<ServiceId, Arc<TokenBucket<C>>>,
    clock: C,
}

impl<C: Clock + Clone> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("services", &self.buckets.len()).finish()
    }
}

impl RateLimiter<SystemClock> {
    /// Limiter on the system clock with no services registered
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Limiter with one bucket per configured service
    pub fn from_config(config: &IntegrationConfig) -> Result<Self> {
        let limiter = Self::new();
        for (name, service) in &config.services {
            limiter.register(ServiceId::new(name), service)?;
        }
        Ok(limiter)
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> RateLimiter<C> {
    /// Limiter driven by `clock`
    pub fn with_clock(clock: C) -> Self {
        Self { buckets: DashMap::new(), clock }
    }

    /// Create or replace the bucket of `service`
    pub fn register(&self, service: ServiceId, config: &ServiceConfig) -> Result<()> {
        let bucket_config = TokenBucketConfig {
            capacity: config.rate_capacity,
            refill_rate_per_second: config.refill_rate_per_second,
        };
        let bucket = TokenBucket::with_clock(bucket_config, self.clock.clone())
            .map_err(|e| IntegrationError::config(format!("rate limit for '{service}': {e}")))?;
        self.buckets.insert(service, Arc::new(bucket));
        Ok(())
    }

    fn bucket(&self, service: &ServiceId) -> Result<Arc<TokenBucket<C>>> {
        // Clone the Arc out so no map guard is held across an await.
        self.buckets
            .get(service)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| IntegrationError::unknown_service(service))
    }

    /// Fail-fast admission
    ///
    /// # Errors
    /// `RateLimited` with a hint of when a token will be available.
    pub fn try_acquire(&self, service: &ServiceId) -> Result<()> {
        match self.bucket(service)?.try_acquire() {
            BucketDecision::Granted => Ok(()),
            BucketDecision::Denied { retry_after } => {
                debug!(service = %service, ?retry_after, "rate limited");
                Err(IntegrationError::RateLimited { service: service.clone(), retry_after })
            }
        }
    }

    /// Admission in the caller's chosen mode
    ///
    /// # Errors
    /// `RateLimited` in fail-fast mode; `RateLimitTimeout` when blocking
    /// mode waited the full timeout.
    pub async fn acquire(&self, service: &ServiceId, mode: AdmissionMode) -> Result<()> {
        match mode {
            AdmissionMode::FailFast => self.try_acquire(service),
            AdmissionMode::Block { timeout } => self.acquire_blocking(service, timeout).await,
        }
    }

    async fn acquire_blocking(&self, service: &ServiceId, timeout: Duration) -> Result<()> {
        let bucket = self.bucket(service)?;
        bucket.acquire_timeout(timeout).await.map_err(|e| match e {
            CommonError::Timeout { .. } => {
                IntegrationError::RateLimitTimeout { service: service.clone(), waited: timeout }
            }
            other => IntegrationError::config(other.to_string()),
        })
    }

    /// Tokens currently available to `service`
    pub fn available(&self, service: &ServiceId) -> Result<f64> {
        Ok(self.bucket(service)?.available())
    }
}
