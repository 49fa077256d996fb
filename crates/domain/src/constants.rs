//! Domain constants
//!
//! Defaults applied when a service configuration leaves a field unset.

// Rate limiting
/// Token bucket size
pub const DEFAULT_RATE_CAPACITY: u32 = 10;
/// Tokens added per second
pub const DEFAULT_REFILL_RATE_PER_SECOND: f64 = 1.0;

// Retry
/// Attempt budget including the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Backoff cap
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
/// First backoff delay
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 200;
/// Longest honoured `Retry-After`
pub const DEFAULT_MAX_RETRY_AFTER_MS: u64 = 120_000;

// Tokens
/// Refresh this long before expiry
pub const DEFAULT_TOKEN_EXPIRY_MARGIN_SECONDS: u64 = 60;
/// Lifetime assumed when a refresh response omits `expires_in`
pub const DEFAULT_GRANT_EXPIRES_IN_SECONDS: u64 = 3600;
/// Authorization header scheme
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

// Transport
/// Per-attempt timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Header carrying the caller's idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
/// Header carrying the correlation id
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

// Audit
/// In-memory audit ring size
pub const DEFAULT_AUDIT_MEMORY_CAPACITY: usize = 10_000;

// Environment
/// Credential environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "RELAY";

// Service parameters
/// Books scopes every call to an organization
pub const PARAM_ORGANIZATION_ID: &str = "organization_id";
/// Projects paths are portal-scoped
pub const PARAM_PORTAL_ID: &str = "portal_id";
