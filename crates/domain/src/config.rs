//! Configuration structures
//!
//! Loading (files, environment) lives in `relay-infra`; this module only
//! defines the shape, the defaults and validation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_AUDIT_MEMORY_CAPACITY, DEFAULT_AUTH_SCHEME, DEFAULT_ENV_PREFIX,
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_MAX_RETRY_AFTER_MS, DEFAULT_RATE_CAPACITY, DEFAULT_REFILL_RATE_PER_SECOND,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TOKEN_EXPIRY_MARGIN_SECONDS,
};
use crate::errors::{IntegrationError, Result};
use crate::types::ServiceId;

/// Top-level configuration of the integration core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Prefix of credential environment variables (`RELAY_CRM_CLIENT_ID`)
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
    /// Service blocks keyed by service id
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Audit sink selection
    #[serde(default)]
    pub audit: AuditSettings,
    /// Credential persistence
    #[serde(default)]
    pub token_store: TokenStoreSettings,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            env_prefix: default_env_prefix(),
            services: BTreeMap::new(),
            audit: AuditSettings::default(),
            token_store: TokenStoreSettings::default(),
        }
    }
}

impl IntegrationConfig {
    /// Settings of a configured service
    ///
    /// # Errors
    /// `IntegrationError::Config` when the service is not configured.
    pub fn service(&self, service: &ServiceId) -> Result<&ServiceConfig> {
        self.services
            .get(service.as_str())
            .ok_or_else(|| IntegrationError::unknown_service(service))
    }

    /// Ids of every configured service
    pub fn service_ids(&self) -> impl Iterator<Item = ServiceId> + '_ {
        self.services.keys().map(ServiceId::new)
    }

    /// Validate every service block
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(IntegrationError::config("no services configured"));
        }
        for (name, service) in &self.services {
            service
                .validate()
                .map_err(|e| IntegrationError::config(format!("service '{name}': {e}")))?;
        }
        if self.audit.sink == AuditSinkKind::File && self.audit.path.is_none() {
            return Err(IntegrationError::config("audit.path is required for the file sink"));
        }
        if self.token_store.kind == TokenStoreKind::File && self.token_store.path.is_none() {
            return Err(IntegrationError::config("token_store.path is required for the file store"));
        }
        Ok(())
    }
}

/// Per-service settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API base URL, e.g. `https://www.zohoapis.com`
    pub base_url: String,
    /// OAuth token endpoint used for the refresh-token grant
    #[serde(default)]
    pub token_url: String,
    /// Scheme placed before the access token in the Authorization header
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    /// Token bucket size
    #[serde(default = "default_rate_capacity")]
    pub rate_capacity: u32,
    /// Tokens added per second
    #[serde(default = "default_refill_rate")]
    pub refill_rate_per_second: f64,
    /// Attempt budget of one `execute`, including the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound of a computed backoff
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// First backoff delay
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Tokens expiring within this window are refreshed
    #[serde(default = "default_margin")]
    pub token_expiry_margin_seconds: u64,
    /// Per-attempt timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Longest server-requested delay that is honoured; longer hints give up
    #[serde(default = "default_max_retry_after_ms")]
    pub max_retry_after_ms: u64,
    /// OAuth scopes requested for the service
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Service-specific parameters (`organization_id`, `portal_id`, ...)
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// OAuth client id
    #[serde(default, skip_serializing)]
    pub client_id: Option<String>,
    /// OAuth client secret
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    /// Bootstrap refresh token used when the store is empty
    #[serde(default, skip_serializing)]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("auth_scheme", &self.auth_scheme)
            .field("rate_capacity", &self.rate_capacity)
            .field("refill_rate_per_second", &self.refill_rate_per_second)
            .field("max_retries", &self.max_retries)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("token_expiry_margin_seconds", &self.token_expiry_margin_seconds)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("refresh_token", &redacted(&self.refresh_token))
            .finish_non_exhaustive()
    }
}

impl ServiceConfig {
    /// Defaults for everything except the URLs
    pub fn new(base_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token_url: token_url.into(),
            auth_scheme: default_auth_scheme(),
            rate_capacity: DEFAULT_RATE_CAPACITY,
            refill_rate_per_second: DEFAULT_REFILL_RATE_PER_SECOND,
            max_retries: DEFAULT_MAX_RETRIES,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            token_expiry_margin_seconds: DEFAULT_TOKEN_EXPIRY_MARGIN_SECONDS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_retry_after_ms: DEFAULT_MAX_RETRY_AFTER_MS,
            scopes: Vec::new(),
            params: BTreeMap::new(),
            client_id: None,
            client_secret: None,
            refresh_token: None,
        }
    }

    /// `max_backoff_ms` as a duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// `initial_backoff_ms` as a duration
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// `token_expiry_margin_seconds` as a duration
    pub fn token_expiry_margin(&self) -> Duration {
        Duration::from_secs(self.token_expiry_margin_seconds)
    }

    /// `request_timeout_ms` as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `max_retry_after_ms` as a duration
    pub fn max_retry_after(&self) -> Duration {
        Duration::from_millis(self.max_retry_after_ms)
    }

    /// Service-specific parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Client id and secret, when both are present and non-empty
    pub fn client_credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().filter(|s| !s.is_empty())?;
        let secret = self.client_secret.as_deref().filter(|s| !s.is_empty())?;
        Some((id, secret))
    }

    /// Reject values the dispatcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(IntegrationError::config("base_url must not be empty"));
        }
        if self.rate_capacity == 0 {
            return Err(IntegrationError::config("rate_capacity must be greater than 0"));
        }
        if !self.refill_rate_per_second.is_finite() || self.refill_rate_per_second < 0.0 {
            return Err(IntegrationError::config(
                "refill_rate_per_second must be a finite, non-negative number",
            ));
        }
        if self.max_retries == 0 {
            return Err(IntegrationError::config("max_retries must be at least 1"));
        }
        if self.request_timeout_ms == 0 {
            return Err(IntegrationError::config("request_timeout_ms must be greater than 0"));
        }
        if self.auth_scheme.trim().is_empty() {
            return Err(IntegrationError::config("auth_scheme must not be empty"));
        }
        Ok(())
    }
}

/// Where audit events go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Bounded in-process ring
    #[default]
    Memory,
    /// JSON-lines file
    File,
}

/// Audit sink settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Sink kind
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// JSON-lines file for the file sink
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Ring size for the in-memory sink
    #[serde(default = "default_audit_capacity")]
    pub memory_capacity: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self { sink: AuditSinkKind::Memory, path: None, memory_capacity: default_audit_capacity() }
    }
}

/// Where credentials are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStoreKind {
    /// Lost on restart
    #[default]
    Memory,
    /// JSON file rewritten atomically
    File,
}

/// Token store settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenStoreSettings {
    /// Store kind
    #[serde(default)]
    pub kind: TokenStoreKind,
    /// JSON file for the file store
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_string()
}

fn default_auth_scheme() -> String {
    DEFAULT_AUTH_SCHEME.to_string()
}

const fn default_rate_capacity() -> u32 {
    DEFAULT_RATE_CAPACITY
}

const fn default_refill_rate() -> f64 {
    DEFAULT_REFILL_RATE_PER_SECOND
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

const fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

const fn default_margin() -> u64 {
    DEFAULT_TOKEN_EXPIRY_MARGIN_SECONDS
}

const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

const fn default_max_retry_after_ms() -> u64 {
    DEFAULT_MAX_RETRY_AFTER_MS
}

const fn default_audit_capacity() -> usize {
    DEFAULT_AUDIT_MEMORY_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_fields_omitted() {
        let config: IntegrationConfig = toml::from_str(
            r#"
            [services.crm]
            base_url = "https://www.zohoapis.com"
            token_url = "https://accounts.zoho.com/oauth/v2/token"
            rate_capacity = 20
            "#,
        )
        .unwrap();

        let crm = config.service(&ServiceId::crm()).unwrap();
        assert_eq!(crm.rate_capacity, 20);
        assert_eq!(crm.max_retries, 5);
        assert_eq!(crm.token_expiry_margin(), Duration::from_secs(60));
        assert_eq!(crm.max_backoff(), Duration::from_secs(30));
        assert_eq!(crm.auth_scheme, "Bearer");
        assert_eq!(config.env_prefix, "RELAY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_service_is_config_error() {
        let config = IntegrationConfig::default();
        let err = config.service(&ServiceId::new("erp")).unwrap_err();
        assert!(matches!(err, IntegrationError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut service = ServiceConfig::new("https://api.example.com", "https://auth.example.com");
        assert!(service.validate().is_ok());

        service.rate_capacity = 0;
        assert!(service.validate().is_err());

        service.rate_capacity = 1;
        service.refill_rate_per_second = -0.5;
        assert!(service.validate().is_err());

        service.refill_rate_per_second = 0.0;
        service.max_retries = 0;
        assert!(service.validate().is_err());

        assert!(ServiceConfig::new(" ", "").validate().is_err());
    }

    #[test]
    fn test_secrets_are_not_serialized_or_debug_printed() {
        let mut service = ServiceConfig::new("https://api.example.com", "https://auth.example.com");
        service.client_secret = Some("very-secret".into());
        service.refresh_token = Some("1000.refresh".into());

        let json = serde_json::to_string(&service).unwrap();
        assert!(!json.contains("very-secret"));
        assert!(!json.contains("1000.refresh"));

        let debug = format!("{service:?}");
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("1000.refresh"));
    }

    #[test]
    fn test_file_sinks_require_paths() {
        let mut config = IntegrationConfig::default();
        config
            .services
            .insert("crm".into(), ServiceConfig::new("https://api.example.com", "https://a"));
        config.audit.sink = AuditSinkKind::File;
        assert!(config.validate().is_err());
    }
}
