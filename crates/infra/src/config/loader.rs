//! Configuration loader
//!
//! Loads the integration configuration from a file or from presets, then
//! overlays credentials and per-deployment values from the environment.
//!
//! ## Loading Strategy
//! 1. Reads `.env` from the working directory when present
//! 2. Uses `RELAY_CONFIG` when set, otherwise searches standard file paths
//! 3. Falls back to the four preset services when no file exists
//! 4. Overlays environment variables and validates the result
//!
//! ## Environment Variables
//! For service `crm` and the default prefix `RELAY`:
//! - `RELAY_CRM_CLIENT_ID`, `RELAY_CRM_CLIENT_SECRET`, `RELAY_CRM_REFRESH_TOKEN`
//! - `RELAY_CLIENT_ID`, `RELAY_CLIENT_SECRET`, `RELAY_REFRESH_TOKEN`: used by
//!   services without a value of their own
//! - `RELAY_CRM_BASE_URL`, `RELAY_CRM_TOKEN_URL`: endpoint overrides
//! - `RELAY_BOOKS_ORGANIZATION_ID`, `RELAY_PROJECTS_PORTAL_ID`: service
//!   parameters (any service accepts either)
//! - `RELAY_AUDIT_PATH`: switches the audit sink to a JSON-lines file
//! - `RELAY_TOKEN_STORE_PATH`: switches the token store to a JSON file
//!
//! ## File Locations
//! The loader searches the following paths (in order), relative to the
//! working directory: `relay.toml`, `relay.json`, `config/relay.toml`,
//! `config/relay.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use relay_domain::constants::{DEFAULT_ENV_PREFIX, PARAM_ORGANIZATION_ID, PARAM_PORTAL_ID};
use relay_domain::{
    AuditSinkKind, IntegrationConfig, IntegrationError, Result, ServiceConfig, ServiceId,
    TokenStoreKind,
};
use url::Url;

/// Explicit config file path
pub const CONFIG_PATH_VAR: &str = "RELAY_CONFIG";

const ZOHO_ACCOUNTS_TOKEN_URL: &str = "https://accounts.zoho.com/oauth/v2/token";
const ZOHO_AUTH_SCHEME: &str = "Zoho-oauthtoken";

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `IntegrationError::Config` if the file cannot be read or parsed,
/// or the resulting configuration does not validate.
pub fn load() -> Result<IntegrationConfig> {
    load_dotenv();

    let explicit = std::env::var(CONFIG_PATH_VAR).ok().filter(|v| !v.trim().is_empty());
    match explicit.map(PathBuf::from).or_else(discover_config_path) {
        Some(path) => load_from_file(Some(path)),
        None => {
            tracing::debug!("no config file found, using service presets");
            load_from_env()
        }
    }
}

/// Build the preset services and overlay the environment
///
/// # Errors
/// Returns `IntegrationError::Config` if an overlaid value does not validate.
pub fn load_from_env() -> Result<IntegrationConfig> {
    let mut config = preset_config();
    apply_env_overrides(&mut config);
    validate(&config)?;
    tracing::info!(services = config.services.len(), "Configuration loaded from environment");
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations. Supports JSON and
/// TOML (detected by file extension). Environment overrides are applied
/// after parsing.
///
/// # Errors
/// Returns `IntegrationError::Config` if:
/// - File not found
/// - File format is invalid
/// - The configuration does not validate
pub fn load_from_file(path: Option<PathBuf>) -> Result<IntegrationConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(IntegrationError::config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => discover_config_path().ok_or_else(|| {
            IntegrationError::config("No config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| IntegrationError::config(format!("Failed to read config file: {e}")))?;

    let mut config = parse_config(&contents, &config_path)?;
    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Structural validation plus absolute http(s) endpoint URLs
fn validate(config: &IntegrationConfig) -> Result<()> {
    config.validate()?;
    for (name, service) in &config.services {
        check_url(name, "base_url", &service.base_url)?;
        if !service.token_url.is_empty() {
            check_url(name, "token_url", &service.token_url)?;
        }
    }
    Ok(())
}

fn check_url(service: &str, field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| {
        IntegrationError::config(format!("service '{service}': invalid {field} '{value}': {e}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(IntegrationError::config(format!(
            "service '{service}': {field} must use http or https"
        )));
    }
    Ok(())
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<IntegrationConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| IntegrationError::config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| IntegrationError::config(format!("Invalid JSON format: {e}"))),
        _ => Err(IntegrationError::config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn discover_config_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    [
        cwd.join("relay.toml"),
        cwd.join("relay.json"),
        cwd.join("config").join("relay.toml"),
        cwd.join("config").join("relay.json"),
    ]
    .into_iter()
    .find(|path| path.exists())
}

/// The four stock services with their public endpoints
///
/// Credentials are left empty; they come from the environment.
pub fn preset_config() -> IntegrationConfig {
    let presets = [
        (ServiceId::CRM, "https://www.zohoapis.com/crm/v2"),
        (ServiceId::BOOKS, "https://www.zohoapis.com/books/v3"),
        (ServiceId::PROJECTS, "https://projectsapi.zoho.com/restapi"),
        (ServiceId::WORKDRIVE, "https://www.zohoapis.com/workdrive/api/v1"),
    ];

    let services: BTreeMap<String, ServiceConfig> = presets
        .into_iter()
        .map(|(name, base_url)| {
            let mut service = ServiceConfig::new(base_url, ZOHO_ACCOUNTS_TOKEN_URL);
            service.auth_scheme = ZOHO_AUTH_SCHEME.to_string();
            (name.to_string(), service)
        })
        .collect();

    IntegrationConfig {
        env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        services,
        ..IntegrationConfig::default()
    }
}

/// Overlay environment variables onto `config`
///
/// Service-specific variables win over file values; shared credential
/// variables only fill gaps.
pub fn apply_env_overrides(config: &mut IntegrationConfig) {
    let prefix = config.env_prefix.trim().to_ascii_uppercase();
    let shared = |suffix: &str| env_var(&format!("{prefix}_{suffix}"));

    for (name, service) in &mut config.services {
        let key = ServiceId::new(name).env_key();
        let scoped = |suffix: &str| env_var(&format!("{prefix}_{key}_{suffix}"));

        overlay_secret(&mut service.client_id, scoped("CLIENT_ID"), shared("CLIENT_ID"));
        overlay_secret(&mut service.client_secret, scoped("CLIENT_SECRET"), shared("CLIENT_SECRET"));
        overlay_secret(&mut service.refresh_token, scoped("REFRESH_TOKEN"), shared("REFRESH_TOKEN"));

        if let Some(base_url) = scoped("BASE_URL") {
            service.base_url = base_url;
        }
        if let Some(token_url) = scoped("TOKEN_URL") {
            service.token_url = token_url;
        }
        for param in [PARAM_ORGANIZATION_ID, PARAM_PORTAL_ID] {
            if let Some(value) = scoped(&param.to_ascii_uppercase()) {
                service.params.insert(param.to_string(), value);
            }
        }
    }

    if let Some(path) = shared("AUDIT_PATH") {
        config.audit.sink = AuditSinkKind::File;
        config.audit.path = Some(PathBuf::from(path));
    }
    if let Some(path) = shared("TOKEN_STORE_PATH") {
        config.token_store.kind = TokenStoreKind::File;
        config.token_store.path = Some(PathBuf::from(path));
    }
}

fn overlay_secret(slot: &mut Option<String>, scoped: Option<String>, shared: Option<String>) {
    if let Some(value) = scoped {
        *slot = Some(value);
    } else if slot.as_deref().map_or(true, str::is_empty) {
        if let Some(value) = shared {
            *slot = Some(value);
        }
    }
}

/// Read `.env` if present; a missing file is not an error
fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!(error = %err, "ignoring unreadable .env file"),
    }
}

/// Non-empty environment variable
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
