//! OAuth credentials and refresh grants

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ServiceId;
use crate::constants::DEFAULT_GRANT_EXPIRES_IN_SECONDS;

/// One credential record per external service
///
/// Replaced as a whole on refresh, never patched field by field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Service the credential authorizes
    pub service: ServiceId,
    /// Bearer token sent upstream
    pub access_token: String,
    /// Long-lived token exchanged for new access tokens
    pub refresh_token: String,
    /// Instant the access token stops being accepted
    pub expires_at: DateTime<Utc>,
    /// Granted scopes
    #[serde(default)]
    pub scope: BTreeSet<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("service", &self.service)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Credential {
    /// Whether the access token is still valid at `now` with `margin` to spare
    ///
    /// Strict: a token expiring exactly at `now + margin` is not usable.
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(margin).is_some_and(|deadline| self.expires_at > deadline)
    }

    /// Build the replacement credential from a refresh grant
    ///
    /// A grant without a new refresh token keeps `previous_refresh_token`.
    pub fn from_grant(
        service: ServiceId,
        grant: TokenGrant,
        previous_refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let scope = grant.scopes();
        let lifetime = i64::try_from(grant.expires_in_seconds()).unwrap_or(i64::MAX);
        let expires_at = now
            .checked_add_signed(chrono::Duration::seconds(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let refresh_token = grant
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| previous_refresh_token.to_string());

        Self { service, access_token: grant.access_token, refresh_token, expires_at, scope }
    }
}

/// Successful response of an OAuth refresh-token grant
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Newly issued access token
    pub access_token: String,
    /// Rotated refresh token, when the provider issues one
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Space-separated scopes
    #[serde(default)]
    pub scope: Option<String>,
    /// Usually `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl TokenGrant {
    /// Lifetime in seconds, falling back to the provider default
    pub fn expires_in_seconds(&self) -> u64 {
        self.expires_in.unwrap_or(DEFAULT_GRANT_EXPIRES_IN_SECONDS)
    }

    /// Granted scopes; providers separate them with spaces or commas
    pub fn scopes(&self) -> BTreeSet<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split([' ', ','])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
