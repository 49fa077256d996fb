//! Token manager with single-flight refresh
//!
//! Manages the OAuth credential of every configured service:
//! - Lazy load from the [`TokenStore`] on first use
//! - Refresh when the access token is inside the expiry margin
//! - At most one refresh in flight per service; concurrent callers share its
//!   result, success or failure
//! - Persist before publish: a refreshed credential is saved before any
//!   waiter sees it
//! - Rejected refresh tokens park the service in a re-authorization state
//!   until [`TokenManager::authorize`] installs a new credential
//!
//! Each service has its own slot and lock, so refreshes of different
//! services never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use relay_common::resilience::{RetryDecision as ExecutorDecision, RetryExecutor};
use relay_common::{Clock, SystemClock};
use relay_domain::{
    AuthErrorKind, Credential, IntegrationConfig, IntegrationError, Result, ServiceConfig,
    ServiceId,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::ports::{RefreshError, TokenRefresher, TokenStore};
use crate::retry_policy::RetryPolicy;

type RefreshFlight = Shared<BoxFuture<'static, Result<Credential>>>;

#[derive(Default)]
struct SlotState {
    credential: Option<Credential>,
    /// Reason the refresh token was rejected; cleared by `authorize`
    revoked: Option<String>,
    inflight: Option<RefreshFlight>,
    /// Bumped by `authorize`; a flight started under an older epoch returns
    /// its result but leaves the slot alone
    epoch: u64,
}

struct ServiceSlot {
    service: ServiceId,
    config: ServiceConfig,
    loaded: OnceCell<()>,
    state: Mutex<SlotState>,
}

#[derive(Clone)]
struct RefreshDeps {
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
}

impl RefreshDeps {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }
}

/// Hands out valid access tokens, refreshing them as needed
pub struct TokenManager {
    slots: HashMap<ServiceId, Arc<ServiceSlot>>,
    deps: RefreshDeps,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager").field("services", &self.slots.keys()).finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a token manager for every service in `config`
    pub fn new(
        config: &IntegrationConfig,
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self::with_clock(config, store, refresher, Arc::new(SystemClock))
    }

    /// Create a token manager with a custom clock
    pub fn with_clock(
        config: &IntegrationConfig,
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let slots = config
            .services
            .iter()
            .map(|(name, service_config)| {
                let service = ServiceId::new(name);
                let slot = ServiceSlot {
                    service: service.clone(),
                    config: service_config.clone(),
                    loaded: OnceCell::new(),
                    state: Mutex::new(SlotState::default()),
                };
                (service, Arc::new(slot))
            })
            .collect();

        Self { slots, deps: RefreshDeps { store, refresher, clock } }
    }

    /// A valid access token for `service`
    ///
    /// Returns the cached token when it is outside the expiry margin;
    /// otherwise joins or starts the service's single refresh.
    ///
    /// # Errors
    /// - `Config` for unknown services or missing credentials
    /// - `Auth(ReauthorizationRequired)` once the refresh token was rejected
    /// - `Auth(Transient)` when refresh retries were exhausted
    /// - `Storage` when the credential could not be loaded or persisted
    #[instrument(skip(self), fields(service = %service))]
    pub async fn get_valid_token(&self, service: &ServiceId) -> Result<String> {
        let slot = self.slot(service)?;
        self.ensure_loaded(slot).await?;

        let flight = {
            let mut state = slot.state.lock();
            check_revoked(slot, &state)?;
            if let Some(credential) = &state.credential {
                if credential.is_usable_at(self.deps.now(), slot.config.token_expiry_margin()) {
                    return Ok(credential.access_token.clone());
                }
            }
            self.join_or_start(slot, &mut state)?
        };

        flight.await.map(|credential| credential.access_token)
    }

    /// Replacement for an access token the upstream API rejected with 401
    ///
    /// If another caller already replaced `rejected_token`, the newer token is
    /// returned without a refresh. Otherwise the refresh is forced regardless
    /// of the expiry margin, still single-flight.
    #[instrument(skip(self, rejected_token), fields(service = %service))]
    pub async fn refresh_rejected(&self, service: &ServiceId, rejected_token: &str) -> Result<String> {
        let slot = self.slot(service)?;
        self.ensure_loaded(slot).await?;

        let flight = {
            let mut state = slot.state.lock();
            check_revoked(slot, &state)?;
            if let Some(credential) = &state.credential {
                if credential.access_token != rejected_token {
                    debug!("token already replaced by a concurrent refresh");
                    return Ok(credential.access_token.clone());
                }
            }
            self.join_or_start(slot, &mut state)?
        };

        flight.await.map(|credential| credential.access_token)
    }

    /// Install a credential obtained out of band (operator re-authorization)
    ///
    /// The credential is persisted first; only then does it replace the
    /// cached one and clear any re-authorization-required state.
    pub async fn authorize(&self, credential: Credential) -> Result<()> {
        let slot = self.slot(&credential.service)?;
        self.deps.store.save(&credential).await?;

        {
            let mut state = slot.state.lock();
            state.epoch = state.epoch.wrapping_add(1);
            state.revoked = None;
            state.credential = Some(credential);
        }
        // Anything still on disk is older than what we just installed.
        let _ = slot.loaded.set(());

        info!(service = %slot.service, "credential authorized");
        Ok(())
    }

    /// Cached credential, without triggering a load or refresh
    pub fn cached_credential(&self, service: &ServiceId) -> Option<Credential> {
        self.slots.get(service).and_then(|slot| slot.state.lock().credential.clone())
    }

    /// Whether the service is waiting for operator re-authorization
    pub fn requires_reauthorization(&self, service: &ServiceId) -> bool {
        self.slots.get(service).is_some_and(|slot| slot.state.lock().revoked.is_some())
    }

    /// Configured services, in no particular order
    pub fn services(&self) -> impl Iterator<Item = &ServiceId> {
        self.slots.keys()
    }

    fn slot(&self, service: &ServiceId) -> Result<&Arc<ServiceSlot>> {
        self.slots.get(service).ok_or_else(|| IntegrationError::unknown_service(service))
    }

    async fn ensure_loaded(&self, slot: &Arc<ServiceSlot>) -> Result<()> {
        slot.loaded
            .get_or_try_init(|| async {
                let stored = self.deps.store.load(&slot.service).await?;
                if let Some(credential) = stored {
                    let mut state = slot.state.lock();
                    if state.credential.is_none() {
                        debug!(service = %slot.service, "loaded stored credential");
                        state.credential = Some(credential);
                    }
                }
                Ok::<(), IntegrationError>(())
            })
            .await?;
        Ok(())
    }

    fn join_or_start(&self, slot: &Arc<ServiceSlot>, state: &mut SlotState) -> Result<RefreshFlight> {
        if let Some(flight) = &state.inflight {
            debug!(service = %slot.service, "joining in-flight refresh");
            return Ok(flight.clone());
        }

        let refresh_token = state
            .credential
            .as_ref()
            .map(|credential| credential.refresh_token.clone())
            .filter(|token| !token.is_empty())
            .or_else(|| slot.config.refresh_token.clone().filter(|token| !token.is_empty()))
            .ok_or_else(|| IntegrationError::missing_credentials(&slot.service))?;
        if slot.config.client_credentials().is_none() {
            return Err(IntegrationError::missing_credentials(&slot.service));
        }

        info!(service = %slot.service, "starting token refresh");
        let flight =
            run_refresh(Arc::clone(slot), self.deps.clone(), refresh_token, state.epoch)
                .boxed()
                .shared();
        state.inflight = Some(flight.clone());
        Ok(flight)
    }
}

fn check_revoked(slot: &ServiceSlot, state: &SlotState) -> Result<()> {
    match &state.revoked {
        Some(reason) => {
            Err(IntegrationError::reauthorization_required(slot.service.clone(), reason.clone()))
        }
        None => Ok(()),
    }
}

async fn run_refresh(
    slot: Arc<ServiceSlot>,
    deps: RefreshDeps,
    refresh_token: String,
    epoch: u64,
) -> Result<Credential> {
    let outcome = refresh_and_persist(&slot, &deps, &refresh_token).await;

    let mut state = slot.state.lock();
    state.inflight = None;
    if state.epoch == epoch {
        match &outcome {
            Ok(credential) => state.credential = Some(credential.clone()),
            Err(IntegrationError::Auth {
                kind: AuthErrorKind::ReauthorizationRequired, message, ..
            }) => {
                state.credential = None;
                state.revoked = Some(message.clone());
            }
            Err(_) => {}
        }
    }
    outcome
}

async fn refresh_and_persist(
    slot: &ServiceSlot,
    deps: &RefreshDeps,
    refresh_token: &str,
) -> Result<Credential> {
    let executor = RetryExecutor::new(
        RetryPolicy::backoff_config(&slot.config),
        |error: &RefreshError, _attempt: u32| match error {
            RefreshError::InvalidGrant(_) | RefreshError::Config(_) => ExecutorDecision::Stop,
            RefreshError::Transient { retry_after: Some(delay), .. }
                if *delay <= slot.config.max_retry_after() =>
            {
                ExecutorDecision::RetryAfter(*delay)
            }
            RefreshError::Transient { .. } => ExecutorDecision::Retry,
        },
    );

    let outcome = executor
        .execute_with_outcome(|| deps.refresher.refresh(&slot.service, &slot.config, refresh_token))
        .await;
    let attempts = outcome.attempts;

    match outcome.into_result() {
        Ok(grant) => {
            let credential =
                Credential::from_grant(slot.service.clone(), grant, refresh_token, deps.now());
            deps.store.save(&credential).await?;
            info!(
                service = %slot.service,
                attempts,
                expires_at = %credential.expires_at,
                "token refreshed"
            );
            Ok(credential)
        }
        Err(error) => match error.into_last_error() {
            Some(RefreshError::InvalidGrant(reason)) => {
                warn!(service = %slot.service, "refresh token rejected, re-authorization required");
                if let Err(e) = deps.store.delete(&slot.service).await {
                    warn!(service = %slot.service, error = %e, "failed to drop revoked credential");
                }
                Err(IntegrationError::reauthorization_required(slot.service.clone(), reason))
            }
            Some(RefreshError::Config(reason)) => {
                warn!(service = %slot.service, "token endpoint rejected the client configuration");
                Err(IntegrationError::config(format!("service '{}': {reason}", slot.service)))
            }
            Some(RefreshError::Transient { message, .. }) => {
                warn!(service = %slot.service, attempts, "token refresh failed");
                Err(IntegrationError::auth_transient(slot.service.clone(), message))
            }
            None => Err(IntegrationError::config("invalid refresh retry configuration")),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use relay_common::MockClock;

    use super::*;
    use crate::auth::InMemoryTokenStore;
    use crate::testing::{sample_config, MockTokenRefresher};

    fn credential(access: &str, expires_at: DateTime<Utc>) -> Credential {
        Credential {
            service: ServiceId::crm(),
            access_token: access.into(),
            refresh_token: "refresh-1".into(),
            expires_at,
            scope: BTreeSet::new(),
        }
    }

    fn manager(
        store: Arc<InMemoryTokenStore>,
        refresher: Arc<MockTokenRefresher>,
        clock: MockClock,
    ) -> TokenManager {
        TokenManager::with_clock(&sample_config(), store, refresher, Arc::new(clock))
    }

    #[tokio::test]
    async fn test_valid_cached_token_skips_refresh() {
        let clock = MockClock::new();
        let now = DateTime::<Utc>::from(clock.system_time());
        let store = Arc::new(InMemoryTokenStore::with_credentials([credential(
            "cached",
            now + chrono::Duration::hours(1),
        )]));
        let refresher = Arc::new(MockTokenRefresher::new());
        let manager = manager(store, Arc::clone(&refresher), clock);

        assert_eq!(manager.get_valid_token(&ServiceId::crm()).await.unwrap(), "cached");
        assert_eq!(refresher.calls(), 0);
    }

    /// Validates the expiry margin triggers a refresh.
    ///
    /// Assertions:
    /// - A token expiring within the margin is refreshed.
    /// - The stored credential is replaced before the token is returned.
    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed() {
        let clock = MockClock::new();
        let now = DateTime::<Utc>::from(clock.system_time());
        let store = Arc::new(InMemoryTokenStore::with_credentials([credential(
            "stale",
            now + chrono::Duration::seconds(30),
        )]));
        let refresher = Arc::new(MockTokenRefresher::new());
        let manager = manager(Arc::clone(&store), Arc::clone(&refresher), clock);

        let token = manager.get_valid_token(&ServiceId::crm()).await.unwrap();

        assert_eq!(token, "access-1");
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.get(&ServiceId::crm()).unwrap().access_token, "access-1");
        assert_eq!(refresher.seen_refresh_tokens(), vec!["refresh-1".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_service_is_config_error() {
        let manager = manager(
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(MockTokenRefresher::new()),
            MockClock::new(),
        );
        let err = manager.get_valid_token(&ServiceId::new("erp")).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_config_error() {
        let mut config = sample_config();
        for service in config.services.values_mut() {
            service.refresh_token = None;
        }
        let refresher = Arc::new(MockTokenRefresher::new());
        let manager = TokenManager::new(
            &config,
            Arc::new(InMemoryTokenStore::new()),
            Arc::clone(&refresher) as Arc<dyn TokenRefresher>,
        );

        let err = manager.get_valid_token(&ServiceId::books()).await.unwrap_err();
        assert!(err.to_string().contains("missing credentials"));
        assert_eq!(refresher.calls(), 0);
    }

    /// Validates that absent client credentials are a configuration error.
    ///
    /// Assertions:
    /// - An expired credential without client id/secret yields `Config`.
    /// - The token endpoint is never called.
    /// - The stored credential survives and no re-authorization is demanded.
    #[tokio::test]
    async fn test_missing_client_credentials_keep_stored_credential() {
        let mut config = sample_config();
        for service in config.services.values_mut() {
            service.client_id = None;
            service.client_secret = None;
        }
        let clock = MockClock::new();
        let now = DateTime::<Utc>::from(clock.system_time());
        let store = Arc::new(InMemoryTokenStore::with_credentials([credential(
            "expired",
            now - chrono::Duration::minutes(5),
        )]));
        let refresher = Arc::new(MockTokenRefresher::new());
        let manager = TokenManager::with_clock(
            &config,
            Arc::clone(&store) as Arc<dyn TokenStore>,
            Arc::clone(&refresher) as Arc<dyn TokenRefresher>,
            Arc::new(clock),
        );
        let crm = ServiceId::crm();

        let err = manager.get_valid_token(&crm).await.unwrap_err();

        assert!(matches!(err, IntegrationError::Config(_)), "{err}");
        assert_eq!(refresher.calls(), 0);
        assert!(!manager.requires_reauthorization(&crm));
        assert_eq!(store.get(&crm).unwrap().refresh_token, "refresh-1");
    }

    /// Validates a rejected client configuration at the token endpoint.
    ///
    /// Assertions:
    /// - `RefreshError::Config` surfaces as `Config` after a single call.
    /// - The stored credential is not deleted.
    /// - The service is not parked for re-authorization.
    #[tokio::test]
    async fn test_rejected_client_keeps_stored_credential() {
        let clock = MockClock::new();
        let now = DateTime::<Utc>::from(clock.system_time());
        let store = Arc::new(InMemoryTokenStore::with_credentials([credential(
            "expired",
            now - chrono::Duration::minutes(5),
        )]));
        let refresher = Arc::new(MockTokenRefresher::new());
        refresher.push_result(Err(RefreshError::Config("invalid_client".into())));
        let manager = manager(Arc::clone(&store), Arc::clone(&refresher), clock);
        let crm = ServiceId::crm();

        let err = manager.get_valid_token(&crm).await.unwrap_err();

        assert!(matches!(err, IntegrationError::Config(_)), "{err}");
        assert_eq!(refresher.calls(), 1);
        assert!(!manager.requires_reauthorization(&crm));
        assert_eq!(store.get(&crm).unwrap().access_token, "expired");
    }

    /// Validates bootstrap from a configured refresh token.
    ///
    /// Assertions:
    /// - With an empty store the configured refresh token is used.
    /// - A grant without a new refresh token keeps the configured one.
    #[tokio::test]
    async fn test_bootstrap_from_configured_refresh_token() {
        let store = Arc::new(InMemoryTokenStore::new());
        let refresher = Arc::new(MockTokenRefresher::new());
        let manager = manager(Arc::clone(&store), Arc::clone(&refresher), MockClock::new());

        let token = manager.get_valid_token(&ServiceId::books()).await.unwrap();

        assert_eq!(token, "access-1");
        let stored = store.get(&ServiceId::books()).unwrap();
        assert_eq!(stored.refresh_token, "config-refresh-books");
    }

    /// Validates re-authorization handling.
    ///
    /// Assertions:
    /// - `invalid_grant` yields ReauthorizationRequired without retries.
    /// - Later calls fail fast without contacting the token endpoint.
    /// - `authorize` clears the state and the new token is served.
    #[tokio::test]
    async fn test_invalid_grant_requires_reauthorization() {
        let store = Arc::new(InMemoryTokenStore::new());
        let refresher = Arc::new(MockTokenRefresher::new());
        refresher.push_result(Err(RefreshError::InvalidGrant("invalid_code".into())));
        let clock = MockClock::new();
        let now = DateTime::<Utc>::from(clock.system_time());
        let manager = manager(Arc::clone(&store), Arc::clone(&refresher), clock);
        let crm = ServiceId::crm();

        let err = manager.get_valid_token(&crm).await.unwrap_err();
        assert!(err.requires_operator_action(), "{err}");
        assert!(manager.requires_reauthorization(&crm));

        let again = manager.get_valid_token(&crm).await.unwrap_err();
        assert_eq!(err, again);
        assert_eq!(refresher.calls(), 1);

        manager.authorize(credential("reauthorized", now + chrono::Duration::hours(1))).await.unwrap();
        assert!(!manager.requires_reauthorization(&crm));
        assert_eq!(manager.get_valid_token(&crm).await.unwrap(), "reauthorized");
        assert_eq!(store.get(&crm).unwrap().access_token, "reauthorized");
    }

    /// Validates transient refresh failures are retried.
    ///
    /// Assertions:
    /// - Two transient failures followed by success yield a token.
    /// - Three refresh calls were made.
    #[tokio::test(start_paused = true)]
    async fn test_transient_refresh_failures_are_retried() {
        let refresher = Arc::new(MockTokenRefresher::new());
        refresher.push_result(Err(RefreshError::transient("503")));
        refresher.push_result(Err(RefreshError::transient("connection reset")));
        let manager =
            manager(Arc::new(InMemoryTokenStore::new()), Arc::clone(&refresher), MockClock::new());

        let token = manager.get_valid_token(&ServiceId::crm()).await.unwrap();
        assert_eq!(token, "access-3");
        assert_eq!(refresher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_refresh_retries_are_auth_transient() {
        let refresher = Arc::new(MockTokenRefresher::new());
        for _ in 0..5 {
            refresher.push_result(Err(RefreshError::transient("503")));
        }
        let manager =
            manager(Arc::new(InMemoryTokenStore::new()), Arc::clone(&refresher), MockClock::new());

        let err = manager.get_valid_token(&ServiceId::crm()).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Auth { kind: AuthErrorKind::Transient, .. }));
        assert_eq!(refresher.calls(), 5);
        assert!(!manager.requires_reauthorization(&ServiceId::crm()));
    }

    #[tokio::test]
    async fn test_refresh_rejected_reuses_newer_token() {
        let clock = MockClock::new();
        let now = DateTime::<Utc>::from(clock.system_time());
        let store = Arc::new(InMemoryTokenStore::with_credentials([credential(
            "current",
            now + chrono::Duration::hours(1),
        )]));
        let refresher = Arc::new(MockTokenRefresher::new());
        let manager = manager(store, Arc::clone(&refresher), clock);
        let crm = ServiceId::crm();

        assert_eq!(manager.refresh_rejected(&crm, "older").await.unwrap(), "current");
        assert_eq!(refresher.calls(), 0);

        assert_eq!(manager.refresh_rejected(&crm, "current").await.unwrap(), "access-1");
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_expiry_observed_after_clock_advances() {
        let clock = MockClock::new();
        let refresher = Arc::new(MockTokenRefresher::new().with_expires_in(120));
        let manager =
            manager(Arc::new(InMemoryTokenStore::new()), Arc::clone(&refresher), clock.clone());
        let crm = ServiceId::crm();

        assert_eq!(manager.get_valid_token(&crm).await.unwrap(), "access-1");
        assert_eq!(manager.get_valid_token(&crm).await.unwrap(), "access-1");

        clock.advance(Duration::from_secs(61));
        assert_eq!(manager.get_valid_token(&crm).await.unwrap(), "access-2");
        assert_eq!(refresher.calls(), 2);
    }
}
