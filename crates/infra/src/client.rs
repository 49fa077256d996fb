//! Facade wiring the integration layer together

use std::sync::Arc;

use relay_core::{
    AuditLogger, AuditSink, Dispatcher, InMemoryAuditSink, InMemoryTokenStore, RateLimiter,
    RequestOptions, TokenManager, TokenRefresher, TokenStore, Transport,
};
use relay_domain::{
    ApiRequest, ApiResponse, AuditSinkKind, Credential, IntegrationConfig, IntegrationError,
    Result, ServiceId, TokenStoreKind,
};
use tracing::info;

use crate::audit::FileAuditSink;
use crate::auth::{FileTokenStore, OAuthRefreshClient};
use crate::config;
use crate::http::HttpTransport;
use crate::services::{BooksClient, CrmClient, ProjectsClient, WorkDriveClient};

/// Entry point for applications: one shared dispatcher plus the per-service
/// clients built on it
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Arc<IntegrationConfig>,
    dispatcher: Arc<Dispatcher>,
    audit_trail: Option<Arc<InMemoryAuditSink>>,
}

impl ApiClient {
    /// Load configuration (file, presets, environment) and build a client
    ///
    /// # Errors
    /// Any configuration or HTTP client construction error.
    pub fn from_env() -> Result<Self> {
        Self::from_config(config::load()?)
    }

    /// Build the production stack described by `config`
    ///
    /// # Errors
    /// `Config` when the configuration does not validate.
    pub fn from_config(config: IntegrationConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new()?;
        let refresher = Arc::new(OAuthRefreshClient::new(transport.client().clone()));

        let store: Arc<dyn TokenStore> = match config.token_store.kind {
            TokenStoreKind::Memory => Arc::new(InMemoryTokenStore::new()),
            TokenStoreKind::File => {
                let path = config.token_store.path.clone().ok_or_else(|| {
                    IntegrationError::config("token_store.path is required for the file store")
                })?;
                Arc::new(FileTokenStore::new(path))
            }
        };

        let (audit, audit_trail) = match config.audit.sink {
            AuditSinkKind::Memory => {
                let sink = Arc::new(InMemoryAuditSink::new(config.audit.memory_capacity));
                (Arc::clone(&sink) as Arc<dyn AuditSink>, Some(sink))
            }
            AuditSinkKind::File => {
                let path = config.audit.path.clone().ok_or_else(|| {
                    IntegrationError::config("audit.path is required for the file sink")
                })?;
                (Arc::new(FileAuditSink::new(path)) as Arc<dyn AuditSink>, None)
            }
        };

        let mut client = Self::from_parts(config, Arc::new(transport), refresher, store, audit)?;
        client.audit_trail = audit_trail;
        Ok(client)
    }

    /// Build a client from explicit adapters
    ///
    /// # Errors
    /// `Config` when the configuration does not validate.
    pub fn from_parts(
        config: IntegrationConfig,
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<dyn TokenStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenManager::new(&config, store, refresher));
        let limiter = Arc::new(RateLimiter::from_config(&config)?);
        let dispatcher =
            Dispatcher::new(&config, tokens, limiter, transport, AuditLogger::new(audit))?;

        info!(services = config.services.len(), "integration client ready");
        Ok(Self { config: Arc::new(config), dispatcher: Arc::new(dispatcher), audit_trail: None })
    }

    /// Dispatch an arbitrary request to a configured service
    ///
    /// # Errors
    /// See [`Dispatcher::execute`].
    pub async fn execute(
        &self,
        service: &ServiceId,
        operation: &str,
        request: ApiRequest,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        self.dispatcher.execute(service, operation, request, options).await
    }

    /// CRM client
    pub fn crm(&self) -> CrmClient {
        CrmClient::new(Arc::clone(&self.dispatcher))
    }

    /// # Errors
    /// `Config` when the `books` service has no `organization_id`.
    pub fn books(&self) -> Result<BooksClient> {
        BooksClient::new(Arc::clone(&self.dispatcher))
    }

    /// # Errors
    /// `Config` when the `projects` service has no `portal_id`.
    pub fn projects(&self) -> Result<ProjectsClient> {
        ProjectsClient::new(Arc::clone(&self.dispatcher))
    }

    /// WorkDrive client
    pub fn workdrive(&self) -> WorkDriveClient {
        WorkDriveClient::new(Arc::clone(&self.dispatcher))
    }

    /// Install a credential obtained out of band (operator re-authorization)
    ///
    /// # Errors
    /// `Config` for unknown services, `Storage` when it cannot be persisted.
    pub async fn authorize(&self, credential: Credential) -> Result<()> {
        self.token_manager().authorize(credential).await
    }

    /// Shared token manager
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        self.dispatcher.token_manager()
    }

    /// Shared dispatcher
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Loaded configuration
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// The in-memory audit sink, when the configuration selected it
    pub fn audit_trail(&self) -> Option<&Arc<InMemoryAuditSink>> {
        self.audit_trail.as_ref()
    }
}
