//! In-process token store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_domain::{Credential, Result, ServiceId};

use super::ports::TokenStore;

/// Token store that keeps credentials in memory only
///
/// Suitable for short-lived processes and tests; credentials are lost on
/// restart.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    credentials: Mutex<HashMap<ServiceId, Credential>>,
}

impl InMemoryTokenStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `credentials`
    pub fn with_credentials(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let map = credentials.into_iter().map(|c| (c.service.clone(), c)).collect();
        Self { credentials: Mutex::new(map) }
    }

    /// Synchronous peek, mainly for assertions
    pub fn get(&self, service: &ServiceId) -> Option<Credential> {
        self.credentials.lock().get(service).cloned()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self, service: &ServiceId) -> Result<Option<Credential>> {
        Ok(self.get(service))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        self.credentials.lock().insert(credential.service.clone(), credential.clone());
        Ok(())
    }

    async fn delete(&self, service: &ServiceId) -> Result<()> {
        self.credentials.lock().remove(service);
        Ok(())
    }
}
