//! JSON-file token store
//!
//! One document maps service id to credential. Every save rewrites the whole
//! document through a sibling temp file and a rename, so a crash leaves
//! either the old or the new document on disk. On unix the file is created
//! with mode 0600.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relay_core::TokenStore;
use relay_domain::{Credential, IntegrationError, Result, ServiceId};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::InfraError;

type Document = BTreeMap<String, Credential>;

/// [`TokenStore`] persisting all credentials in one JSON file
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Store backed by the JSON file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Document> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Document::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).map_err(InfraError::from)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(err) => Err(InfraError::from(err).into()),
        }
    }

    async fn write_document(&self, document: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(InfraError::from)?;
        }

        let bytes = serde_json::to_vec_pretty(document).map_err(InfraError::from)?;
        let temp = temp_path(&self.path);
        write_private(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|err| {
            IntegrationError::storage(format!(
                "failed to replace {}: {err}",
                self.path.display()
            ))
        })?;
        debug!(path = %self.path.display(), entries = document.len(), "token store written");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(InfraError::from)?;
    file.write_all(bytes).await.map_err(InfraError::from)?;
    file.sync_all().await.map_err(InfraError::from)?;
    Ok(())
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, service: &ServiceId) -> Result<Option<Credential>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.remove(service.as_str()))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(credential.service.as_str().to_string(), credential.clone());
        self.write_document(&document).await
    }

    async fn delete(&self, service: &ServiceId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        if document.remove(service.as_str()).is_some() {
            self.write_document(&document).await?;
        }
        Ok(())
    }
}
