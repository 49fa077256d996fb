//! Append-only JSON-lines audit sink

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relay_core::{AuditSink, AuditSinkError};
use relay_domain::AuditEvent;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// [`AuditSink`] writing one JSON object per line
///
/// The file is opened lazily in append mode; parent directories are created
/// on first use. Each event is flushed and synced before `record` returns.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileAuditSink {
    /// Sink appending to the JSON-lines file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: Mutex::new(None) }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path).await
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let mut line = serde_json::to_vec(event)
            .map_err(|err| AuditSinkError::new(format!("failed to encode audit event: {err}")))?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            let file = self.open().await.map_err(|err| {
                AuditSinkError::new(format!("cannot open {}: {err}", self.path.display()))
            })?;
            *guard = Some(file);
        }
        let Some(file) = guard.as_mut() else {
            return Err(AuditSinkError::new("audit file unavailable"));
        };

        let written = async {
            file.write_all(&line).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;

        if let Err(err) = written {
            // Reopen on the next event instead of reusing a broken handle.
            *guard = None;
            return Err(AuditSinkError::new(format!(
                "cannot append to {}: {err}",
                self.path.display()
            )));
        }
        Ok(())
    }
}
