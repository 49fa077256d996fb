//! WorkDrive files API

use std::sync::Arc;

use relay_core::{Dispatcher, RequestOptions};
use relay_domain::{ApiRequest, ApiResponse, Result, ServiceId};
use serde_json::json;

use super::{segment, ServiceHandle};

/// WorkDrive file operations
#[derive(Debug, Clone)]
pub struct WorkDriveClient {
    handle: ServiceHandle,
}

impl WorkDriveClient {
    /// Client over a shared dispatcher
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { handle: ServiceHandle::new(dispatcher, ServiceId::workdrive()) }
    }

    /// Children of a folder
    pub async fn list_folder(&self, folder_id: &str, options: RequestOptions) -> Result<ApiResponse> {
        let path = format!("/files/{}/files", segment("folder id", folder_id)?);
        self.handle.call("workdrive.list_folder", ApiRequest::get(path), options).await
    }

    /// File or folder metadata
    pub async fn get_file(&self, file_id: &str, options: RequestOptions) -> Result<ApiResponse> {
        let path = format!("/files/{}", segment("file id", file_id)?);
        self.handle.call("workdrive.get_file", ApiRequest::get(path), options).await
    }

    /// Create a folder under `parent_id`
    pub async fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let body = json!({
            "data": {
                "type": "files",
                "attributes": { "name": name, "parent_id": segment("parent id", parent_id)? }
            }
        });
        self.handle.call("workdrive.create_folder", ApiRequest::post("/files", body), options).await
    }
}
