//! Projects API; every path is scoped to the configured portal

use std::sync::Arc;

use relay_core::{Dispatcher, RequestOptions};
use relay_domain::constants::PARAM_PORTAL_ID;
use relay_domain::{ApiRequest, ApiResponse, Result, ServiceId};
use serde_json::Value;

use super::{segment, ServiceHandle};

/// Projects and tasks of one portal
#[derive(Debug, Clone)]
pub struct ProjectsClient {
    handle: ServiceHandle,
    portal_id: String,
}

impl ProjectsClient {
    /// # Errors
    /// `Config` when `portal_id` is not configured or is not a valid path
    /// segment.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let handle = ServiceHandle::new(dispatcher, ServiceId::projects());
        let portal_id = segment("portal id", &handle.param(PARAM_PORTAL_ID)?)?.to_string();
        Ok(Self { handle, portal_id })
    }

    /// Portal every path is scoped to
    pub fn portal_id(&self) -> &str {
        &self.portal_id
    }

    /// Projects in the portal
    pub async fn list_projects(&self, options: RequestOptions) -> Result<ApiResponse> {
        let path = format!("/portal/{}/projects/", self.portal_id);
        self.handle.call("projects.list_projects", ApiRequest::get(path), options).await
    }

    /// Tasks of a project
    pub async fn list_tasks(&self, project_id: &str, options: RequestOptions) -> Result<ApiResponse> {
        let path = format!(
            "/portal/{}/projects/{}/tasks/",
            self.portal_id,
            segment("project id", project_id)?
        );
        self.handle.call("projects.list_tasks", ApiRequest::get(path), options).await
    }

    /// Create a task in a project
    pub async fn create_task(
        &self,
        project_id: &str,
        task: Value,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let path = format!(
            "/portal/{}/projects/{}/tasks/",
            self.portal_id,
            segment("project id", project_id)?
        );
        self.handle.call("projects.create_task", ApiRequest::post(path, task), options).await
    }
}
