//! CRM records API

use std::sync::Arc;

use relay_core::{Dispatcher, RequestOptions};
use relay_domain::{ApiRequest, ApiResponse, Result, ServiceId};
use serde_json::{json, Value};

use super::{segment, ServiceHandle};

/// Module-scoped record operations (`Leads`, `Contacts`, `Deals`, ...)
#[derive(Debug, Clone)]
pub struct CrmClient {
    handle: ServiceHandle,
}

impl CrmClient {
    /// Client over a shared dispatcher
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { handle: ServiceHandle::new(dispatcher, ServiceId::crm()) }
    }

    /// One page of records of a module
    pub async fn list_records(
        &self,
        module: &str,
        page: u32,
        per_page: u32,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let request = ApiRequest::get(format!("/{}", segment("module", module)?))
            .query("page", page.to_string())
            .query("per_page", per_page.to_string());
        self.handle.call("crm.list_records", request, options).await
    }

    /// A single record
    pub async fn get_record(
        &self,
        module: &str,
        id: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let path = format!("/{}/{}", segment("module", module)?, segment("record id", id)?);
        self.handle.call("crm.get_record", ApiRequest::get(path), options).await
    }

    /// Insert records; the upstream wraps them as `{"data": [...]}`
    pub async fn create_records(
        &self,
        module: &str,
        records: Vec<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let request =
            ApiRequest::post(format!("/{}", segment("module", module)?), json!({ "data": records }));
        self.handle.call("crm.create_records", request, options).await
    }

    /// Update records; each record carries its own `id`
    pub async fn update_records(
        &self,
        module: &str,
        records: Vec<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let request =
            ApiRequest::put(format!("/{}", segment("module", module)?), json!({ "data": records }));
        self.handle.call("crm.update_records", request, options).await
    }

    /// Search with a criteria expression such as `(Email:equals:a@b.com)`
    pub async fn search_records(
        &self,
        module: &str,
        criteria: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let request = ApiRequest::get(format!("/{}/search", segment("module", module)?))
            .query("criteria", criteria);
        self.handle.call("crm.search_records", request, options).await
    }
}
