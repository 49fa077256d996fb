//! Books invoices API
//!
//! Every call is scoped to the configured `organization_id`.

use std::sync::Arc;

use relay_core::{Dispatcher, RequestOptions};
use relay_domain::constants::PARAM_ORGANIZATION_ID;
use relay_domain::{ApiRequest, ApiResponse, Result, ServiceId};
use serde_json::Value;

use super::{segment, ServiceHandle};

/// Books invoices, scoped to one organization
#[derive(Debug, Clone)]
pub struct BooksClient {
    handle: ServiceHandle,
    organization_id: String,
}

impl BooksClient {
    /// Bind to the organization configured for the `books` service
    ///
    /// # Errors
    /// `Config` when `organization_id` is not configured.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let handle = ServiceHandle::new(dispatcher, ServiceId::books());
        let organization_id = handle.param(PARAM_ORGANIZATION_ID)?;
        Ok(Self { handle, organization_id })
    }

    /// Organization every call is scoped to
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    fn scoped(&self, request: ApiRequest) -> ApiRequest {
        request.query(PARAM_ORGANIZATION_ID, self.organization_id.as_str())
    }

    /// One page of invoices
    pub async fn list_invoices(&self, page: u32, options: RequestOptions) -> Result<ApiResponse> {
        let request = self.scoped(ApiRequest::get("/invoices")).query("page", page.to_string());
        self.handle.call("books.list_invoices", request, options).await
    }

    /// A single invoice
    pub async fn get_invoice(&self, invoice_id: &str, options: RequestOptions) -> Result<ApiResponse> {
        let path = format!("/invoices/{}", segment("invoice id", invoice_id)?);
        self.handle.call("books.get_invoice", self.scoped(ApiRequest::get(path)), options).await
    }

    /// Create an invoice; sent once unless an idempotency key is set
    pub async fn create_invoice(&self, invoice: Value, options: RequestOptions) -> Result<ApiResponse> {
        let request = self.scoped(ApiRequest::post("/invoices", invoice));
        self.handle.call("books.create_invoice", request, options).await
    }
}
