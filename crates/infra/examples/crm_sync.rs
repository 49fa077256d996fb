//! Example: listing CRM records through the composed client
//!
//! Credentials come from the environment (or `.env`):
//!
//! ```bash
//! export RELAY_CRM_CLIENT_ID=...
//! export RELAY_CRM_CLIENT_SECRET=...
//! export RELAY_CRM_REFRESH_TOKEN=...
//! cargo run -p relay-infra --example crm_sync -- Leads
//! ```
//!
//! Set `RELAY_LOG_FORMAT=json` for machine-readable logs and
//! `RELAY_AUDIT_PATH=audit.jsonl` to keep the audit trail on disk.

use std::time::Duration;

use relay_core::RequestOptions;
use relay_infra::{init_tracing, ApiClient, LogFormat};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(LogFormat::from_env());

    let module = std::env::args().nth(1).unwrap_or_else(|| "Leads".to_string());
    let client = ApiClient::from_env()?;

    let options = RequestOptions::new()
        .blocking(Duration::from_secs(5))
        .with_context(json!({ "job": "crm_sync", "module": module }));
    let response = client.crm().list_records(&module, 1, 50, options).await?;

    let count = response
        .json()
        .and_then(|body| body.get("data"))
        .and_then(|data| data.as_array())
        .map_or(0, Vec::len);
    tracing::info!(module = %module, status = response.status, count, "fetched records");

    if let Some(trail) = client.audit_trail() {
        let stats = trail.statistics();
        tracing::info!(entries = stats.total_entries, "audit trail");
    }
    Ok(())
}
