//! Shared fixtures for infra integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use relay_domain::{Credential, IntegrationConfig, ServiceConfig, ServiceId};
use wiremock::MockServer;

pub const TOKEN_PATH: &str = "/oauth/v2/token";

/// Service settings pointing both the API and the token endpoint at `server`
pub fn service_config(server: &MockServer, api_prefix: &str) -> ServiceConfig {
    let mut service = ServiceConfig::new(
        format!("{}{api_prefix}", server.uri()),
        format!("{}{TOKEN_PATH}", server.uri()),
    );
    service.client_id = Some("client-1".to_string());
    service.client_secret = Some("secret-1".to_string());
    service.initial_backoff_ms = 10;
    service.max_backoff_ms = 50;
    service
}

/// CRM and Books against one mock server, memory store and sink
pub fn mock_config(server: &MockServer) -> IntegrationConfig {
    let mut books = service_config(server, "/books/v3");
    books.params.insert("organization_id".to_string(), "600100".to_string());

    let services = BTreeMap::from([
        (ServiceId::CRM.to_string(), service_config(server, "/crm/v2")),
        (ServiceId::BOOKS.to_string(), books),
    ]);
    IntegrationConfig { services, ..IntegrationConfig::default() }
}

pub fn credential(service: ServiceId, access: &str, expires_in_seconds: i64) -> Credential {
    Credential {
        service,
        access_token: access.to_string(),
        refresh_token: "stored-refresh".to_string(),
        expires_at: Utc::now() + chrono::Duration::seconds(expires_in_seconds),
        scope: BTreeSet::new(),
    }
}
