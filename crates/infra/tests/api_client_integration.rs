//! End-to-end tests: real HTTP adapters against wiremock upstreams

mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_core::{
    AuditSink, InMemoryAuditSink, RequestOptions, TokenRefresher, TokenStore, Transport,
};
use relay_domain::{
    ApiErrorKind, ApiRequest, AuditEvent, AuditOutcome, IntegrationConfig, IntegrationError,
    ServiceId,
};
use relay_infra::{ApiClient, FileAuditSink, FileTokenStore, HttpTransport, OAuthRefreshClient};
use serde_json::json;
use support::{credential, mock_config, TOKEN_PATH};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build(
    config: IntegrationConfig,
    store: Arc<dyn TokenStore>,
    audit: Arc<dyn AuditSink>,
) -> ApiClient {
    let transport = HttpTransport::new().unwrap();
    let refresher: Arc<dyn TokenRefresher> =
        Arc::new(OAuthRefreshClient::new(transport.client().clone()));
    let transport: Arc<dyn Transport> = Arc::new(transport);
    ApiClient::from_parts(config, transport, refresher, store, audit).unwrap()
}

async fn mount_token_endpoint(server: &MockServer, access_token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": access_token, "expires_in": 3600 }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn read_audit(path: &std::path::Path) -> Vec<AuditEvent> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Validates the composed stack after token expiry.
///
/// Assertions:
/// - Two concurrent calls with an expired token hit the token endpoint once.
/// - Both upstream calls carry the refreshed token.
/// - The refreshed credential is persisted to the token file.
/// - Two audit lines are written.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_after_expiry_refresh_once() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "1000.fresh", 1).await;
    Mock::given(method("GET"))
        .and(path("/crm/v2/Leads"))
        .and(header("authorization", "Bearer 1000.fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));
    store.save(&credential(ServiceId::crm(), "1000.expired", -30)).await.unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let client = build(mock_config(&server), store.clone(), Arc::new(FileAuditSink::new(&audit_path)));

    let crm = ServiceId::crm();
    let (first, second) = tokio::join!(
        client.execute(&crm, "list_leads", ApiRequest::get("/Leads"), RequestOptions::new()),
        client.execute(&crm, "list_leads", ApiRequest::get("/Leads"), RequestOptions::new()),
    );
    assert_eq!(first.unwrap().status, 200);
    assert_eq!(second.unwrap().status, 200);

    let stored = store.load(&crm).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "1000.fresh");
    assert_eq!(stored.refresh_token, "stored-refresh");

    let events = read_audit(&audit_path);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.outcome == AuditOutcome::Success));
}

/// Validates Retry-After against a real HTTP exchange.
///
/// Assertions:
/// - The second attempt waits at least the advertised second.
/// - The call is audited as Retried with two attempts.
#[tokio::test]
async fn test_retry_after_from_upstream_is_honoured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v2/Deals"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/v2/Deals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(InMemoryAuditSink::new(16));
    let store = Arc::new(relay_core::InMemoryTokenStore::with_credentials([credential(
        ServiceId::crm(),
        "1000.valid",
        3600,
    )]));
    let client = build(mock_config(&server), store, sink.clone());

    let started = Instant::now();
    let response = client
        .execute(&ServiceId::crm(), "list_deals", ApiRequest::get("/Deals"), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(started.elapsed() >= Duration::from_secs(1));
    let events = sink.events();
    assert_eq!(events[0].outcome, AuditOutcome::Retried);
    assert_eq!(events[0].attempts, 2);
}

#[tokio::test]
async fn test_not_found_is_returned_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v2/Leads/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "code": "INVALID_DATA" })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(relay_core::InMemoryTokenStore::with_credentials([credential(
        ServiceId::crm(),
        "1000.valid",
        3600,
    )]));
    let client = build(mock_config(&server), store, Arc::new(InMemoryAuditSink::new(16)));

    let err = client.crm().get_record("Leads", "404", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(
        err,
        IntegrationError::Api { kind: ApiErrorKind::ClientError, status: Some(404), .. }
    ));
}

/// Validates recovery from a rejected access token.
///
/// Assertions:
/// - A 401 triggers one refresh.
/// - The request is replayed with the new token and succeeds.
#[tokio::test]
async fn test_unauthorized_refreshes_and_replays() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "1000.fresh", 1).await;
    Mock::given(method("GET"))
        .and(path("/crm/v2/Contacts"))
        .and(header("authorization", "Bearer 1000.revoked"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "code": "INVALID_TOKEN" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/v2/Contacts"))
        .and(header("authorization", "Bearer 1000.fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(relay_core::InMemoryTokenStore::with_credentials([credential(
        ServiceId::crm(),
        "1000.revoked",
        3600,
    )]));
    let client = build(mock_config(&server), store, Arc::new(InMemoryAuditSink::new(16)));

    let response =
        client.crm().list_records("Contacts", 1, 200, RequestOptions::new()).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_books_calls_are_organization_scoped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books/v3/invoices/INV-7"))
        .and(query_param("organization_id", "600100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "invoice": { "id": "INV-7" } })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(relay_core::InMemoryTokenStore::with_credentials([credential(
        ServiceId::books(),
        "1000.valid",
        3600,
    )]));
    let client = build(mock_config(&server), store, Arc::new(InMemoryAuditSink::new(16)));

    let books = client.books().unwrap();
    let response = books.get_invoice("INV-7", RequestOptions::new()).await.unwrap();
    assert_eq!(response.json().unwrap()["invoice"]["id"], "INV-7");
}

/// Validates fail-closed auditing with a real file sink.
///
/// Assertions:
/// - An unwritable audit location turns a successful call into AuditWrite.
#[tokio::test]
async fn test_unwritable_audit_file_fails_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let store = Arc::new(relay_core::InMemoryTokenStore::with_credentials([credential(
        ServiceId::crm(),
        "1000.valid",
        3600,
    )]));
    let client =
        build(mock_config(&server), store, Arc::new(FileAuditSink::new(blocker.join("audit.jsonl"))));

    let err = client
        .execute(&ServiceId::crm(), "list_leads", ApiRequest::get("/Leads"), RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::AuditWrite(_)), "{err}");
}

/// Validates the production wiring from configuration alone.
///
/// Assertions:
/// - `from_config` selects the in-memory audit sink by default.
/// - A credential installed with `authorize` is used for the call.
#[tokio::test]
async fn test_from_config_with_authorized_credential() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v2/Leads"))
        .and(header("authorization", "Bearer 1000.operator"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::from_config(mock_config(&server)).unwrap();
    client.authorize(credential(ServiceId::crm(), "1000.operator", 3600)).await.unwrap();

    client.crm().list_records("Leads", 1, 10, RequestOptions::new()).await.unwrap();
    assert_eq!(client.audit_trail().unwrap().len(), 1);
    assert!(client.projects().is_err());
}
