//! Integration tests for the error taxonomy and credential lifecycle types

use std::time::Duration;

use chrono::{TimeZone, Utc};
use relay_common::{ErrorClassification, ErrorSeverity};
use relay_domain::{
    ApiErrorKind, AuthErrorKind, Credential, IntegrationError, ServiceId, TokenGrant,
};

fn every_variant() -> Vec<IntegrationError> {
    let crm = ServiceId::crm();
    vec![
        IntegrationError::config("missing credentials"),
        IntegrationError::reauthorization_required(crm.clone(), "invalid_grant"),
        IntegrationError::auth_transient(crm.clone(), "503 from token endpoint"),
        IntegrationError::RateLimited { service: crm.clone(), retry_after: None },
        IntegrationError::RateLimitTimeout { service: crm.clone(), waited: Duration::from_secs(1) },
        IntegrationError::api(ApiErrorKind::ClientError, Some(404), "not found"),
        IntegrationError::api(ApiErrorKind::ServerError, Some(503), "unavailable"),
        IntegrationError::api(ApiErrorKind::Transient, None, "timed out"),
        IntegrationError::AmbiguousOutcome {
            service: crm,
            operation: "create_records".into(),
            message: "connection reset".into(),
        },
        IntegrationError::audit_write("sink down"),
        IntegrationError::storage("read-only filesystem"),
        IntegrationError::Cancelled,
    ]
}

/// Validates the "try again later" versus "needs human action" split.
///
/// Assertions:
/// - No error is both transient and operator-actionable.
/// - Every label is unique and snake_case.
/// - Only audit failures are critical.
#[test]
fn test_taxonomy_partitions_cleanly() {
    let errors = every_variant();
    let mut labels: Vec<_> = errors.iter().map(IntegrationError::label).collect();

    for error in &errors {
        assert!(!(error.is_transient() && error.requires_operator_action()), "{error}");
        assert_eq!(error.is_retryable(), error.is_transient());
        assert_eq!(error.is_critical(), matches!(error, IntegrationError::AuditWrite(_)));
    }

    assert!(labels.iter().all(|l| l.chars().all(|c| c.is_ascii_lowercase() || c == '_')));
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), errors.len());
}

/// Validates that a shared failure is indistinguishable across clones.
///
/// Assertions:
/// - A cloned auth error compares equal and keeps its kind.
#[test]
fn test_cloned_errors_are_equal() {
    let original = IntegrationError::reauthorization_required(ServiceId::books(), "revoked");
    let shared = original.clone();

    assert_eq!(original, shared);
    assert!(matches!(
        shared,
        IntegrationError::Auth { kind: AuthErrorKind::ReauthorizationRequired, .. }
    ));
    assert_eq!(shared.severity(), ErrorSeverity::Error);
}

/// Validates a refresh cycle over the domain types alone.
///
/// Assertions:
/// - A refreshed credential from a provider JSON body is usable.
/// - It stops being usable once inside the expiry margin.
#[test]
fn test_credential_from_provider_response() {
    let body = r#"{"access_token":"1000.new","expires_in":3600,"api_domain":"https://www.zohoapis.com","token_type":"Bearer"}"#;
    let grant: TokenGrant = serde_json::from_str(body).unwrap();
    let issued = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

    let credential = Credential::from_grant(ServiceId::crm(), grant, "1000.refresh", issued);
    let margin = Duration::from_secs(60);

    assert!(credential.is_usable_at(issued, margin));
    assert!(!credential.is_usable_at(issued + chrono::Duration::seconds(3541), margin));
    assert_eq!(credential.refresh_token, "1000.refresh");
}
