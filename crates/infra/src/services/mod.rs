//! Per-service API clients
//!
//! Thin wrappers that turn named operations into [`ApiRequest`]s for the
//! shared [`Dispatcher`]. Payloads stay `serde_json::Value`; no business
//! schema is modelled here.

pub mod books;
pub mod crm;
pub mod projects;
pub mod workdrive;

use std::sync::Arc;

use relay_core::{Dispatcher, RequestOptions};
use relay_domain::{ApiRequest, ApiResponse, IntegrationError, Result, ServiceId};

pub use books::BooksClient;
pub use crm::CrmClient;
pub use projects::ProjectsClient;
pub use workdrive::WorkDriveClient;

/// Dispatcher bound to one service
#[derive(Debug, Clone)]
struct ServiceHandle {
    dispatcher: Arc<Dispatcher>,
    service: ServiceId,
}

impl ServiceHandle {
    fn new(dispatcher: Arc<Dispatcher>, service: ServiceId) -> Self {
        Self { dispatcher, service }
    }

    async fn call(
        &self,
        operation: &str,
        request: ApiRequest,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        self.dispatcher.execute(&self.service, operation, request, options).await
    }

    /// Required service parameter from configuration
    fn param(&self, key: &str) -> Result<String> {
        self.dispatcher
            .service_config(&self.service)
            .and_then(|config| config.param(key))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                IntegrationError::config(format!(
                    "service '{}' requires parameter '{key}'",
                    self.service
                ))
            })
    }
}

/// Check a caller-supplied identifier before it becomes a path segment
fn segment<'a>(kind: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '?', '#', '%'])
    {
        return Err(IntegrationError::config(format!("invalid {kind} '{value}'")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_rejects_path_tricks() {
        assert_eq!(segment("module", " Leads ").unwrap(), "Leads");
        for bad in ["", "..", "Leads/1", "a?b", "a#b", "%2e%2e"] {
            assert!(segment("module", bad).is_err(), "{bad}");
        }
    }
}
