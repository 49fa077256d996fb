//! Conversions from external infrastructure errors into integration errors.

use relay_core::TransportError;
use relay_domain::IntegrationError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub IntegrationError);

impl From<InfraError> for IntegrationError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<IntegrationError> for InfraError {
    fn from(value: IntegrationError) -> Self {
        Self(value)
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportError */
/* -------------------------------------------------------------------------- */

/// Classify a reqwest failure by whether the request could have reached the
/// upstream
///
/// Connect and builder failures never left the process. Timeouts are counted
/// as sent since reqwest cannot tell how far the exchange got.
pub fn transport_error(err: &reqwest::Error) -> TransportError {
    if err.is_builder() || err.is_connect() {
        return TransportError::Connect(err.to_string());
    }
    if err.is_timeout() {
        return TransportError::Timeout { sent: true };
    }
    TransportError::Interrupted(err.to_string())
}

/* -------------------------------------------------------------------------- */
/* std::io::Error / serde_json::Error → IntegrationError::Storage */
/* -------------------------------------------------------------------------- */

impl From<std::io::Error> for InfraError {
    fn from(err: std::io::Error) -> Self {
        Self(IntegrationError::storage(format!("I/O error: {err}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        Self(IntegrationError::storage(format!("malformed JSON document: {err}")))
    }
}
