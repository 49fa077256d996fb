//! Domain types and models

pub mod audit;
pub mod credential;
pub mod request;
pub mod service;

pub use audit::{AuditEvent, AuditOutcome};
pub use credential::{Credential, TokenGrant};
pub use request::{AdmissionMode, ApiRequest, ApiResponse, HttpMethod, Payload};
pub use service::ServiceId;
