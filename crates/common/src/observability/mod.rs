//! Observability primitives
//!
//! All human-readable logging from the integration layer goes through
//! [`SecureLogger`], which redacts context before handing it to `tracing`.

pub mod secure_logger;

pub use secure_logger::{LogLevel, SecureLogger};
