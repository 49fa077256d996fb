//! # Relay Infrastructure
//!
//! Infrastructure implementations of the `relay-core` ports.
//!
//! This crate contains:
//! - reqwest-based HTTP transport and OAuth refresh client
//! - File-backed token store and audit sink
//! - Configuration loading from files and the environment
//! - Tracing bootstrap
//! - Per-service clients and the [`ApiClient`] facade
//!
//! ## Architecture
//! - Implements traits defined in `relay-core`
//! - Contains all "impure" code (network, filesystem, environment)

pub mod audit;
pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod services;

// Re-export commonly used items
pub use audit::FileAuditSink;
pub use auth::{FileTokenStore, OAuthRefreshClient};
pub use client::ApiClient;
pub use errors::InfraError;
pub use http::{HttpTransport, HttpTransportBuilder};
pub use observability::{init_tracing, LogFormat};
pub use services::{BooksClient, CrmClient, ProjectsClient, WorkDriveClient};
