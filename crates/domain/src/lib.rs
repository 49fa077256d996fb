//! # Relay Domain
//!
//! Data types shared by every layer of the integration core.
//!
//! This crate contains:
//! - Service identities, credentials and OAuth grants
//! - Transport-agnostic request/response envelopes
//! - Audit events
//! - Configuration structures
//! - The `IntegrationError` taxonomy
//!
//! ## Architecture
//! - Depends only on `relay-common`'s foundation tier
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
