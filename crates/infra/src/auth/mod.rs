//! Credential adapters

pub mod file_store;
pub mod refresh_client;

pub use file_store::FileTokenStore;
pub use refresh_client::OAuthRefreshClient;
