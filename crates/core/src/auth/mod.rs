//! OAuth credential lifecycle

pub mod memory;
pub mod ports;
pub mod token_manager;

pub use memory::InMemoryTokenStore;
pub use ports::{RefreshError, TokenRefresher, TokenStore};
pub use token_manager::TokenManager;
