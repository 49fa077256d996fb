//! Request dispatch

pub mod options;
pub mod ports;
pub mod service;

pub use options::RequestOptions;
pub use ports::{OutboundRequest, Transport, TransportError, TransportResponse};
pub use service::Dispatcher;
