//! JSON-RPC HTTP gateway for the federated-learning registry
//!
//! Thin passthrough over `fl_registry::Registry`: request parsing,
//! caller signature verification, and error-code translation. No
//! business logic lives here.

pub mod auth;
pub mod command;
pub mod http_server;
pub mod methods;

pub use command::Command;
pub use http_server::HttpGateway;
pub use methods::{GatewayContext, GatewayError};
