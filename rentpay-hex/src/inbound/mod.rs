//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

mod auth;
mod handlers;
mod rate_limit;
mod server;

pub use handlers::{
    ApiKeyInfo, BootstrapRequest, BootstrapResponse, CreateApiKeyRequest, SIGNATURE_HEADER,
};
pub use server::HttpServer;
