//! Outbound adapters for the card gateway port.
//!
//! - `http_gateway` - REST client for the hosted-checkout gateway
//! - `sandbox` - in-memory gateway for local runs and tests

mod http_gateway;
mod sandbox;

pub use http_gateway::HttpGateway;
pub use sandbox::{SandboxGateway, SandboxSession, SessionState};
