//! # Rentpay Hex
//!
//! Application service layer, gateway adapters and HTTP adapter for the
//! rental payment core.
//!
//! ## Architecture
//!
//! - `service/` - Application service (orchestrates domain operations)
//! - `outbound/` - Payment gateway adapters (hosted checkout and sandbox)
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over `R: PaymentRepository` and holds the
//! gateway as `Arc<dyn PaymentGateway>`, so both sides can be swapped.

pub mod inbound;
pub mod openapi;
pub mod outbound;
pub mod service;


pub use outbound::{HttpGateway, SandboxGateway};
pub use service::{PaymentService, ServiceSettings};
