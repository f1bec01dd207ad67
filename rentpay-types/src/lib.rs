//! # Rentpay Types
//!
//! Domain types and port traits for the rental payment and security-deposit
//! core. This crate has no IO dependencies: only data structures, business
//! rules and trait definitions.
//!
//! ## Architecture
//!
//! This crate is the innermost core of the hexagonal architecture:
//! - `domain/` - Pure domain types, the fee calculator, state machines and
//!   the reconciliation planner
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    ApiKey, ApiKeyId, ApplyOutcome, AuthorizationId, Booking, BookingId, Calculation, Caller,
    DepositStatus, FinalState, GatewayEvent, GatewayWebhookPayload, IgnoreReason, LinkStatus,
    MethodKind, MethodType, MethodUpdate, Money, Payment, PaymentId, PaymentIntent,
    PaymentMethod, SecurityDepositAuthorization, WebhookEvent, WebhookEventId, WebhookStatus,
};
pub use dto::*;
pub use error::{AppError, DomainError, GatewayError, RepoError};
pub use ports::{PaymentGateway, PaymentRepository};
pub use rentpay_rates::{ConversionRate, CurrencyCode};
