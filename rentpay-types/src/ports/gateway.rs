//! Payment gateway port.
//!
//! Hosted-checkout card gateway. Implementations can be the HTTP client for
//! the real gateway or an in-memory sandbox.

use chrono::{DateTime, Utc};

use crate::domain::{BookingId, MethodType, Money, PaymentId};
pub use crate::error::GatewayError;

/// Whether the checkout charges or only places a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Charge,
    AuthorizeOnly,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub payment_id: PaymentId,
    pub booking_id: BookingId,
    /// Amount charged, in the settlement currency
    pub amount: Money,
    pub method_type: MethodType,
    pub capture_mode: CaptureMode,
    pub expires_at: DateTime<Utc>,
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
    pub transaction_id: Option<String>,
}

/// Outcome of a status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutStatus {
    Pending,
    Completed {
        transaction_id: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Failed {
        occurred_at: DateTime<Utc>,
    },
}

/// Port trait for the external card gateway.
///
/// No method retries on its own; callers decide.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout and returns the payer's redirect URL.
    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayError>;

    /// Polls the state of a checkout session.
    async fn checkout_status(&self, session_id: &str) -> Result<CheckoutStatus, GatewayError>;

    /// Charges part or all of an authorized hold.
    async fn capture_hold(&self, session_id: &str, amount: Money) -> Result<(), GatewayError>;

    /// Releases an authorized hold.
    async fn release_hold(&self, session_id: &str) -> Result<(), GatewayError>;
}
