//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    BookingId, Calculation, LinkStatus, MethodType, Payment, PaymentIntent,
    SecurityDepositAuthorization, WebhookEventId, WebhookStatus,
};
use rentpay_rates::CurrencyCode;

// ─────────────────────────────────────────────────────────────────────────────
// Booking DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Booking fields mirrored from the booking subsystem.
///
/// `amount_paid` is never accepted here; only reconciliation moves it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpsertBookingRequest {
    /// Total rental price in minor units
    #[schema(example = 100000)]
    pub amount_total: i64,
    pub currency: CurrencyCode,
    /// Security deposit hold in minor units
    #[serde(default)]
    #[schema(example = 150000)]
    pub security_deposit_amount: i64,
    /// Share of the total due as the initial client payment
    #[serde(default = "default_payment_percent")]
    #[schema(value_type = String, example = "30")]
    pub payment_amount_percent: Decimal,
}

fn default_payment_percent() -> Decimal {
    Decimal::ONE_HUNDRED
}

// ─────────────────────────────────────────────────────────────────────────────
// Quote / Payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request for an amount preview.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub payment_intent: PaymentIntent,
    pub method_type: MethodType,
    /// Replaces the amount derived from the booking, in minor units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_override: Option<i64>,
}

/// Result of the fee and conversion calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    pub booking_id: BookingId,
    pub payment_intent: PaymentIntent,
    pub method_type: MethodType,
    /// Base amount in minor units of `currency`
    #[schema(example = 100000)]
    pub base_amount: i64,
    pub currency: CurrencyCode,
    #[schema(value_type = String, example = "3")]
    pub fee_percentage: Decimal,
    #[schema(example = 3000)]
    pub fee_amount: i64,
    #[schema(example = 103000)]
    pub total_amount: i64,
    #[schema(example = 106090)]
    pub converted_amount: Option<i64>,
    pub final_currency: CurrencyCode,
    #[schema(value_type = Option<String>, example = "1.03")]
    pub conversion_rate: Option<Decimal>,
}

impl QuoteResponse {
    pub fn from_calculation(booking_id: BookingId, calc: &Calculation) -> Self {
        Self {
            booking_id,
            payment_intent: calc.payment_intent,
            method_type: calc.method_type,
            base_amount: calc.base.amount(),
            currency: calc.base.currency(),
            fee_percentage: calc.fee_percentage,
            fee_amount: calc.fee.amount(),
            total_amount: calc.total.amount(),
            converted_amount: calc.converted.map(|m| m.amount()),
            final_currency: calc.final_currency,
            conversion_rate: calc.rate,
        }
    }
}

/// Request to create a payment link (or manual instructions).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub payment_intent: PaymentIntent,
    pub method_type: MethodType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_override: Option<i64>,
    /// Link lifetime; defaults to the configured TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 48)]
    pub expires_in_hours: Option<i64>,
}

/// Bank-transfer proof upload (the document itself lives in document storage).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachProofRequest {
    #[schema(example = "https://files.example.com/proofs/123.pdf")]
    pub proof_url: String,
}

/// Admin confirmation that funds arrived outside the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MarkPaidRequest {
    /// When the funds were received; defaults to now
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

/// What a sync call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncResult {
    /// The gateway reported success and it was applied
    Settled,
    /// The gateway reported failure and it was applied
    Failed,
    /// An elapsed link or hold was persisted as expired
    Expired,
    /// Nothing to do
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentSyncResponse {
    pub result: SyncResult,
    pub payment: Payment,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion rate DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRateRequest {
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    #[schema(value_type = String, example = "1.03")]
    pub rate: Decimal,
    /// Defaults to now
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "manual")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RateQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<CurrencyCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<CurrencyCode>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Security deposit DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeDepositRequest {
    /// Hold amount in minor units; defaults to the booking's deposit amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// Card method carrying the hold
    #[serde(default = "default_deposit_method")]
    pub method_type: MethodType,
    #[schema(example = 8760)]
    pub expires_in_hours: i64,
}

fn default_deposit_method() -> MethodType {
    MethodType::VisaMastercard
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CaptureDepositRequest {
    #[schema(example = 50000)]
    pub amount: i64,
    #[schema(example = "Damage to rear bumper")]
    pub reason: String,
}

/// A hold together with the card-authorization payment carrying it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositAuthorizationResponse {
    pub authorization: SecurityDepositAuthorization,
    pub payment: Payment,
}

/// The booking's current hold and every attempt behind it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SecurityDepositOverview {
    pub current: Option<SecurityDepositAuthorization>,
    /// Link status of the payment carrying `current`. A declined hold shows
    /// `failed` here while the hold itself stays `pending`.
    pub current_payment_status: Option<LinkStatus>,
    pub authorizations: Vec<SecurityDepositAuthorization>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositSyncResponse {
    pub result: SyncResult,
    pub authorization: Option<SecurityDepositAuthorization>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway webhook DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Acknowledgement returned to the gateway once an event is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: WebhookEventId,
    pub status: WebhookStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WebhookEventQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WebhookStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}
