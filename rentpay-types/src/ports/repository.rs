//! Repository port trait.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory) implement this trait.

use chrono::{DateTime, Utc};

use crate::domain::{
    ApiKey, ApiKeyId, ApplyOutcome, AuthorizationId, Booking, BookingId, DepositStatus,
    GatewayEvent, LinkStatus, MethodType, Payment, PaymentId, PaymentMethod,
    SecurityDepositAuthorization, WebhookEvent, WebhookEventId, WebhookStatus,
};
use crate::error::RepoError;
use rentpay_rates::{ConversionRate, CurrencyCode};

/// The main repository port for the payment core.
///
/// Every status write is a compare-and-set against the status the caller
/// last read. Reconciliation and settlement write the payment, the booking
/// and the hold in one transaction.
#[async_trait::async_trait]
pub trait PaymentRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Payment Method Registry
    // ─────────────────────────────────────────────────────────────────────────────

    async fn list_methods(&self) -> Result<Vec<PaymentMethod>, RepoError>;

    async fn get_method(&self, method_type: MethodType)
    -> Result<Option<PaymentMethod>, RepoError>;

    /// Persists fee and enabled flag. Existing payments are untouched.
    async fn save_method(&self, method: &PaymentMethod) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Conversion Rates
    // ─────────────────────────────────────────────────────────────────────────────

    async fn insert_rate(&self, rate: &ConversionRate) -> Result<(), RepoError>;

    /// Rate with the latest `effective_date` not after `at`.
    async fn latest_rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
        at: DateTime<Utc>,
    ) -> Result<Option<ConversionRate>, RepoError>;

    /// Rates, newest effective date first, optionally filtered by pair.
    async fn list_rates(
        &self,
        from: Option<CurrencyCode>,
        to: Option<CurrencyCode>,
    ) -> Result<Vec<ConversionRate>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Bookings
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts or refreshes the mirrored booking fields. `amount_paid` and
    /// the deposit link fields of an existing row are kept.
    async fn upsert_booking(&self, booking: &Booking) -> Result<Booking, RepoError>;

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────────

    async fn insert_payment(&self, payment: &Payment) -> Result<(), RepoError>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError>;

    /// Looks a payment up by gateway session id or transaction id.
    async fn find_payment_by_gateway_ref(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, RepoError>;

    async fn list_payments_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, RepoError>;

    /// Writes `payment` if its persisted status is still `expected`.
    /// Returns `false` when another writer got there first.
    async fn update_payment(
        &self,
        payment: &Payment,
        expected: LinkStatus,
    ) -> Result<bool, RepoError>;

    /// Admin settlement of a bank-transfer or manual payment (atomic).
    async fn settle_payment(
        &self,
        id: PaymentId,
        paid_at: DateTime<Utc>,
    ) -> Result<ApplyOutcome, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Security Deposit Authorizations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts a hold and the payment carrying it (atomic).
    async fn insert_authorization(
        &self,
        authorization: &SecurityDepositAuthorization,
        payment: &Payment,
    ) -> Result<(), RepoError>;

    async fn get_authorization(
        &self,
        id: AuthorizationId,
    ) -> Result<Option<SecurityDepositAuthorization>, RepoError>;

    async fn list_authorizations_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<SecurityDepositAuthorization>, RepoError>;

    /// Writes `authorization` if its persisted status is still `expected`.
    async fn update_authorization(
        &self,
        authorization: &SecurityDepositAuthorization,
        expected: DepositStatus,
    ) -> Result<bool, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Reconciliation (MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Applies a gateway outcome to the payment it references, its booking
    /// and its hold. Fails with `UnknownTransaction` if no payment matches.
    async fn apply_gateway_event(&self, event: &GatewayEvent) -> Result<ApplyOutcome, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Gateway Event Journal
    // ─────────────────────────────────────────────────────────────────────────────

    async fn record_webhook(&self, event: &WebhookEvent) -> Result<(), RepoError>;

    async fn update_webhook_status(
        &self,
        id: WebhookEventId,
        status: WebhookStatus,
        payment_id: Option<PaymentId>,
        last_error: Option<String>,
    ) -> Result<(), RepoError>;

    async fn list_webhooks(
        &self,
        status: Option<WebhookStatus>,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // API Keys
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finds an active key by hash and stamps `last_used_at`.
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError>;

    /// Creates a key and returns it with the raw secret (shown once).
    async fn create_api_key(&self, name: &str) -> Result<(ApiKey, String), RepoError>;

    async fn count_api_keys(&self) -> Result<i64, RepoError>;

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError>;

    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError>;
}
