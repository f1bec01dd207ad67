//! Database row types and column decoding for SQLite and PostgreSQL.
//!
//! Both backends share column names; SQLite rows carry TEXT ids, decimals
//! and timestamps, PostgreSQL rows carry native UUID, NUMERIC and
//! TIMESTAMPTZ values.

use std::str::FromStr;

use rentpay_types::RepoError;

pub const METHOD_COLUMNS: &str = "method_type, display_name, fee_percentage, settlement_currency, \
     requires_conversion, is_enabled, admin_only, sort_order, updated_at";

pub const RATE_COLUMNS: &str = "from_currency, to_currency, rate, effective_date, source";

pub const BOOKING_COLUMNS: &str = "id, amount_total, amount_paid, currency, \
     security_deposit_amount, payment_amount_percent, security_deposit_authorization_id, \
     security_deposit_authorized_at, updated_at";

pub const PAYMENT_COLUMNS: &str = "id, booking_id, amount, currency, payment_intent, \
     payment_method_type, fee_amount, total_amount, converted_amount, final_currency, \
     conversion_rate, payment_link_url, payment_link_status, payment_link_expires_at, \
     gateway_session_id, gateway_transaction_id, proof_url, instructions, paid_at, created_at, \
     updated_at";

pub const AUTHORIZATION_COLUMNS: &str = "id, booking_id, payment_id, amount, currency, status, \
     expires_in_hours, authorized_at, expires_at, released_at, captured_at, captured_amount, \
     capture_reason, created_at, updated_at";

pub const WEBHOOK_COLUMNS: &str =
    "id, reference, payload, status, payment_id, received_at, processed_at, last_error";

pub const API_KEY_COLUMNS: &str = "id, name, key_hash, is_active, created_at, last_used_at";

/// Parses a stored enum or code column.
pub fn parse_column<T>(value: &str, column: &str) -> Result<T, RepoError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| RepoError::Database(format!("Invalid {} '{}': {}", column, value, e)))
}

#[cfg(feature = "sqlite")]
pub mod lite {
    //! SQLite rows. Everything non-integer is TEXT.

    use chrono::{DateTime, SecondsFormat, Utc};
    use rust_decimal::Decimal;
    use sqlx::FromRow;
    use uuid::Uuid;

    use rentpay_rates::ConversionRate;
    use rentpay_types::{
        ApiKey, ApiKeyId, AuthorizationId, Booking, BookingId, Payment, PaymentId, PaymentMethod,
        RepoError, SecurityDepositAuthorization, WebhookEvent, WebhookEventId,
    };

    use super::parse_column;

    /// Fixed-width RFC 3339 so that string order is time order.
    pub fn fmt_ts(ts: DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn fmt_opt_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
        ts.map(fmt_ts)
    }

    pub fn parse_ts(value: &str) -> Result<DateTime<Utc>, RepoError> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepoError::Database(format!("Invalid timestamp '{}': {}", value, e)))
    }

    fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>, RepoError> {
        value.as_deref().map(parse_ts).transpose()
    }

    fn parse_uuid(value: &str) -> Result<Uuid, RepoError> {
        parse_column(value, "id")
    }

    fn parse_decimal(value: &str) -> Result<Decimal, RepoError> {
        parse_column(value, "decimal")
    }

    #[derive(FromRow)]
    pub struct MethodRow {
        pub method_type: String,
        pub display_name: String,
        pub fee_percentage: String,
        pub settlement_currency: String,
        pub requires_conversion: bool,
        pub is_enabled: bool,
        pub admin_only: bool,
        pub sort_order: i32,
        pub updated_at: String,
    }

    impl MethodRow {
        pub fn into_domain(self) -> Result<PaymentMethod, RepoError> {
            Ok(PaymentMethod {
                method_type: parse_column(&self.method_type, "method_type")?,
                display_name: self.display_name,
                fee_percentage: parse_decimal(&self.fee_percentage)?,
                settlement_currency: parse_column(&self.settlement_currency, "currency")?,
                requires_conversion: self.requires_conversion,
                is_enabled: self.is_enabled,
                admin_only: self.admin_only,
                sort_order: self.sort_order,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct RateRow {
        pub from_currency: String,
        pub to_currency: String,
        pub rate: String,
        pub effective_date: String,
        pub source: String,
    }

    impl RateRow {
        pub fn into_domain(self) -> Result<ConversionRate, RepoError> {
            Ok(ConversionRate {
                from_currency: parse_column(&self.from_currency, "currency")?,
                to_currency: parse_column(&self.to_currency, "currency")?,
                rate: parse_decimal(&self.rate)?,
                effective_date: parse_ts(&self.effective_date)?,
                source: self.source,
            })
        }
    }

    #[derive(FromRow)]
    pub struct BookingRow {
        pub id: String,
        pub amount_total: i64,
        pub amount_paid: i64,
        pub currency: String,
        pub security_deposit_amount: i64,
        pub payment_amount_percent: String,
        pub security_deposit_authorization_id: Option<String>,
        pub security_deposit_authorized_at: Option<String>,
        pub updated_at: String,
    }

    impl BookingRow {
        pub fn into_domain(self) -> Result<Booking, RepoError> {
            Ok(Booking {
                id: BookingId::from_uuid(parse_uuid(&self.id)?),
                amount_total: self.amount_total,
                amount_paid: self.amount_paid,
                currency: parse_column(&self.currency, "currency")?,
                security_deposit_amount: self.security_deposit_amount,
                payment_amount_percent: parse_decimal(&self.payment_amount_percent)?,
                security_deposit_authorization_id: self
                    .security_deposit_authorization_id
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?
                    .map(AuthorizationId::from_uuid),
                security_deposit_authorized_at: parse_opt_ts(self.security_deposit_authorized_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct PaymentRow {
        pub id: String,
        pub booking_id: String,
        pub amount: i64,
        pub currency: String,
        pub payment_intent: String,
        pub payment_method_type: String,
        pub fee_amount: i64,
        pub total_amount: i64,
        pub converted_amount: Option<i64>,
        pub final_currency: String,
        pub conversion_rate: Option<String>,
        pub payment_link_url: Option<String>,
        pub payment_link_status: String,
        pub payment_link_expires_at: Option<String>,
        pub gateway_session_id: Option<String>,
        pub gateway_transaction_id: Option<String>,
        pub proof_url: Option<String>,
        pub instructions: Option<String>,
        pub paid_at: Option<String>,
        pub created_at: String,
        pub updated_at: String,
    }

    impl PaymentRow {
        pub fn into_domain(self) -> Result<Payment, RepoError> {
            Ok(Payment {
                id: PaymentId::from_uuid(parse_uuid(&self.id)?),
                booking_id: BookingId::from_uuid(parse_uuid(&self.booking_id)?),
                amount: self.amount,
                currency: parse_column(&self.currency, "currency")?,
                payment_intent: parse_column(&self.payment_intent, "payment_intent")?,
                payment_method_type: parse_column(
                    &self.payment_method_type,
                    "payment_method_type",
                )?,
                fee_amount: self.fee_amount,
                total_amount: self.total_amount,
                converted_amount: self.converted_amount,
                final_currency: parse_column(&self.final_currency, "currency")?,
                conversion_rate: self
                    .conversion_rate
                    .as_deref()
                    .map(parse_decimal)
                    .transpose()?,
                payment_link_url: self.payment_link_url,
                payment_link_status: parse_column(
                    &self.payment_link_status,
                    "payment_link_status",
                )?,
                payment_link_expires_at: parse_opt_ts(self.payment_link_expires_at)?,
                gateway_session_id: self.gateway_session_id,
                gateway_transaction_id: self.gateway_transaction_id,
                proof_url: self.proof_url,
                instructions: self.instructions,
                paid_at: parse_opt_ts(self.paid_at)?,
                created_at: parse_ts(&self.created_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct AuthorizationRow {
        pub id: String,
        pub booking_id: String,
        pub payment_id: Option<String>,
        pub amount: i64,
        pub currency: String,
        pub status: String,
        pub expires_in_hours: i64,
        pub authorized_at: Option<String>,
        pub expires_at: String,
        pub released_at: Option<String>,
        pub captured_at: Option<String>,
        pub captured_amount: Option<i64>,
        pub capture_reason: Option<String>,
        pub created_at: String,
        pub updated_at: String,
    }

    impl AuthorizationRow {
        pub fn into_domain(self) -> Result<SecurityDepositAuthorization, RepoError> {
            Ok(SecurityDepositAuthorization {
                id: AuthorizationId::from_uuid(parse_uuid(&self.id)?),
                booking_id: BookingId::from_uuid(parse_uuid(&self.booking_id)?),
                payment_id: self
                    .payment_id
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?
                    .map(PaymentId::from_uuid),
                amount: self.amount,
                currency: parse_column(&self.currency, "currency")?,
                status: parse_column(&self.status, "status")?,
                expires_in_hours: self.expires_in_hours,
                authorized_at: parse_opt_ts(self.authorized_at)?,
                expires_at: parse_ts(&self.expires_at)?,
                released_at: parse_opt_ts(self.released_at)?,
                captured_at: parse_opt_ts(self.captured_at)?,
                captured_amount: self.captured_amount,
                capture_reason: self.capture_reason,
                created_at: parse_ts(&self.created_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct WebhookRow {
        pub id: String,
        pub reference: Option<String>,
        pub payload: String,
        pub status: String,
        pub payment_id: Option<String>,
        pub received_at: String,
        pub processed_at: Option<String>,
        pub last_error: Option<String>,
    }

    impl WebhookRow {
        pub fn into_domain(self) -> Result<WebhookEvent, RepoError> {
            Ok(WebhookEvent {
                id: WebhookEventId::from_uuid(parse_uuid(&self.id)?),
                reference: self.reference,
                payload: serde_json::from_str(&self.payload)
                    .map_err(|e| RepoError::Database(format!("Invalid payload: {}", e)))?,
                status: parse_column(&self.status, "status")?,
                payment_id: self
                    .payment_id
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?
                    .map(PaymentId::from_uuid),
                received_at: parse_ts(&self.received_at)?,
                processed_at: parse_opt_ts(self.processed_at)?,
                last_error: self.last_error,
            })
        }
    }

    #[derive(FromRow)]
    pub struct ApiKeyRow {
        pub id: String,
        pub name: String,
        pub key_hash: String,
        pub is_active: bool,
        pub created_at: String,
        pub last_used_at: Option<String>,
    }

    impl ApiKeyRow {
        pub fn into_domain(self) -> Result<ApiKey, RepoError> {
            Ok(ApiKey {
                id: ApiKeyId::from_uuid(parse_uuid(&self.id)?),
                name: self.name,
                key_hash: self.key_hash,
                is_active: self.is_active,
                created_at: parse_ts(&self.created_at)?,
                last_used_at: parse_opt_ts(self.last_used_at)?,
            })
        }
    }
}

#[cfg(feature = "postgres")]
pub mod pg {
    //! PostgreSQL rows with native column types.

    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::FromRow;
    use uuid::Uuid;

    use rentpay_rates::ConversionRate;
    use rentpay_types::{
        ApiKey, ApiKeyId, AuthorizationId, Booking, BookingId, Payment, PaymentId, PaymentMethod,
        RepoError, SecurityDepositAuthorization, WebhookEvent, WebhookEventId,
    };

    use super::parse_column;

    #[derive(FromRow)]
    pub struct MethodRow {
        pub method_type: String,
        pub display_name: String,
        pub fee_percentage: Decimal,
        pub settlement_currency: String,
        pub requires_conversion: bool,
        pub is_enabled: bool,
        pub admin_only: bool,
        pub sort_order: i32,
        pub updated_at: DateTime<Utc>,
    }

    impl MethodRow {
        pub fn into_domain(self) -> Result<PaymentMethod, RepoError> {
            Ok(PaymentMethod {
                method_type: parse_column(&self.method_type, "method_type")?,
                display_name: self.display_name,
                fee_percentage: self.fee_percentage.normalize(),
                settlement_currency: parse_column(&self.settlement_currency, "currency")?,
                requires_conversion: self.requires_conversion,
                is_enabled: self.is_enabled,
                admin_only: self.admin_only,
                sort_order: self.sort_order,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct RateRow {
        pub from_currency: String,
        pub to_currency: String,
        pub rate: Decimal,
        pub effective_date: DateTime<Utc>,
        pub source: String,
    }

    impl RateRow {
        pub fn into_domain(self) -> Result<ConversionRate, RepoError> {
            Ok(ConversionRate {
                from_currency: parse_column(&self.from_currency, "currency")?,
                to_currency: parse_column(&self.to_currency, "currency")?,
                rate: self.rate.normalize(),
                effective_date: self.effective_date,
                source: self.source,
            })
        }
    }

    #[derive(FromRow)]
    pub struct BookingRow {
        pub id: Uuid,
        pub amount_total: i64,
        pub amount_paid: i64,
        pub currency: String,
        pub security_deposit_amount: i64,
        pub payment_amount_percent: Decimal,
        pub security_deposit_authorization_id: Option<Uuid>,
        pub security_deposit_authorized_at: Option<DateTime<Utc>>,
        pub updated_at: DateTime<Utc>,
    }

    impl BookingRow {
        pub fn into_domain(self) -> Result<Booking, RepoError> {
            Ok(Booking {
                id: BookingId::from_uuid(self.id),
                amount_total: self.amount_total,
                amount_paid: self.amount_paid,
                currency: parse_column(&self.currency, "currency")?,
                security_deposit_amount: self.security_deposit_amount,
                payment_amount_percent: self.payment_amount_percent.normalize(),
                security_deposit_authorization_id: self
                    .security_deposit_authorization_id
                    .map(AuthorizationId::from_uuid),
                security_deposit_authorized_at: self.security_deposit_authorized_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct PaymentRow {
        pub id: Uuid,
        pub booking_id: Uuid,
        pub amount: i64,
        pub currency: String,
        pub payment_intent: String,
        pub payment_method_type: String,
        pub fee_amount: i64,
        pub total_amount: i64,
        pub converted_amount: Option<i64>,
        pub final_currency: String,
        pub conversion_rate: Option<Decimal>,
        pub payment_link_url: Option<String>,
        pub payment_link_status: String,
        pub payment_link_expires_at: Option<DateTime<Utc>>,
        pub gateway_session_id: Option<String>,
        pub gateway_transaction_id: Option<String>,
        pub proof_url: Option<String>,
        pub instructions: Option<String>,
        pub paid_at: Option<DateTime<Utc>>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl PaymentRow {
        pub fn into_domain(self) -> Result<Payment, RepoError> {
            Ok(Payment {
                id: PaymentId::from_uuid(self.id),
                booking_id: BookingId::from_uuid(self.booking_id),
                amount: self.amount,
                currency: parse_column(&self.currency, "currency")?,
                payment_intent: parse_column(&self.payment_intent, "payment_intent")?,
                payment_method_type: parse_column(
                    &self.payment_method_type,
                    "payment_method_type",
                )?,
                fee_amount: self.fee_amount,
                total_amount: self.total_amount,
                converted_amount: self.converted_amount,
                final_currency: parse_column(&self.final_currency, "currency")?,
                conversion_rate: self.conversion_rate.map(|r| r.normalize()),
                payment_link_url: self.payment_link_url,
                payment_link_status: parse_column(
                    &self.payment_link_status,
                    "payment_link_status",
                )?,
                payment_link_expires_at: self.payment_link_expires_at,
                gateway_session_id: self.gateway_session_id,
                gateway_transaction_id: self.gateway_transaction_id,
                proof_url: self.proof_url,
                instructions: self.instructions,
                paid_at: self.paid_at,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct AuthorizationRow {
        pub id: Uuid,
        pub booking_id: Uuid,
        pub payment_id: Option<Uuid>,
        pub amount: i64,
        pub currency: String,
        pub status: String,
        pub expires_in_hours: i64,
        pub authorized_at: Option<DateTime<Utc>>,
        pub expires_at: DateTime<Utc>,
        pub released_at: Option<DateTime<Utc>>,
        pub captured_at: Option<DateTime<Utc>>,
        pub captured_amount: Option<i64>,
        pub capture_reason: Option<String>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl AuthorizationRow {
        pub fn into_domain(self) -> Result<SecurityDepositAuthorization, RepoError> {
            Ok(SecurityDepositAuthorization {
                id: AuthorizationId::from_uuid(self.id),
                booking_id: BookingId::from_uuid(self.booking_id),
                payment_id: self.payment_id.map(PaymentId::from_uuid),
                amount: self.amount,
                currency: parse_column(&self.currency, "currency")?,
                status: parse_column(&self.status, "status")?,
                expires_in_hours: self.expires_in_hours,
                authorized_at: self.authorized_at,
                expires_at: self.expires_at,
                released_at: self.released_at,
                captured_at: self.captured_at,
                captured_amount: self.captured_amount,
                capture_reason: self.capture_reason,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct WebhookRow {
        pub id: Uuid,
        pub reference: Option<String>,
        pub payload: serde_json::Value,
        pub status: String,
        pub payment_id: Option<Uuid>,
        pub received_at: DateTime<Utc>,
        pub processed_at: Option<DateTime<Utc>>,
        pub last_error: Option<String>,
    }

    impl WebhookRow {
        pub fn into_domain(self) -> Result<WebhookEvent, RepoError> {
            Ok(WebhookEvent {
                id: WebhookEventId::from_uuid(self.id),
                reference: self.reference,
                payload: self.payload,
                status: parse_column(&self.status, "status")?,
                payment_id: self.payment_id.map(PaymentId::from_uuid),
                received_at: self.received_at,
                processed_at: self.processed_at,
                last_error: self.last_error,
            })
        }
    }

    #[derive(FromRow)]
    pub struct ApiKeyRow {
        pub id: Uuid,
        pub name: String,
        pub key_hash: String,
        pub is_active: bool,
        pub created_at: DateTime<Utc>,
        pub last_used_at: Option<DateTime<Utc>>,
    }

    impl ApiKeyRow {
        pub fn into_domain(self) -> Result<ApiKey, RepoError> {
            Ok(ApiKey {
                id: ApiKeyId::from_uuid(self.id),
                name: self.name,
                key_hash: self.key_hash,
                is_active: self.is_active,
                created_at: self.created_at,
                last_used_at: self.last_used_at,
            })
        }
    }
}
