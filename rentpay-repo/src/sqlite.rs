//! SQLite repository adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use rentpay_rates::{ConversionRate, CurrencyCode};
use rentpay_types::{
    ApiKey, ApiKeyId, ApplyOutcome, AuthorizationId, Booking, BookingId, DepositStatus,
    GatewayEvent, LinkStatus, MethodType, Payment, PaymentId, PaymentIntent, PaymentMethod,
    PaymentRepository, RepoError, SecurityDepositAuthorization, WebhookEvent, WebhookEventId,
    WebhookStatus, domain::Plan,
};

use crate::reconcile::{Attempt, MAX_ATTEMPTS, Target, exhausted, missing_booking};
use crate::types::lite::{
    ApiKeyRow, AuthorizationRow, BookingRow, MethodRow, PaymentRow, RateRow, WebhookRow, fmt_opt_ts,
    fmt_ts,
};
use crate::types::{
    API_KEY_COLUMNS, AUTHORIZATION_COLUMNS, BOOKING_COLUMNS, METHOD_COLUMNS, PAYMENT_COLUMNS,
    RATE_COLUMNS, WEBHOOK_COLUMNS,
};

fn db_err(e: sqlx::Error) -> RepoError {
    RepoError::Database(e.to_string())
}

fn tx_err(e: sqlx::Error) -> RepoError {
    RepoError::Transaction(e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Ensure on-disk SQLite target directory exists.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if !in_memory {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every in-memory connection is its own database; keep exactly one alive.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema and seeds the default payment methods.
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        let ddl = include_str!("../migrations/0001_create_tables.sql");
        for statement in ddl.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(|e| {
                    RepoError::Database(format!("Migration 0001 failed: {}", e))
                })?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Row helpers usable on the pool or inside a transaction
    // ─────────────────────────────────────────────────────────────────────────

    async fn fetch_payment<'e, E>(exec: E, id: PaymentId) -> Result<Option<Payment>, RepoError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(exec)
            .await
            .map_err(db_err)?;
        row.map(PaymentRow::into_domain).transpose()
    }

    async fn fetch_payment_by_ref<'e, E>(
        exec: E,
        reference: &str,
    ) -> Result<Option<Payment>, RepoError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {} FROM payments WHERE gateway_session_id = ? OR gateway_transaction_id = ? \
             ORDER BY created_at DESC LIMIT 1",
            PAYMENT_COLUMNS
        );
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(reference)
            .bind(reference)
            .fetch_optional(exec)
            .await
            .map_err(db_err)?;
        row.map(PaymentRow::into_domain).transpose()
    }

    async fn fetch_booking<'e, E>(exec: E, id: BookingId) -> Result<Option<Booking>, RepoError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {} FROM bookings WHERE id = ?", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(exec)
            .await
            .map_err(db_err)?;
        row.map(BookingRow::into_domain).transpose()
    }

    async fn fetch_authorization_for_payment<'e, E>(
        exec: E,
        payment_id: PaymentId,
    ) -> Result<Option<SecurityDepositAuthorization>, RepoError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {} FROM security_deposit_authorizations WHERE payment_id = ?",
            AUTHORIZATION_COLUMNS
        );
        let row: Option<AuthorizationRow> = sqlx::query_as(&sql)
            .bind(payment_id.to_string())
            .fetch_optional(exec)
            .await
            .map_err(db_err)?;
        row.map(AuthorizationRow::into_domain).transpose()
    }

    async fn write_new_payment<'e, E>(exec: E, p: &Payment) -> Result<(), RepoError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"INSERT INTO payments (id, booking_id, amount, currency, payment_intent,
                   payment_method_type, fee_amount, total_amount, converted_amount,
                   final_currency, conversion_rate, payment_link_url, payment_link_status,
                   payment_link_expires_at, gateway_session_id, gateway_transaction_id,
                   proof_url, instructions, paid_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(p.id.to_string())
        .bind(p.booking_id.to_string())
        .bind(p.amount)
        .bind(p.currency.to_string())
        .bind(p.payment_intent.as_str())
        .bind(p.payment_method_type.as_str())
        .bind(p.fee_amount)
        .bind(p.total_amount)
        .bind(p.converted_amount)
        .bind(p.final_currency.to_string())
        .bind(p.conversion_rate.map(|r| r.to_string()))
        .bind(&p.payment_link_url)
        .bind(p.payment_link_status.as_str())
        .bind(fmt_opt_ts(p.payment_link_expires_at))
        .bind(&p.gateway_session_id)
        .bind(&p.gateway_transaction_id)
        .bind(&p.proof_url)
        .bind(&p.instructions)
        .bind(fmt_opt_ts(p.paid_at))
        .bind(fmt_ts(p.created_at))
        .bind(fmt_ts(p.updated_at))
        .execute(exec)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn cas_payment<'e, E>(
        exec: E,
        p: &Payment,
        expected: LinkStatus,
    ) -> Result<bool, RepoError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE payments
               SET payment_link_url = ?, payment_link_status = ?, payment_link_expires_at = ?,
                   gateway_session_id = ?, gateway_transaction_id = ?, proof_url = ?,
                   instructions = ?, paid_at = ?, updated_at = ?
               WHERE id = ? AND payment_link_status = ?"#,
        )
        .bind(&p.payment_link_url)
        .bind(p.payment_link_status.as_str())
        .bind(fmt_opt_ts(p.payment_link_expires_at))
        .bind(&p.gateway_session_id)
        .bind(&p.gateway_transaction_id)
        .bind(&p.proof_url)
        .bind(&p.instructions)
        .bind(fmt_opt_ts(p.paid_at))
        .bind(fmt_ts(p.updated_at))
        .bind(p.id.to_string())
        .bind(expected.as_str())
        .execute(exec)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn cas_authorization<'e, E>(
        exec: E,
        a: &SecurityDepositAuthorization,
        expected: DepositStatus,
    ) -> Result<bool, RepoError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE security_deposit_authorizations
               SET status = ?, authorized_at = ?, expires_at = ?, released_at = ?, captured_at = ?,
                   captured_amount = ?, capture_reason = ?, updated_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(a.status.as_str())
        .bind(fmt_opt_ts(a.authorized_at))
        .bind(fmt_ts(a.expires_at))
        .bind(fmt_opt_ts(a.released_at))
        .bind(fmt_opt_ts(a.captured_at))
        .bind(a.captured_amount)
        .bind(&a.capture_reason)
        .bind(fmt_ts(a.updated_at))
        .bind(a.id.to_string())
        .bind(expected.as_str())
        .execute(exec)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    async fn reconcile(&self, target: Target<'_>) -> Result<ApplyOutcome, RepoError> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_reconcile(&target).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Lost => {
                    tracing::warn!(attempt, "Reconciliation lost a compare-and-set, replanning");
                }
            }
        }
        Err(exhausted())
    }

    async fn try_reconcile(&self, target: &Target<'_>) -> Result<Attempt, RepoError> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        let payment = match target {
            Target::Event(event) => Self::fetch_payment_by_ref(&mut *tx, &event.reference).await?,
            Target::Settlement { id, .. } => Self::fetch_payment(&mut *tx, *id).await?,
        }
        .ok_or_else(|| target.missing())?;

        let booking = Self::fetch_booking(&mut *tx, payment.booking_id)
            .await?
            .ok_or_else(|| missing_booking(&payment))?;

        let authorization = if payment.payment_intent == PaymentIntent::SecurityDeposit {
            Self::fetch_authorization_for_payment(&mut *tx, payment.id).await?
        } else {
            None
        };

        let plan = target.plan(&payment, &booking, authorization.as_ref(), Utc::now())?;

        let outcome = match plan {
            Plan::Ignore { reason } => ApplyOutcome::Ignored { payment, reason },
            Plan::Fail { payment: failed } => {
                if !Self::cas_payment(&mut *tx, &failed, payment.payment_link_status).await? {
                    return Ok(Attempt::Lost);
                }
                ApplyOutcome::Failed { payment: failed }
            }
            Plan::Settle {
                payment: paid,
                booking: credited_booking,
                credited,
                authorization: confirmed,
            } => {
                if !Self::cas_payment(&mut *tx, &paid, payment.payment_link_status).await? {
                    return Ok(Attempt::Lost);
                }

                let result = sqlx::query(
                    r#"UPDATE bookings
                       SET amount_paid = amount_paid + ?, security_deposit_authorization_id = ?,
                           security_deposit_authorized_at = ?, updated_at = ?
                       WHERE id = ?"#,
                )
                .bind(credited.amount())
                .bind(
                    credited_booking
                        .security_deposit_authorization_id
                        .map(|id| id.to_string()),
                )
                .bind(fmt_opt_ts(credited_booking.security_deposit_authorized_at))
                .bind(fmt_ts(credited_booking.updated_at))
                .bind(credited_booking.id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                if result.rows_affected() != 1 {
                    return Err(missing_booking(&paid));
                }

                if let (Some(next), Some(current)) = (&confirmed, &authorization) {
                    if !Self::cas_authorization(&mut *tx, next, current.status).await? {
                        return Ok(Attempt::Lost);
                    }
                }

                ApplyOutcome::Settled {
                    payment: paid,
                    credited,
                    authorization: confirmed,
                }
            }
        };

        tx.commit().await.map_err(tx_err)?;
        Ok(Attempt::Done(outcome))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentRepository for SqliteRepo {
    async fn list_methods(&self) -> Result<Vec<PaymentMethod>, RepoError> {
        let sql = format!(
            "SELECT {} FROM payment_methods ORDER BY sort_order ASC",
            METHOD_COLUMNS
        );
        let rows: Vec<MethodRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(MethodRow::into_domain).collect()
    }

    async fn get_method(
        &self,
        method_type: MethodType,
    ) -> Result<Option<PaymentMethod>, RepoError> {
        let sql = format!(
            "SELECT {} FROM payment_methods WHERE method_type = ?",
            METHOD_COLUMNS
        );
        let row: Option<MethodRow> = sqlx::query_as(&sql)
            .bind(method_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(MethodRow::into_domain).transpose()
    }

    async fn save_method(&self, method: &PaymentMethod) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE payment_methods SET fee_percentage = ?, is_enabled = ?, updated_at = ?
               WHERE method_type = ?"#,
        )
        .bind(method.fee_percentage.to_string())
        .bind(method.is_enabled)
        .bind(fmt_ts(method.updated_at))
        .bind(method.method_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn insert_rate(&self, rate: &ConversionRate) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO currency_conversion_rates
                   (id, from_currency, to_currency, rate, effective_date, source, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(rate.from_currency.to_string())
        .bind(rate.to_currency.to_string())
        .bind(rate.rate.to_string())
        .bind(fmt_ts(rate.effective_date))
        .bind(&rate.source)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn latest_rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
        at: DateTime<Utc>,
    ) -> Result<Option<ConversionRate>, RepoError> {
        let sql = format!(
            "SELECT {} FROM currency_conversion_rates \
             WHERE from_currency = ? AND to_currency = ? AND effective_date <= ? \
             ORDER BY effective_date DESC, recorded_at DESC, rowid DESC LIMIT 1",
            RATE_COLUMNS
        );
        let row: Option<RateRow> = sqlx::query_as(&sql)
            .bind(from.to_string())
            .bind(to.to_string())
            .bind(fmt_ts(at))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(RateRow::into_domain).transpose()
    }

    async fn list_rates(
        &self,
        from: Option<CurrencyCode>,
        to: Option<CurrencyCode>,
    ) -> Result<Vec<ConversionRate>, RepoError> {
        let sql = format!(
            "SELECT {} FROM currency_conversion_rates \
             WHERE (? IS NULL OR from_currency = ?) AND (? IS NULL OR to_currency = ?) \
             ORDER BY effective_date DESC, recorded_at DESC, rowid DESC",
            RATE_COLUMNS
        );
        let from = from.map(|c| c.to_string());
        let to = to.map(|c| c.to_string());
        let rows: Vec<RateRow> = sqlx::query_as(&sql)
            .bind(&from)
            .bind(&from)
            .bind(&to)
            .bind(&to)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(RateRow::into_domain).collect()
    }

    async fn upsert_booking(&self, booking: &Booking) -> Result<Booking, RepoError> {
        sqlx::query(
            r#"INSERT INTO bookings (id, amount_total, amount_paid, currency,
                   security_deposit_amount, payment_amount_percent, updated_at)
               VALUES (?, ?, 0, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   amount_total = excluded.amount_total,
                   currency = excluded.currency,
                   security_deposit_amount = excluded.security_deposit_amount,
                   payment_amount_percent = excluded.payment_amount_percent,
                   updated_at = excluded.updated_at"#,
        )
        .bind(booking.id.to_string())
        .bind(booking.amount_total)
        .bind(booking.currency.to_string())
        .bind(booking.security_deposit_amount)
        .bind(booking.payment_amount_percent.to_string())
        .bind(fmt_ts(booking.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Self::fetch_booking(&self.pool, booking.id)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError> {
        Self::fetch_booking(&self.pool, id).await
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), RepoError> {
        Self::write_new_payment(&self.pool, payment).await
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        Self::fetch_payment(&self.pool, id).await
    }

    async fn find_payment_by_gateway_ref(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, RepoError> {
        Self::fetch_payment_by_ref(&self.pool, reference).await
    }

    async fn list_payments_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, RepoError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE booking_id = ? ORDER BY created_at ASC",
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(booking_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(PaymentRow::into_domain).collect()
    }

    async fn update_payment(
        &self,
        payment: &Payment,
        expected: LinkStatus,
    ) -> Result<bool, RepoError> {
        Self::cas_payment(&self.pool, payment, expected).await
    }

    async fn settle_payment(
        &self,
        id: PaymentId,
        paid_at: DateTime<Utc>,
    ) -> Result<ApplyOutcome, RepoError> {
        self.reconcile(Target::Settlement { id, paid_at }).await
    }

    async fn insert_authorization(
        &self,
        authorization: &SecurityDepositAuthorization,
        payment: &Payment,
    ) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        Self::write_new_payment(&mut *tx, payment).await?;

        let a = authorization;
        sqlx::query(
            r#"INSERT INTO security_deposit_authorizations (id, booking_id, payment_id, amount,
                   currency, status, expires_in_hours, authorized_at, expires_at, released_at,
                   captured_at, captured_amount, capture_reason, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(a.id.to_string())
        .bind(a.booking_id.to_string())
        .bind(a.payment_id.map(|id| id.to_string()))
        .bind(a.amount)
        .bind(a.currency.to_string())
        .bind(a.status.as_str())
        .bind(a.expires_in_hours)
        .bind(fmt_opt_ts(a.authorized_at))
        .bind(fmt_ts(a.expires_at))
        .bind(fmt_opt_ts(a.released_at))
        .bind(fmt_opt_ts(a.captured_at))
        .bind(a.captured_amount)
        .bind(&a.capture_reason)
        .bind(fmt_ts(a.created_at))
        .bind(fmt_ts(a.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(tx_err)?;
        Ok(())
    }

    async fn get_authorization(
        &self,
        id: AuthorizationId,
    ) -> Result<Option<SecurityDepositAuthorization>, RepoError> {
        let sql = format!(
            "SELECT {} FROM security_deposit_authorizations WHERE id = ?",
            AUTHORIZATION_COLUMNS
        );
        let row: Option<AuthorizationRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(AuthorizationRow::into_domain).transpose()
    }

    async fn list_authorizations_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<SecurityDepositAuthorization>, RepoError> {
        let sql = format!(
            "SELECT {} FROM security_deposit_authorizations WHERE booking_id = ? \
             ORDER BY created_at DESC",
            AUTHORIZATION_COLUMNS
        );
        let rows: Vec<AuthorizationRow> = sqlx::query_as(&sql)
            .bind(booking_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(AuthorizationRow::into_domain).collect()
    }

    async fn update_authorization(
        &self,
        authorization: &SecurityDepositAuthorization,
        expected: DepositStatus,
    ) -> Result<bool, RepoError> {
        Self::cas_authorization(&self.pool, authorization, expected).await
    }

    async fn apply_gateway_event(&self, event: &GatewayEvent) -> Result<ApplyOutcome, RepoError> {
        self.reconcile(Target::Event(event)).await
    }

    async fn record_webhook(&self, event: &WebhookEvent) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO gateway_events (id, reference, payload, status, payment_id, received_at,
                   processed_at, last_error)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(&event.reference)
        .bind(event.payload.to_string())
        .bind(event.status.to_string())
        .bind(event.payment_id.map(|id| id.to_string()))
        .bind(fmt_ts(event.received_at))
        .bind(fmt_opt_ts(event.processed_at))
        .bind(&event.last_error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_webhook_status(
        &self,
        id: WebhookEventId,
        status: WebhookStatus,
        payment_id: Option<PaymentId>,
        last_error: Option<String>,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"UPDATE gateway_events
               SET status = ?, payment_id = COALESCE(?, payment_id), processed_at = ?,
                   last_error = ?
               WHERE id = ?"#,
        )
        .bind(status.to_string())
        .bind(payment_id.map(|id| id.to_string()))
        .bind(fmt_ts(Utc::now()))
        .bind(last_error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_webhooks(
        &self,
        status: Option<WebhookStatus>,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, RepoError> {
        let sql = format!(
            "SELECT {} FROM gateway_events WHERE (? IS NULL OR status = ?) \
             ORDER BY received_at DESC LIMIT ?",
            WEBHOOK_COLUMNS
        );
        let status = status.map(|s| s.to_string());
        let rows: Vec<WebhookRow> = sqlx::query_as(&sql)
            .bind(&status)
            .bind(&status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(WebhookRow::into_domain).collect()
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE key_hash = ? AND is_active = 1",
            API_KEY_COLUMNS
        );
        let row: Option<ApiKeyRow> = sqlx::query_as(&sql)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut key = row.into_domain()?;
        let now = Utc::now();
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(fmt_ts(now))
            .bind(key.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        key.last_used_at = Some(now);
        Ok(Some(key))
    }

    async fn create_api_key(&self, name: &str) -> Result<(ApiKey, String), RepoError> {
        let (raw_key, key_hash) = crate::security::generate_api_key();
        let api_key = ApiKey::new(name.to_string(), key_hash);

        sqlx::query(
            r#"INSERT INTO api_keys (id, name, key_hash, is_active, created_at)
               VALUES (?, ?, ?, 1, ?)"#,
        )
        .bind(api_key.id.to_string())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(fmt_ts(api_key.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.0)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE is_active = 1 ORDER BY created_at DESC",
            API_KEY_COLUMNS
        );
        let rows: Vec<ApiKeyRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(ApiKeyRow::into_domain).collect()
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError> {
        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ? AND is_active = 1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}
