//! PostgreSQL repository adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use rentpay_rates::{ConversionRate, CurrencyCode};
use rentpay_types::{
    ApiKey, ApiKeyId, ApplyOutcome, AuthorizationId, Booking, BookingId, DepositStatus,
    GatewayEvent, LinkStatus, MethodType, Payment, PaymentId, PaymentIntent, PaymentMethod,
    PaymentRepository, RepoError, SecurityDepositAuthorization, WebhookEvent, WebhookEventId,
    WebhookStatus, domain::Plan,
};

use crate::reconcile::{Attempt, MAX_ATTEMPTS, Target, exhausted, missing_booking};
use crate::types::pg::{
    ApiKeyRow, AuthorizationRow, BookingRow, MethodRow, PaymentRow, RateRow, WebhookRow,
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

fn lock_clause(lock: bool) -> &'static str {
    if lock { " FOR UPDATE" } else { "" }
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_tables_pg.sql"),
        "0001",
    )
    .await
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Row helpers usable on the pool or inside a transaction
    // ─────────────────────────────────────────────────────────────────────────

    async fn fetch_payment<'e, E>(
        exec: E,
        id: PaymentId,
        lock: bool,
    ) -> Result<Option<Payment>, RepoError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM payments WHERE id = $1{}",
            PAYMENT_COLUMNS,
            lock_clause(lock)
        );
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.into_uuid())
            .fetch_optional(exec)
            .await
            .map_err(db_err)?;
        row.map(PaymentRow::into_domain).transpose()
    }

    async fn fetch_payment_by_ref<'e, E>(
        exec: E,
        reference: &str,
        lock: bool,
    ) -> Result<Option<Payment>, RepoError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM payments WHERE gateway_session_id = $1 OR gateway_transaction_id = $1 \
             ORDER BY created_at DESC LIMIT 1{}",
            PAYMENT_COLUMNS,
            lock_clause(lock)
        );
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(reference)
            .fetch_optional(exec)
            .await
            .map_err(db_err)?;
        row.map(PaymentRow::into_domain).transpose()
    }

    async fn fetch_booking<'e, E>(
        exec: E,
        id: BookingId,
        lock: bool,
    ) -> Result<Option<Booking>, RepoError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM bookings WHERE id = $1{}",
            BOOKING_COLUMNS,
            lock_clause(lock)
        );
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id.into_uuid())
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
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM security_deposit_authorizations WHERE payment_id = $1 FOR UPDATE",
            AUTHORIZATION_COLUMNS
        );
        let row: Option<AuthorizationRow> = sqlx::query_as(&sql)
            .bind(payment_id.into_uuid())
            .fetch_optional(exec)
            .await
            .map_err(db_err)?;
        row.map(AuthorizationRow::into_domain).transpose()
    }

    async fn write_new_payment<'e, E>(exec: E, p: &Payment) -> Result<(), RepoError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"INSERT INTO payments (id, booking_id, amount, currency, payment_intent,
                   payment_method_type, fee_amount, total_amount, converted_amount,
                   final_currency, conversion_rate, payment_link_url, payment_link_status,
                   payment_link_expires_at, gateway_session_id, gateway_transaction_id,
                   proof_url, instructions, paid_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                   $18, $19, $20, $21)"#,
        )
        .bind(p.id.into_uuid())
        .bind(p.booking_id.into_uuid())
        .bind(p.amount)
        .bind(p.currency.to_string())
        .bind(p.payment_intent.as_str())
        .bind(p.payment_method_type.as_str())
        .bind(p.fee_amount)
        .bind(p.total_amount)
        .bind(p.converted_amount)
        .bind(p.final_currency.to_string())
        .bind(p.conversion_rate)
        .bind(&p.payment_link_url)
        .bind(p.payment_link_status.as_str())
        .bind(p.payment_link_expires_at)
        .bind(&p.gateway_session_id)
        .bind(&p.gateway_transaction_id)
        .bind(&p.proof_url)
        .bind(&p.instructions)
        .bind(p.paid_at)
        .bind(p.created_at)
        .bind(p.updated_at)
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
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"UPDATE payments
               SET payment_link_url = $1, payment_link_status = $2, payment_link_expires_at = $3,
                   gateway_session_id = $4, gateway_transaction_id = $5, proof_url = $6,
                   instructions = $7, paid_at = $8, updated_at = $9
               WHERE id = $10 AND payment_link_status = $11"#,
        )
        .bind(&p.payment_link_url)
        .bind(p.payment_link_status.as_str())
        .bind(p.payment_link_expires_at)
        .bind(&p.gateway_session_id)
        .bind(&p.gateway_transaction_id)
        .bind(&p.proof_url)
        .bind(&p.instructions)
        .bind(p.paid_at)
        .bind(p.updated_at)
        .bind(p.id.into_uuid())
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
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"UPDATE security_deposit_authorizations
               SET status = $1, authorized_at = $2, expires_at = $3, released_at = $4,
                   captured_at = $5, captured_amount = $6, capture_reason = $7, updated_at = $8
               WHERE id = $9 AND status = $10"#,
        )
        .bind(a.status.as_str())
        .bind(a.authorized_at)
        .bind(a.expires_at)
        .bind(a.released_at)
        .bind(a.captured_at)
        .bind(a.captured_amount)
        .bind(&a.capture_reason)
        .bind(a.updated_at)
        .bind(a.id.into_uuid())
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

        // Lock payment, then booking, then hold; every path takes them in this order.
        let payment = match target {
            Target::Event(event) => {
                Self::fetch_payment_by_ref(&mut *tx, &event.reference, true).await?
            }
            Target::Settlement { id, .. } => Self::fetch_payment(&mut *tx, *id, true).await?,
        }
        .ok_or_else(|| target.missing())?;

        let booking = Self::fetch_booking(&mut *tx, payment.booking_id, true)
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
                       SET amount_paid = amount_paid + $1, security_deposit_authorization_id = $2,
                           security_deposit_authorized_at = $3, updated_at = $4
                       WHERE id = $5"#,
                )
                .bind(credited.amount())
                .bind(
                    credited_booking
                        .security_deposit_authorization_id
                        .map(AuthorizationId::into_uuid),
                )
                .bind(credited_booking.security_deposit_authorized_at)
                .bind(credited_booking.updated_at)
                .bind(credited_booking.id.into_uuid())
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
impl PaymentRepository for PostgresRepo {
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
            "SELECT {} FROM payment_methods WHERE method_type = $1",
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
            r#"UPDATE payment_methods SET fee_percentage = $1, is_enabled = $2, updated_at = $3
               WHERE method_type = $4"#,
        )
        .bind(method.fee_percentage)
        .bind(method.is_enabled)
        .bind(method.updated_at)
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
                   (id, from_currency, to_currency, rate, effective_date, source)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(Uuid::new_v4())
        .bind(rate.from_currency.to_string())
        .bind(rate.to_currency.to_string())
        .bind(rate.rate)
        .bind(rate.effective_date)
        .bind(&rate.source)
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
             WHERE from_currency = $1 AND to_currency = $2 AND effective_date <= $3 \
             ORDER BY effective_date DESC, recorded_at DESC LIMIT 1",
            RATE_COLUMNS
        );
        let row: Option<RateRow> = sqlx::query_as(&sql)
            .bind(from.to_string())
            .bind(to.to_string())
            .bind(at)
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
             WHERE ($1::text IS NULL OR from_currency = $1) \
               AND ($2::text IS NULL OR to_currency = $2) \
             ORDER BY effective_date DESC, recorded_at DESC",
            RATE_COLUMNS
        );
        let rows: Vec<RateRow> = sqlx::query_as(&sql)
            .bind(from.map(|c| c.to_string()))
            .bind(to.map(|c| c.to_string()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(RateRow::into_domain).collect()
    }

    async fn upsert_booking(&self, booking: &Booking) -> Result<Booking, RepoError> {
        let sql = format!(
            r#"INSERT INTO bookings (id, amount_total, amount_paid, currency,
                   security_deposit_amount, payment_amount_percent, updated_at)
               VALUES ($1, $2, 0, $3, $4, $5, $6)
               ON CONFLICT (id) DO UPDATE SET
                   amount_total = EXCLUDED.amount_total,
                   currency = EXCLUDED.currency,
                   security_deposit_amount = EXCLUDED.security_deposit_amount,
                   payment_amount_percent = EXCLUDED.payment_amount_percent,
                   updated_at = EXCLUDED.updated_at
               RETURNING {}"#,
            BOOKING_COLUMNS
        );
        let row: BookingRow = sqlx::query_as(&sql)
            .bind(booking.id.into_uuid())
            .bind(booking.amount_total)
            .bind(booking.currency.to_string())
            .bind(booking.security_deposit_amount)
            .bind(booking.payment_amount_percent)
            .bind(booking.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        row.into_domain()
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, RepoError> {
        Self::fetch_booking(&self.pool, id, false).await
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), RepoError> {
        Self::write_new_payment(&self.pool, payment).await
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        Self::fetch_payment(&self.pool, id, false).await
    }

    async fn find_payment_by_gateway_ref(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, RepoError> {
        Self::fetch_payment_by_ref(&self.pool, reference, false).await
    }

    async fn list_payments_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, RepoError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE booking_id = $1 ORDER BY created_at ASC",
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(booking_id.into_uuid())
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
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(a.id.into_uuid())
        .bind(a.booking_id.into_uuid())
        .bind(a.payment_id.map(PaymentId::into_uuid))
        .bind(a.amount)
        .bind(a.currency.to_string())
        .bind(a.status.as_str())
        .bind(a.expires_in_hours)
        .bind(a.authorized_at)
        .bind(a.expires_at)
        .bind(a.released_at)
        .bind(a.captured_at)
        .bind(a.captured_amount)
        .bind(&a.capture_reason)
        .bind(a.created_at)
        .bind(a.updated_at)
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
            "SELECT {} FROM security_deposit_authorizations WHERE id = $1",
            AUTHORIZATION_COLUMNS
        );
        let row: Option<AuthorizationRow> = sqlx::query_as(&sql)
            .bind(id.into_uuid())
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
            "SELECT {} FROM security_deposit_authorizations WHERE booking_id = $1 \
             ORDER BY created_at DESC",
            AUTHORIZATION_COLUMNS
        );
        let rows: Vec<AuthorizationRow> = sqlx::query_as(&sql)
            .bind(booking_id.into_uuid())
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
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(event.id.into_uuid())
        .bind(&event.reference)
        .bind(&event.payload)
        .bind(event.status.to_string())
        .bind(event.payment_id.map(PaymentId::into_uuid))
        .bind(event.received_at)
        .bind(event.processed_at)
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
               SET status = $1, payment_id = COALESCE($2, payment_id), processed_at = $3,
                   last_error = $4
               WHERE id = $5"#,
        )
        .bind(status.to_string())
        .bind(payment_id.map(PaymentId::into_uuid))
        .bind(Utc::now())
        .bind(last_error)
        .bind(id.into_uuid())
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
            "SELECT {} FROM gateway_events WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY received_at DESC LIMIT $2",
            WEBHOOK_COLUMNS
        );
        let rows: Vec<WebhookRow> = sqlx::query_as(&sql)
            .bind(status.map(|s| s.to_string()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(WebhookRow::into_domain).collect()
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let sql = format!(
            "UPDATE api_keys SET last_used_at = NOW() WHERE key_hash = $1 AND is_active = TRUE \
             RETURNING {}",
            API_KEY_COLUMNS
        );
        let row: Option<ApiKeyRow> = sqlx::query_as(&sql)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(ApiKeyRow::into_domain).transpose()
    }

    async fn create_api_key(&self, name: &str) -> Result<(ApiKey, String), RepoError> {
        let (raw_key, key_hash) = crate::security::generate_api_key();
        let api_key = ApiKey::new(name.to_string(), key_hash);

        sqlx::query(
            r#"INSERT INTO api_keys (id, name, key_hash, is_active, created_at)
               VALUES ($1, $2, $3, TRUE, $4)"#,
        )
        .bind(api_key.id.into_uuid())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(api_key.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = TRUE")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.0)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE is_active = TRUE ORDER BY created_at DESC",
            API_KEY_COLUMNS
        );
        let rows: Vec<ApiKeyRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(ApiKeyRow::into_domain).collect()
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError> {
        let result =
            sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = $1 AND is_active = TRUE")
                .bind(id.into_uuid())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}
