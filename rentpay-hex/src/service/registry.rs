//! Payment method registry, conversion rate table and booking mirror.

use chrono::Utc;

use rentpay_rates::ConversionRate;
use rentpay_types::domain::list_enabled;
use rentpay_types::{
    AppError, Booking, BookingId, CreateRateRequest, DomainError, MethodType, MethodUpdate,
    PaymentMethod, PaymentRepository, RateQuery, UpsertBookingRequest,
};

use super::PaymentService;

impl<R: PaymentRepository> PaymentService<R> {
    // ─────────────────────────────────────────────────────────────────────────────
    // Payment Methods
    // ─────────────────────────────────────────────────────────────────────────────

    /// Enabled methods in display order; admin-only ones only for admins.
    pub async fn list_methods(&self, for_admin: bool) -> Result<Vec<PaymentMethod>, AppError> {
        let methods = self.repo.list_methods().await?;
        Ok(list_enabled(&methods, for_admin))
    }

    /// Every configured method, disabled ones included.
    pub async fn list_all_methods(&self) -> Result<Vec<PaymentMethod>, AppError> {
        Ok(self.repo.list_methods().await?)
    }

    /// Changes fee or availability. Payments already created keep their
    /// frozen fee.
    #[tracing::instrument(skip(self))]
    pub async fn update_method(
        &self,
        method_type: MethodType,
        update: MethodUpdate,
    ) -> Result<PaymentMethod, AppError> {
        let mut method = self.load_method(method_type).await?;
        method.apply_update(&update, Utc::now())?;
        self.repo.save_method(&method).await?;
        tracing::info!(
            method = %method_type,
            fee_percentage = %method.fee_percentage,
            is_enabled = method.is_enabled,
            "Payment method updated"
        );
        Ok(method)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Conversion Rates
    // ─────────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self), fields(from = %req.from_currency, to = %req.to_currency))]
    pub async fn add_rate(&self, req: CreateRateRequest) -> Result<ConversionRate, AppError> {
        let rate = ConversionRate::new(
            req.from_currency,
            req.to_currency,
            req.rate,
            req.effective_date.unwrap_or_else(Utc::now),
            req.source.unwrap_or_else(|| "manual".to_string()),
        )
        .map_err(DomainError::from)?;

        self.repo.insert_rate(&rate).await?;
        Ok(rate)
    }

    pub async fn list_rates(&self, query: RateQuery) -> Result<Vec<ConversionRate>, AppError> {
        Ok(self.repo.list_rates(query.from, query.to).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Booking mirror
    // ─────────────────────────────────────────────────────────────────────────────

    /// Sync hook for the booking subsystem. Money already collected is kept.
    #[tracing::instrument(skip(self, req), fields(booking_id = %id))]
    pub async fn upsert_booking(
        &self,
        id: BookingId,
        req: UpsertBookingRequest,
    ) -> Result<Booking, AppError> {
        let booking = Booking::new(
            id,
            req.amount_total,
            req.currency,
            req.security_deposit_amount,
            req.payment_amount_percent,
        )?;

        if let Some(existing) = self.repo.get_booking(id).await? {
            if existing.currency != booking.currency && existing.amount_paid > 0 {
                return Err(AppError::conflict(format!(
                    "Booking {} already has {} {} paid; its currency cannot change",
                    id, existing.amount_paid, existing.currency
                )));
            }
        }

        Ok(self.repo.upsert_booking(&booking).await?)
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, AppError> {
        self.load_booking(id).await
    }
}
