//! Fee & conversion quotes.
//!
//! The portal preview and link creation share `calculate_for`, so the
//! amount shown is the amount charged as long as the rate table does not
//! move in between.

use chrono::Utc;

use rentpay_types::domain::{calculate, needs_rate};
use rentpay_types::{
    AppError, Booking, BookingId, Calculation, Caller, MethodType, Money, PaymentIntent,
    PaymentMethod, PaymentRepository, QuoteRequest, QuoteResponse,
};

use super::PaymentService;

impl<R: PaymentRepository> PaymentService<R> {
    pub(crate) async fn load_booking(&self, id: BookingId) -> Result<Booking, AppError> {
        self.repo
            .get_booking(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {}", id)))
    }

    pub(crate) async fn load_method(
        &self,
        method_type: MethodType,
    ) -> Result<PaymentMethod, AppError> {
        self.repo
            .get_method(method_type)
            .await?
            .ok_or_else(|| AppError::BadRequest(format!("Unknown payment method: {}", method_type)))
    }

    /// Authoritative amount calculation against the current method
    /// configuration and rate table.
    pub(crate) async fn calculate_for(
        &self,
        booking: &Booking,
        intent: PaymentIntent,
        method_type: MethodType,
        amount_override: Option<i64>,
        caller: Caller,
    ) -> Result<Calculation, AppError> {
        let method = self.load_method(method_type).await?;
        method.ensure_available(caller)?;

        let base = match amount_override {
            Some(amount) => Money::positive(amount, booking.currency)?,
            None => booking.amount_due(intent)?,
        };

        let rate = if needs_rate(&method, booking.currency) {
            self.repo
                .latest_rate(booking.currency, method.settlement_currency, Utc::now())
                .await?
        } else {
            None
        };

        Ok(calculate(base, intent, &method, caller, rate.as_ref())?)
    }

    /// Amount preview for the portal or the admin booking screen.
    #[tracing::instrument(
        skip(self, req),
        fields(booking_id = %booking_id, method = %req.method_type)
    )]
    pub async fn quote(
        &self,
        booking_id: BookingId,
        req: QuoteRequest,
        caller: Caller,
    ) -> Result<QuoteResponse, AppError> {
        let booking = self.load_booking(booking_id).await?;
        let calc = self
            .calculate_for(
                &booking,
                req.payment_intent,
                req.method_type,
                req.amount_override,
                caller,
            )
            .await?;
        Ok(QuoteResponse::from_calculation(booking.id, &calc))
    }
}
