//! Narrow view of a booking owned by the booking subsystem.
//!
//! Only `amount_paid` and the security-deposit link fields are written by
//! the payment core; everything else is mirrored from the booking side.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::deposit::AuthorizationId;
use super::id::uuid_id;
use super::money::Money;
use super::payment::PaymentIntent;
use crate::error::DomainError;
use rentpay_rates::{CurrencyCode, apply_percentage};

uuid_id! {
    /// Unique identifier for a Booking.
    BookingId
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Booking {
    pub id: BookingId,
    /// Total rental price in minor units
    #[schema(example = 100000)]
    pub amount_total: i64,
    /// Amount received so far in minor units; never decreases
    pub amount_paid: i64,
    pub currency: CurrencyCode,
    /// Refundable hold requested before delivery, in minor units
    pub security_deposit_amount: i64,
    /// Share of the total due as the initial client payment
    #[schema(value_type = String, example = "30")]
    pub payment_amount_percent: Decimal,
    pub security_deposit_authorization_id: Option<AuthorizationId>,
    pub security_deposit_authorized_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a booking mirror with nothing paid yet.
    pub fn new(
        id: BookingId,
        amount_total: i64,
        currency: CurrencyCode,
        security_deposit_amount: i64,
        payment_amount_percent: Decimal,
    ) -> Result<Self, DomainError> {
        if amount_total < 0 || security_deposit_amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        if payment_amount_percent < Decimal::ZERO || payment_amount_percent > Decimal::ONE_HUNDRED
        {
            return Err(DomainError::ValidationError(
                "Payment amount percent must be between 0 and 100".into(),
            ));
        }
        Ok(Self {
            id,
            amount_total,
            amount_paid: 0,
            currency,
            security_deposit_amount,
            payment_amount_percent,
            security_deposit_authorization_id: None,
            security_deposit_authorized_at: None,
            updated_at: Utc::now(),
        })
    }

    /// Amount still owed on the rental, floored at zero.
    pub fn outstanding(&self) -> i64 {
        (self.amount_total - self.amount_paid).max(0)
    }

    /// Base amount the booking asks for under `intent`.
    pub fn amount_due(&self, intent: PaymentIntent) -> Result<Money, DomainError> {
        let amount = match intent {
            PaymentIntent::ClientPayment => {
                apply_percentage(self.amount_total, self.payment_amount_percent)?
            }
            PaymentIntent::BalancePayment => self.outstanding(),
            PaymentIntent::SecurityDeposit => self.security_deposit_amount,
        };
        Money::new(amount, self.currency)
    }

    /// Adds a confirmed payment to `amount_paid`.
    pub fn credit(&mut self, amount: Money) -> Result<(), DomainError> {
        let paid = Money::new(self.amount_paid, self.currency)?.checked_add(amount)?;
        self.amount_paid = paid.amount();
        Ok(())
    }
}
