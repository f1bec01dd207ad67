//! Shared reconciliation scaffolding for the SQL adapters.
//!
//! Adapters load the payment, booking and hold inside one transaction, ask
//! the domain planner what to do, and write every changed row with
//! compare-and-set guards. A lost race rolls back and replans against
//! fresh rows; a replay then plans as a no-op.

use chrono::{DateTime, Utc};

use rentpay_types::domain::{Plan, plan_admin_settlement, plan_gateway_event};
use rentpay_types::{
    ApplyOutcome, Booking, DomainError, GatewayEvent, PaymentId, Payment, RepoError,
    SecurityDepositAuthorization,
};

/// Attempts before giving up on a contended reconciliation.
pub(crate) const MAX_ATTEMPTS: usize = 3;

/// What is being reconciled.
pub(crate) enum Target<'a> {
    Event(&'a GatewayEvent),
    Settlement {
        id: PaymentId,
        paid_at: DateTime<Utc>,
    },
}

impl Target<'_> {
    pub(crate) fn plan(
        &self,
        payment: &Payment,
        booking: &Booking,
        authorization: Option<&SecurityDepositAuthorization>,
        now: DateTime<Utc>,
    ) -> Result<Plan, DomainError> {
        match self {
            Target::Event(event) => plan_gateway_event(payment, booking, authorization, event, now),
            Target::Settlement { paid_at, .. } => {
                plan_admin_settlement(payment, booking, *paid_at, now)
            }
        }
    }

    /// Error when the target payment does not exist.
    pub(crate) fn missing(&self) -> RepoError {
        match self {
            Target::Event(event) => RepoError::UnknownTransaction(event.reference.clone()),
            Target::Settlement { .. } => RepoError::NotFound,
        }
    }
}

pub(crate) enum Attempt {
    Done(ApplyOutcome),
    /// A compare-and-set lost to a concurrent writer; nothing was committed.
    Lost,
}

pub(crate) fn missing_booking(payment: &Payment) -> RepoError {
    RepoError::Inconsistent(format!(
        "Payment {} references missing booking {}",
        payment.id, payment.booking_id
    ))
}

pub(crate) fn exhausted() -> RepoError {
    RepoError::Conflict("Reconciliation kept losing to concurrent updates".into())
}
