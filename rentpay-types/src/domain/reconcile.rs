//! Reconciliation planning.
//!
//! Pure functions deciding what a gateway event or an admin settlement does
//! to a payment, its booking and its hold. Repositories load the rows, ask
//! for a plan, and persist every changed row in one transaction.

use chrono::{DateTime, Utc};

use super::booking::Booking;
use super::deposit::{ConfirmOutcome, SecurityDepositAuthorization};
use super::gateway::{FinalState, GatewayEvent};
use super::method::{MethodKind, MethodType};
use super::money::Money;
use super::payment::{LinkStatus, Payment, PaymentIntent};
use crate::error::DomainError;

/// Why an event changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Duplicate or out-of-order delivery
    AlreadyTerminal(LinkStatus),
    /// Only card payments are settled by the gateway
    NotGatewayMethod(MethodType),
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::AlreadyTerminal(status) => {
                write!(f, "payment already {}", status)
            }
            IgnoreReason::NotGatewayMethod(method) => {
                write!(f, "{} payments are not settled by the gateway", method)
            }
        }
    }
}

/// Rows to write for one reconciliation, all or nothing.
#[derive(Debug, Clone)]
pub enum Plan {
    Settle {
        payment: Payment,
        booking: Booking,
        credited: Money,
        /// Hold that moved to `authorized`, if any
        authorization: Option<SecurityDepositAuthorization>,
    },
    Fail {
        payment: Payment,
    },
    Ignore {
        reason: IgnoreReason,
    },
}

/// What a reconciliation ended up doing, as reported to callers.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    Settled {
        payment: Payment,
        credited: Money,
        authorization: Option<SecurityDepositAuthorization>,
    },
    Failed {
        payment: Payment,
    },
    Ignored {
        payment: Payment,
        reason: IgnoreReason,
    },
}

impl ApplyOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            ApplyOutcome::Settled { payment, .. }
            | ApplyOutcome::Failed { payment }
            | ApplyOutcome::Ignored { payment, .. } => payment,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ApplyOutcome::Ignored { .. })
    }
}

fn settle(
    mut payment: Payment,
    mut booking: Booking,
    authorization: Option<&SecurityDepositAuthorization>,
    paid_at: DateTime<Utc>,
    transaction_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<Plan, DomainError> {
    if payment.booking_id != booking.id {
        return Err(DomainError::ValidationError(format!(
            "Payment {} does not belong to booking {}",
            payment.id, booking.id
        )));
    }
    payment.mark_paid(paid_at, transaction_id, now)?;
    // A deposit hold is not a charge; it never counts towards `amount_paid`.
    let credited = match payment.payment_intent {
        PaymentIntent::SecurityDeposit => Money::zero(booking.currency),
        PaymentIntent::ClientPayment | PaymentIntent::BalancePayment => {
            let credited = payment.credit_amount(booking.currency)?;
            booking.credit(credited)?;
            credited
        }
    };
    booking.updated_at = now;

    let authorization = match (payment.payment_intent, authorization) {
        (PaymentIntent::SecurityDeposit, Some(auth)) => {
            let mut auth = auth.clone();
            match auth.confirm(paid_at)? {
                ConfirmOutcome::Authorized => {
                    booking.security_deposit_authorization_id = Some(auth.id);
                    booking.security_deposit_authorized_at = auth.authorized_at;
                    Some(auth)
                }
                ConfirmOutcome::AlreadyAuthorized => None,
            }
        }
        _ => None,
    };

    Ok(Plan::Settle {
        payment,
        booking,
        credited,
        authorization,
    })
}

/// Plans the effect of a gateway outcome on a card payment.
///
/// Terminal payments are never moved again, so replays and late events are
/// no-ops.
pub fn plan_gateway_event(
    payment: &Payment,
    booking: &Booking,
    authorization: Option<&SecurityDepositAuthorization>,
    event: &GatewayEvent,
    now: DateTime<Utc>,
) -> Result<Plan, DomainError> {
    if payment.payment_link_status.is_terminal() {
        return Ok(Plan::Ignore {
            reason: IgnoreReason::AlreadyTerminal(payment.payment_link_status),
        });
    }
    if !payment.payment_method_type.is_card() {
        return Ok(Plan::Ignore {
            reason: IgnoreReason::NotGatewayMethod(payment.payment_method_type),
        });
    }

    match event.final_state {
        FinalState::Completed => settle(
            payment.clone(),
            booking.clone(),
            authorization,
            event.occurred_at,
            event.transaction_id.clone(),
            now,
        ),
        FinalState::Failed => {
            let mut payment = payment.clone();
            payment.mark_failed(now)?;
            Ok(Plan::Fail { payment })
        }
    }
}

/// Plans an admin "mark paid" for bank transfers and manual payments.
///
/// Card payments only settle through the gateway.
pub fn plan_admin_settlement(
    payment: &Payment,
    booking: &Booking,
    paid_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Plan, DomainError> {
    match payment.payment_method_type.kind() {
        MethodKind::Card(_) => {
            return Err(DomainError::UnsupportedMethodFlow {
                method: payment.payment_method_type,
                operation: "admin settlement",
            });
        }
        MethodKind::BankTransfer => {
            if payment.payment_link_status == LinkStatus::Active && payment.proof_url.is_none() {
                return Err(DomainError::ValidationError(
                    "Bank transfer proof has not been uploaded".into(),
                ));
            }
        }
        MethodKind::Manual => {}
    }
    settle(payment.clone(), booking.clone(), None, paid_at, None, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::BookingId;
    use crate::domain::deposit::DepositStatus;
    use crate::domain::fees::calculate;
    use crate::domain::method::{Caller, PaymentMethod};
    use crate::domain::payment::OpenedLink;
    use chrono::Duration;
    use rentpay_rates::CurrencyCode;
    use rust_decimal::Decimal;

    fn method(method_type: MethodType) -> PaymentMethod {
        PaymentMethod {
            method_type,
            display_name: method_type.to_string(),
            fee_percentage: Decimal::new(3, 0),
            settlement_currency: CurrencyCode::EUR,
            requires_conversion: false,
            is_enabled: true,
            admin_only: false,
            sort_order: 1,
            updated_at: Utc::now(),
        }
    }

    fn booking() -> Booking {
        Booking::new(
            BookingId::new(),
            100_000,
            CurrencyCode::EUR,
            150_000,
            Decimal::new(30, 0),
        )
        .unwrap()
    }

    fn payment_for(
        booking: &Booking,
        method_type: MethodType,
        intent: PaymentIntent,
        activate: bool,
    ) -> Payment {
        let base = booking.amount_due(intent).unwrap();
        let calc = calculate(base, intent, &method(method_type), Caller::Admin, None).unwrap();
        let now = Utc::now();
        let mut payment = Payment::new(booking.id, &calc, now);
        if activate {
            payment
                .activate(
                    OpenedLink {
                        url: Some("https://pay.example/s".into()),
                        expires_at: Some(now + Duration::hours(48)),
                        gateway_session_id: Some("sess_1".into()),
                        ..Default::default()
                    },
                    now,
                )
                .unwrap();
        }
        payment
    }

    fn event(state: FinalState) -> GatewayEvent {
        GatewayEvent {
            reference: "sess_1".into(),
            transaction_id: Some("tx_1".into()),
            final_state: state,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_completed_event_credits_booking() {
        let booking = booking();
        let payment = payment_for(
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::ClientPayment,
            true,
        );
        let plan =
            plan_gateway_event(&payment, &booking, None, &event(FinalState::Completed), Utc::now())
                .unwrap();
        match plan {
            Plan::Settle {
                payment,
                booking,
                credited,
                authorization,
            } => {
                assert_eq!(payment.payment_link_status, LinkStatus::Paid);
                assert_eq!(payment.gateway_transaction_id.as_deref(), Some("tx_1"));
                assert_eq!(credited.amount(), 30_900);
                assert_eq!(booking.amount_paid, 30_900);
                assert!(authorization.is_none());
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn test_replayed_event_is_ignored() {
        let booking = booking();
        let mut payment = payment_for(
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::ClientPayment,
            true,
        );
        let now = Utc::now();
        payment.mark_paid(now, None, now).unwrap();

        for state in [FinalState::Completed, FinalState::Failed] {
            let plan = plan_gateway_event(&payment, &booking, None, &event(state), now).unwrap();
            assert!(matches!(
                plan,
                Plan::Ignore {
                    reason: IgnoreReason::AlreadyTerminal(LinkStatus::Paid)
                }
            ));
        }
    }

    #[test]
    fn test_failed_event_does_not_credit() {
        let booking = booking();
        let payment = payment_for(
            &booking,
            MethodType::Amex,
            PaymentIntent::BalancePayment,
            true,
        );
        let plan =
            plan_gateway_event(&payment, &booking, None, &event(FinalState::Failed), Utc::now())
                .unwrap();
        match plan {
            Plan::Fail { payment } => assert_eq!(payment.payment_link_status, LinkStatus::Failed),
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn test_gateway_never_settles_bank_transfer() {
        let booking = booking();
        let payment = payment_for(
            &booking,
            MethodType::BankTransfer,
            PaymentIntent::ClientPayment,
            true,
        );
        let plan =
            plan_gateway_event(&payment, &booking, None, &event(FinalState::Completed), Utc::now())
                .unwrap();
        assert!(matches!(
            plan,
            Plan::Ignore {
                reason: IgnoreReason::NotGatewayMethod(MethodType::BankTransfer)
            }
        ));
    }

    #[test]
    fn test_deposit_completion_confirms_hold() {
        let booking = booking();
        let mut payment = payment_for(
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::SecurityDeposit,
            true,
        );
        let mut auth = SecurityDepositAuthorization::request(
            booking.id,
            150_000,
            CurrencyCode::EUR,
            8760,
            Utc::now(),
        )
        .unwrap();
        auth.payment_id = Some(payment.id);
        payment.gateway_session_id = Some("sess_1".into());

        let ev = event(FinalState::Completed);
        let plan = plan_gateway_event(&payment, &booking, Some(&auth), &ev, Utc::now()).unwrap();
        match plan {
            Plan::Settle {
                authorization: Some(auth),
                booking,
                credited,
                ..
            } => {
                assert!(credited.is_zero());
                assert_eq!(booking.amount_paid, 0);
                assert_eq!(auth.status, DepositStatus::Authorized);
                assert_eq!(auth.authorized_at, Some(ev.occurred_at));
                assert_eq!(auth.expires_at, ev.occurred_at + Duration::hours(8760));
                assert_eq!(booking.security_deposit_authorization_id, Some(auth.id));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn test_admin_settlement_rules() {
        let booking = booking();
        let now = Utc::now();

        let card = payment_for(
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::ClientPayment,
            true,
        );
        assert!(matches!(
            plan_admin_settlement(&card, &booking, now, now),
            Err(DomainError::UnsupportedMethodFlow { .. })
        ));

        let mut bank = payment_for(
            &booking,
            MethodType::BankTransfer,
            PaymentIntent::ClientPayment,
            true,
        );
        assert!(plan_admin_settlement(&bank, &booking, now, now).is_err());
        bank.attach_proof("https://files/proof.pdf".into(), now)
            .unwrap();
        assert!(matches!(
            plan_admin_settlement(&bank, &booking, now, now).unwrap(),
            Plan::Settle { .. }
        ));

        let manual = payment_for(
            &booking,
            MethodType::Manual,
            PaymentIntent::ClientPayment,
            false,
        );
        match plan_admin_settlement(&manual, &booking, now, now).unwrap() {
            Plan::Settle { payment, .. } => {
                assert_eq!(payment.payment_link_status, LinkStatus::Paid);
                assert_eq!(payment.paid_at, Some(now));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}
