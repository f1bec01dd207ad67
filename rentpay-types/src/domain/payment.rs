//! Payment records and the payment-link state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::booking::BookingId;
use super::fees::Calculation;
use super::id::uuid_id;
use super::method::MethodType;
use super::money::Money;
use crate::error::DomainError;
use rentpay_rates::CurrencyCode;

uuid_id! {
    /// Unique identifier for a Payment.
    PaymentId
}

/// Business purpose of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntent {
    ClientPayment,
    BalancePayment,
    SecurityDeposit,
}

impl PaymentIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntent::ClientPayment => "client_payment",
            PaymentIntent::BalancePayment => "balance_payment",
            PaymentIntent::SecurityDeposit => "security_deposit",
        }
    }
}

impl std::fmt::Display for PaymentIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentIntent {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_payment" => Ok(PaymentIntent::ClientPayment),
            "balance_payment" => Ok(PaymentIntent::BalancePayment),
            "security_deposit" => Ok(PaymentIntent::SecurityDeposit),
            other => Err(DomainError::ValidationError(format!(
                "Unknown payment intent: {}",
                other
            ))),
        }
    }
}

/// Payment link status. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Active,
    Paid,
    Expired,
    Cancelled,
    Failed,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Active => "active",
            LinkStatus::Paid => "paid",
            LinkStatus::Expired => "expired",
            LinkStatus::Cancelled => "cancelled",
            LinkStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LinkStatus::Paid | LinkStatus::Expired | LinkStatus::Cancelled | LinkStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: LinkStatus) -> bool {
        use LinkStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Paid)
                | (Pending, Failed)
                | (Active, Paid)
                | (Active, Expired)
                | (Active, Cancelled)
                | (Active, Failed)
        )
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LinkStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LinkStatus::Pending),
            "active" => Ok(LinkStatus::Active),
            "paid" => Ok(LinkStatus::Paid),
            "expired" => Ok(LinkStatus::Expired),
            "cancelled" => Ok(LinkStatus::Cancelled),
            "failed" => Ok(LinkStatus::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown payment link status: {}",
                other
            ))),
        }
    }
}

/// A payment request and its link.
///
/// Amounts are frozen at creation time; later method or rate changes never
/// touch an existing record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,
    /// Base amount in minor units of `currency`
    pub amount: i64,
    pub currency: CurrencyCode,
    pub payment_intent: PaymentIntent,
    pub payment_method_type: MethodType,
    pub fee_amount: i64,
    /// `amount + fee_amount`, in `currency`
    pub total_amount: i64,
    /// `total_amount` in `final_currency`, set only when converted
    pub converted_amount: Option<i64>,
    pub final_currency: CurrencyCode,
    #[schema(value_type = Option<String>)]
    pub conversion_rate: Option<Decimal>,
    pub payment_link_url: Option<String>,
    pub payment_link_status: LinkStatus,
    pub payment_link_expires_at: Option<DateTime<Utc>>,
    pub gateway_session_id: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub proof_url: Option<String>,
    pub instructions: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a `pending` payment from an authoritative calculation.
    pub fn new(booking_id: BookingId, calc: &Calculation, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            booking_id,
            amount: calc.base.amount(),
            currency: calc.base.currency(),
            payment_intent: calc.payment_intent,
            payment_method_type: calc.method_type,
            fee_amount: calc.fee.amount(),
            total_amount: calc.total.amount(),
            converted_amount: calc.converted.map(|m| m.amount()),
            final_currency: calc.final_currency,
            conversion_rate: calc.rate,
            payment_link_url: None,
            payment_link_status: LinkStatus::Pending,
            payment_link_expires_at: None,
            gateway_session_id: None,
            gateway_transaction_id: None,
            proof_url: None,
            instructions: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status as seen at `now`: an active link past its expiry reads as
    /// expired even before anything persists that.
    pub fn status_at(&self, now: DateTime<Utc>) -> LinkStatus {
        match (self.payment_link_status, self.payment_link_expires_at) {
            (LinkStatus::Active, Some(expires_at)) if expires_at <= now => LinkStatus::Expired,
            (status, _) => status,
        }
    }

    /// Returns a copy with the lazily evaluated status applied.
    pub fn as_seen_at(&self, now: DateTime<Utc>) -> Payment {
        let mut seen = self.clone();
        seen.payment_link_status = self.status_at(now);
        seen
    }

    pub fn is_link_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.payment_link_status == LinkStatus::Active && self.status_at(now) == LinkStatus::Expired
    }

    /// Amount actually charged, in the currency it is charged in.
    pub fn charged(&self) -> Result<Money, DomainError> {
        match self.converted_amount {
            Some(converted) => Money::new(converted, self.final_currency),
            None => Money::new(self.total_amount, self.currency),
        }
    }

    /// Amount credited to a booking tracked in `booking_currency`.
    pub fn credit_amount(&self, booking_currency: CurrencyCode) -> Result<Money, DomainError> {
        if self.currency == booking_currency {
            return Money::new(self.total_amount, booking_currency);
        }
        match self.converted_amount {
            Some(converted) if self.final_currency == booking_currency => {
                Money::new(converted, booking_currency)
            }
            _ => Err(DomainError::CurrencyMismatch {
                expected: booking_currency,
                got: self.currency,
            }),
        }
    }

    fn transition(&mut self, next: LinkStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        let current = self.status_at(now);
        if !current.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                entity: "payment",
                current: current.to_string(),
                requested: next.to_string(),
            });
        }
        self.payment_link_status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Marks the link live.
    pub fn activate(
        &mut self,
        link: OpenedLink,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition(LinkStatus::Active, now)?;
        self.payment_link_url = link.url;
        self.payment_link_expires_at = link.expires_at;
        self.gateway_session_id = link.gateway_session_id;
        self.gateway_transaction_id = link.gateway_transaction_id;
        self.instructions = link.instructions;
        Ok(())
    }

    /// Admin cancellation of a live, unpaid link.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(LinkStatus::Cancelled, now)
    }

    pub fn mark_paid(
        &mut self,
        paid_at: DateTime<Utc>,
        gateway_transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        // Settlement is judged on the persisted status so a late confirmation
        // still lands on a link that only reads as expired.
        let current = self.payment_link_status;
        if !current.can_transition_to(LinkStatus::Paid) {
            return Err(DomainError::InvalidTransition {
                entity: "payment",
                current: current.to_string(),
                requested: LinkStatus::Paid.to_string(),
            });
        }
        self.payment_link_status = LinkStatus::Paid;
        self.paid_at = Some(paid_at);
        if gateway_transaction_id.is_some() {
            self.gateway_transaction_id = gateway_transaction_id;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let current = self.payment_link_status;
        if !current.can_transition_to(LinkStatus::Failed) {
            return Err(DomainError::InvalidTransition {
                entity: "payment",
                current: current.to_string(),
                requested: LinkStatus::Failed.to_string(),
            });
        }
        self.payment_link_status = LinkStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    /// Persists a lazily detected expiry.
    pub fn mark_expired(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_link_expired_at(now) {
            return Err(DomainError::InvalidTransition {
                entity: "payment",
                current: self.status_at(now).to_string(),
                requested: LinkStatus::Expired.to_string(),
            });
        }
        self.payment_link_status = LinkStatus::Expired;
        self.updated_at = now;
        Ok(())
    }

    /// Records the client's bank-transfer proof on a live link.
    pub fn attach_proof(
        &mut self,
        proof_url: String,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.payment_method_type != MethodType::BankTransfer {
            return Err(DomainError::UnsupportedMethodFlow {
                method: self.payment_method_type,
                operation: "proof upload",
            });
        }
        if proof_url.trim().is_empty() {
            return Err(DomainError::ValidationError("Proof URL is required".into()));
        }
        let current = self.status_at(now);
        if current != LinkStatus::Active {
            return Err(DomainError::InvalidTransition {
                entity: "payment",
                current: current.to_string(),
                requested: "proof upload".into(),
            });
        }
        self.proof_url = Some(proof_url);
        self.updated_at = now;
        Ok(())
    }
}

/// What a method flow produced when opening a link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenedLink {
    pub url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub gateway_session_id: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub instructions: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fees::Calculation;
    use chrono::Duration;

    fn payment(method_type: MethodType) -> Payment {
        let base = Money::new(100_000, CurrencyCode::EUR).unwrap();
        let calc = Calculation {
            base,
            fee: Money::new(3_000, CurrencyCode::EUR).unwrap(),
            total: Money::new(103_000, CurrencyCode::EUR).unwrap(),
            converted: Some(Money::new(106_090, CurrencyCode::CHF).unwrap()),
            final_currency: CurrencyCode::CHF,
            rate: Some(Decimal::new(103, 2)),
            fee_percentage: Decimal::new(3, 0),
            method_type,
            payment_intent: PaymentIntent::ClientPayment,
        };
        Payment::new(BookingId::new(), &calc, Utc::now())
    }

    fn active(method_type: MethodType, ttl: Duration) -> Payment {
        let mut p = payment(method_type);
        let now = Utc::now();
        p.activate(
            OpenedLink {
                url: Some("https://pay.example/s/1".into()),
                expires_at: Some(now + ttl),
                gateway_session_id: Some("sess_1".into()),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        p
    }

    #[test]
    fn test_status_machine_moves_forward_only() {
        for terminal in [
            LinkStatus::Paid,
            LinkStatus::Expired,
            LinkStatus::Cancelled,
            LinkStatus::Failed,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(LinkStatus::Active));
            assert!(!terminal.can_transition_to(LinkStatus::Pending));
        }
        assert!(LinkStatus::Active.can_transition_to(LinkStatus::Cancelled));
        assert!(!LinkStatus::Pending.can_transition_to(LinkStatus::Cancelled));
    }

    #[test]
    fn test_cancel_paid_payment_is_conflict() {
        let mut p = active(MethodType::VisaMastercard, Duration::hours(1));
        let now = Utc::now();
        p.mark_paid(now, Some("tx_1".into()), now).unwrap();

        let err = p.cancel(now).unwrap_err();
        match err {
            DomainError::InvalidTransition {
                current, requested, ..
            } => {
                assert_eq!(current, "paid");
                assert_eq!(requested, "cancelled");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(p.payment_link_status, LinkStatus::Paid);
    }

    #[test]
    fn test_lazy_expiry_on_read() {
        let p = active(MethodType::VisaMastercard, Duration::hours(1));
        let later = Utc::now() + Duration::hours(2);

        assert_eq!(p.payment_link_status, LinkStatus::Active);
        assert_eq!(p.status_at(later), LinkStatus::Expired);
        assert_eq!(p.as_seen_at(later).payment_link_status, LinkStatus::Expired);
    }

    #[test]
    fn test_cancel_after_expiry_fails() {
        let mut p = active(MethodType::VisaMastercard, Duration::hours(1));
        let later = Utc::now() + Duration::hours(2);
        assert!(p.cancel(later).is_err());
    }

    #[test]
    fn test_mark_expired_requires_elapsed_link() {
        let mut p = active(MethodType::VisaMastercard, Duration::hours(1));
        assert!(p.mark_expired(Utc::now()).is_err());
        p.mark_expired(Utc::now() + Duration::hours(2)).unwrap();
        assert_eq!(p.payment_link_status, LinkStatus::Expired);
    }

    #[test]
    fn test_proof_only_for_bank_transfer() {
        let mut card = active(MethodType::VisaMastercard, Duration::hours(1));
        assert!(matches!(
            card.attach_proof("https://files/p.pdf".into(), Utc::now()),
            Err(DomainError::UnsupportedMethodFlow { .. })
        ));

        let mut bank = active(MethodType::BankTransfer, Duration::hours(1));
        bank.attach_proof("https://files/p.pdf".into(), Utc::now())
            .unwrap();
        assert_eq!(bank.proof_url.as_deref(), Some("https://files/p.pdf"));
    }

    #[test]
    fn test_credit_amount_picks_booking_currency() {
        let p = payment(MethodType::VisaMastercard);
        assert_eq!(p.credit_amount(CurrencyCode::EUR).unwrap().amount(), 103_000);
        assert_eq!(p.credit_amount(CurrencyCode::CHF).unwrap().amount(), 106_090);
        assert!(p.credit_amount(CurrencyCode::USD).is_err());
        assert_eq!(p.charged().unwrap().amount(), 106_090);
    }

    #[test]
    fn test_corrupt_charge_is_an_error() {
        let mut p = payment(MethodType::VisaMastercard);
        p.converted_amount = Some(-1);
        assert!(matches!(p.charged(), Err(DomainError::NegativeAmount)));
    }
}
