//! In-memory card gateway.
//!
//! Checkouts stay open until [`SandboxGateway::complete`] or
//! [`SandboxGateway::fail`] decides them, which is what a payer does on the
//! real hosted page.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use rentpay_types::ports::{CaptureMode, CheckoutRequest, CheckoutSession, CheckoutStatus};
use rentpay_types::{FinalState, GatewayError, GatewayEvent, Money, PaymentGateway, PaymentId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Completed {
        transaction_id: String,
        at: DateTime<Utc>,
    },
    Failed {
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct SandboxSession {
    pub session_id: String,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub capture_mode: CaptureMode,
    pub state: SessionState,
    pub captured: Option<Money>,
    pub released: bool,
}

pub struct SandboxGateway {
    base_url: String,
    sessions: DashMap<String, SandboxSession>,
    /// transaction id -> session id
    transactions: DashMap<String, String>,
    rejection: Mutex<Option<String>>,
}

impl SandboxGateway {
    /// `base_url` is where the sandbox checkout routes are served.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sessions: DashMap::new(),
            transactions: DashMap::new(),
            rejection: Mutex::new(None),
        }
    }

    /// Makes the next `create_checkout` fail with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        let mut slot = self.rejection.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(reason.into());
    }

    fn take_rejection(&self) -> Option<String> {
        self.rejection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub fn session(&self, reference: &str) -> Option<SandboxSession> {
        let id = self.resolve(reference)?;
        self.sessions.get(&id).map(|s| s.clone())
    }

    fn resolve(&self, reference: &str) -> Option<String> {
        if self.sessions.contains_key(reference) {
            return Some(reference.to_string());
        }
        self.transactions.get(reference).map(|s| s.clone())
    }

    /// Payer completed the checkout. Completing twice returns the same event.
    pub fn complete(&self, session_id: &str) -> Result<GatewayEvent, GatewayError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| GatewayError::UnknownSession(session_id.to_string()))?;

        let (transaction_id, at) = match session.state.clone() {
            SessionState::Completed { transaction_id, at } => (transaction_id, at),
            SessionState::Failed { .. } => {
                return Err(GatewayError::Rejected("Checkout already failed".into()));
            }
            SessionState::Open => {
                let transaction_id = format!("txn_{}", Uuid::new_v4().simple());
                let at = Utc::now();
                session.state = SessionState::Completed {
                    transaction_id: transaction_id.clone(),
                    at,
                };
                self.transactions
                    .insert(transaction_id.clone(), session_id.to_string());
                (transaction_id, at)
            }
        };

        Ok(GatewayEvent {
            reference: session_id.to_string(),
            transaction_id: Some(transaction_id),
            final_state: FinalState::Completed,
            occurred_at: at,
        })
    }

    /// Payer's card was declined.
    pub fn fail(&self, session_id: &str) -> Result<GatewayEvent, GatewayError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| GatewayError::UnknownSession(session_id.to_string()))?;

        let at = match session.state.clone() {
            SessionState::Failed { at } => at,
            SessionState::Completed { .. } => {
                return Err(GatewayError::Rejected("Checkout already completed".into()));
            }
            SessionState::Open => {
                let at = Utc::now();
                session.state = SessionState::Failed { at };
                at
            }
        };

        Ok(GatewayEvent {
            reference: session_id.to_string(),
            transaction_id: None,
            final_state: FinalState::Failed,
            occurred_at: at,
        })
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        if let Some(reason) = self.take_rejection() {
            return Err(GatewayError::Rejected(reason));
        }
        if req.amount.amount() <= 0 {
            return Err(GatewayError::Rejected("Amount must be positive".into()));
        }

        let session_id = format!("sess_{}", Uuid::new_v4().simple());
        self.sessions.insert(
            session_id.clone(),
            SandboxSession {
                session_id: session_id.clone(),
                payment_id: req.payment_id,
                amount: req.amount,
                capture_mode: req.capture_mode,
                state: SessionState::Open,
                captured: None,
                released: false,
            },
        );
        tracing::debug!(
            session_id = %session_id,
            payment_id = %req.payment_id,
            "Sandbox checkout opened"
        );

        Ok(CheckoutSession {
            redirect_url: format!("{}/sandbox/checkouts/{}", self.base_url, session_id),
            session_id,
            transaction_id: None,
        })
    }

    async fn checkout_status(&self, session_id: &str) -> Result<CheckoutStatus, GatewayError> {
        let session = self
            .session(session_id)
            .ok_or_else(|| GatewayError::UnknownSession(session_id.to_string()))?;
        Ok(match session.state {
            SessionState::Open => CheckoutStatus::Pending,
            SessionState::Completed { transaction_id, at } => CheckoutStatus::Completed {
                transaction_id: Some(transaction_id),
                occurred_at: at,
            },
            SessionState::Failed { at } => CheckoutStatus::Failed { occurred_at: at },
        })
    }

    async fn capture_hold(&self, reference: &str, amount: Money) -> Result<(), GatewayError> {
        let id = self
            .resolve(reference)
            .ok_or_else(|| GatewayError::UnknownSession(reference.to_string()))?;
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| GatewayError::UnknownSession(reference.to_string()))?;

        if session.capture_mode != CaptureMode::AuthorizeOnly {
            return Err(GatewayError::Rejected("Transaction is not a hold".into()));
        }
        if !matches!(session.state, SessionState::Completed { .. }) {
            return Err(GatewayError::Rejected("Hold is not authorized".into()));
        }
        if session.released || session.captured.is_some() {
            return Err(GatewayError::Rejected("Hold already settled".into()));
        }
        if amount.currency() != session.amount.currency()
            || amount.amount() > session.amount.amount()
        {
            return Err(GatewayError::Rejected(
                "Capture exceeds the authorized amount".into(),
            ));
        }
        session.captured = Some(amount);
        Ok(())
    }

    async fn release_hold(&self, reference: &str) -> Result<(), GatewayError> {
        let id = self
            .resolve(reference)
            .ok_or_else(|| GatewayError::UnknownSession(reference.to_string()))?;
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| GatewayError::UnknownSession(reference.to_string()))?;

        if session.capture_mode != CaptureMode::AuthorizeOnly {
            return Err(GatewayError::Rejected("Transaction is not a hold".into()));
        }
        if session.captured.is_some() {
            return Err(GatewayError::Rejected("Hold already captured".into()));
        }
        session.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rentpay_types::{BookingId, CurrencyCode, MethodType};

    fn checkout(mode: CaptureMode) -> CheckoutRequest {
        CheckoutRequest {
            payment_id: PaymentId::new(),
            booking_id: BookingId::new(),
            amount: Money::new(154_500, CurrencyCode::CHF).unwrap(),
            method_type: MethodType::VisaMastercard,
            capture_mode: mode,
            expires_at: Utc::now() + Duration::hours(1),
            return_url: "http://localhost/return".into(),
        }
    }

    #[tokio::test]
    async fn test_checkout_lifecycle() {
        let gateway = SandboxGateway::new("http://sandbox/");
        let session = gateway.create_checkout(checkout(CaptureMode::Charge)).await.unwrap();
        assert!(session.session_id.starts_with("sess_"));
        assert!(session.redirect_url.starts_with("http://sandbox/sandbox/checkouts/"));

        assert_eq!(
            gateway.checkout_status(&session.session_id).await.unwrap(),
            CheckoutStatus::Pending
        );

        let first = gateway.complete(&session.session_id).unwrap();
        let again = gateway.complete(&session.session_id).unwrap();
        assert_eq!(first, again);
        assert!(gateway.fail(&session.session_id).is_err());

        let txn = first.transaction_id.unwrap();
        assert!(matches!(
            gateway.checkout_status(&txn).await.unwrap(),
            CheckoutStatus::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_reject_next_applies_once() {
        let gateway = SandboxGateway::new("http://sandbox");
        gateway.reject_next("Card number invalid");

        let err = gateway
            .create_checkout(checkout(CaptureMode::Charge))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(ref r) if r == "Card number invalid"));
        assert!(gateway.create_checkout(checkout(CaptureMode::Charge)).await.is_ok());
    }

    #[tokio::test]
    async fn test_hold_capture_rules() {
        let gateway = SandboxGateway::new("http://sandbox");
        let session = gateway
            .create_checkout(checkout(CaptureMode::AuthorizeOnly))
            .await
            .unwrap();
        let chf = |amount| Money::new(amount, CurrencyCode::CHF).unwrap();

        // Not authorized yet
        assert!(gateway.capture_hold(&session.session_id, chf(100)).await.is_err());

        gateway.complete(&session.session_id).unwrap();
        assert!(gateway.capture_hold(&session.session_id, chf(154_501)).await.is_err());
        gateway.capture_hold(&session.session_id, chf(51_500)).await.unwrap();
        assert!(gateway.release_hold(&session.session_id).await.is_err());
        assert_eq!(
            gateway.session(&session.session_id).unwrap().captured,
            Some(chf(51_500))
        );
    }

    #[tokio::test]
    async fn test_charge_is_not_a_hold() {
        let gateway = SandboxGateway::new("http://sandbox");
        let session = gateway.create_checkout(checkout(CaptureMode::Charge)).await.unwrap();
        gateway.complete(&session.session_id).unwrap();
        assert!(gateway.release_hold(&session.session_id).await.is_err());
    }
}
