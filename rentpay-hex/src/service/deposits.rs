//! Security deposit authorizer.
//!
//! A hold is a card authorization carried by a `security_deposit` payment.
//! It is confirmed only by the reconciler; capture and release reach the
//! gateway before the local state moves.

use chrono::{DateTime, Utc};

use rentpay_rates::convert_minor;
use rentpay_types::domain::{ReleaseOutcome, current_authorization};
use rentpay_types::ports::CaptureMode;
use rentpay_types::{
    AppError, ApplyOutcome, AuthorizationId, AuthorizeDepositRequest, BookingId, Caller,
    CaptureDepositRequest, DepositAuthorizationResponse, DepositStatus, DepositSyncResponse,
    DomainError, LinkStatus, Money, Payment, PaymentIntent, PaymentRepository,
    SecurityDepositAuthorization, SecurityDepositOverview, SyncResult,
};

use super::PaymentService;
use super::flows::{ConfirmationChannel, MethodFlow};

impl<R: PaymentRepository> PaymentService<R> {
    async fn load_authorization(
        &self,
        id: AuthorizationId,
    ) -> Result<SecurityDepositAuthorization, AppError> {
        self.repo
            .get_authorization(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Security deposit {}", id)))
    }

    async fn hold_payment(&self, auth: &SecurityDepositAuthorization) -> Result<Payment, AppError> {
        let id = auth.payment_id.ok_or_else(|| {
            AppError::Internal(format!("Security deposit {} has no payment", auth.id))
        })?;
        self.load_payment(id).await
    }

    /// Requests a card hold for the booking's security deposit.
    #[tracing::instrument(
        skip(self, req),
        fields(booking_id = %booking_id, method = %req.method_type)
    )]
    pub async fn authorize_deposit(
        &self,
        booking_id: BookingId,
        req: AuthorizeDepositRequest,
    ) -> Result<DepositAuthorizationResponse, AppError> {
        let flow = MethodFlow::for_method(req.method_type);
        if flow.confirmation_channel() != ConfirmationChannel::Gateway {
            return Err(DomainError::UnsupportedMethodFlow {
                method: req.method_type,
                operation: "security deposit hold",
            }
            .into());
        }

        let booking = self.load_booking(booking_id).await?;
        let now = Utc::now();
        let mut authorization = SecurityDepositAuthorization::request(
            booking.id,
            req.amount.unwrap_or(booking.security_deposit_amount),
            booking.currency,
            req.expires_in_hours,
            now,
        )?;

        let calc = self
            .calculate_for(
                &booking,
                PaymentIntent::SecurityDeposit,
                req.method_type,
                Some(authorization.amount),
                Caller::Admin,
            )
            .await?;
        let mut payment = Payment::new(booking.id, &calc, now);
        authorization.payment_id = Some(payment.id);

        if let Err(err) = self
            .open_link(
                &mut payment,
                CaptureMode::AuthorizeOnly,
                authorization.expires_at,
                now,
            )
            .await
        {
            if payment.payment_link_status == LinkStatus::Failed {
                self.repo.insert_payment(&payment).await?;
            }
            return Err(err);
        }

        self.repo.insert_authorization(&authorization, &payment).await?;
        tracing::info!(
            authorization_id = %authorization.id,
            payment_id = %payment.id,
            amount = authorization.amount,
            expires_in_hours = authorization.expires_in_hours,
            "Security deposit hold requested"
        );
        Ok(DepositAuthorizationResponse {
            authorization,
            payment,
        })
    }

    /// The booking's current hold plus every retry behind it.
    pub async fn get_deposit(
        &self,
        booking_id: BookingId,
    ) -> Result<SecurityDepositOverview, AppError> {
        self.load_booking(booking_id).await?;
        let now = Utc::now();
        let authorizations: Vec<_> = self
            .repo
            .list_authorizations_for_booking(booking_id)
            .await?
            .iter()
            .map(|a| a.as_seen_at(now))
            .collect();
        let current = current_authorization(&authorizations).cloned();
        let current_payment_status = match &current {
            Some(auth) => Some(self.hold_payment(auth).await?.status_at(now)),
            None => None,
        };
        Ok(SecurityDepositOverview {
            current,
            current_payment_status,
            authorizations,
        })
    }

    /// Charges part or all of an authorized hold.
    #[tracing::instrument(skip(self, req), fields(authorization_id = %id, amount = req.amount))]
    pub async fn capture_deposit(
        &self,
        id: AuthorizationId,
        req: CaptureDepositRequest,
    ) -> Result<SecurityDepositAuthorization, AppError> {
        let mut auth = self.load_authorization(id).await?;
        let now = Utc::now();
        auth.check_capture(req.amount, &req.reason, now)?;

        let payment = self.hold_payment(&auth).await?;
        let reference = gateway_reference(&payment)?;
        self.gateway
            .capture_hold(reference, hold_charge(&payment, req.amount)?)
            .await?;

        let expected = auth.status;
        auth.capture(req.amount, &req.reason, now)?;
        if !self.repo.update_authorization(&auth, expected).await? {
            tracing::error!(
                authorization_id = %id,
                "Gateway captured the hold but the local record changed concurrently"
            );
            return Err(AppError::conflict(format!(
                "Security deposit {} changed while it was being captured",
                id
            )));
        }

        tracing::info!(
            authorization_id = %id,
            captured_amount = req.amount,
            "Security deposit captured"
        );
        Ok(auth)
    }

    /// Releases an authorized hold. Releasing twice is a no-op.
    #[tracing::instrument(skip(self), fields(authorization_id = %id))]
    pub async fn release_deposit(
        &self,
        id: AuthorizationId,
    ) -> Result<SecurityDepositAuthorization, AppError> {
        let auth = self.load_authorization(id).await?;
        let now = Utc::now();

        let mut released = auth.clone();
        if released.release(now)? == ReleaseOutcome::AlreadyReleased {
            tracing::info!(authorization_id = %id, "Security deposit already released");
            return Ok(auth);
        }

        let payment = self.hold_payment(&auth).await?;
        self.gateway.release_hold(gateway_reference(&payment)?).await?;

        if !self.repo.update_authorization(&released, auth.status).await? {
            let current = self.load_authorization(id).await?;
            if current.status == DepositStatus::Released {
                return Ok(current);
            }
            tracing::error!(
                authorization_id = %id,
                current = %current.status,
                "Gateway released the hold but the local record changed concurrently"
            );
            return Err(AppError::conflict(format!(
                "Security deposit {} changed while it was being released",
                id
            )));
        }

        tracing::info!(authorization_id = %id, "Security deposit released");
        Ok(released)
    }

    /// Converges the booking's current hold with the gateway and persists
    /// an elapsed hold as expired.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn sync_deposit(
        &self,
        booking_id: BookingId,
    ) -> Result<DepositSyncResponse, AppError> {
        self.load_booking(booking_id).await?;
        let authorizations = self.repo.list_authorizations_for_booking(booking_id).await?;
        let Some(current) = current_authorization(&authorizations).cloned() else {
            return Ok(DepositSyncResponse {
                result: SyncResult::Unchanged,
                authorization: None,
            });
        };
        let now = Utc::now();

        if current.status == DepositStatus::Pending {
            if let Some(result) = self.poll_hold(&current, now).await? {
                let refreshed = self.load_authorization(current.id).await?;
                return Ok(DepositSyncResponse {
                    result,
                    authorization: Some(refreshed.as_seen_at(now)),
                });
            }
        }

        self.expire_hold_if_elapsed(current, now).await
    }

    /// Polls the gateway for a pending hold and applies a decided outcome.
    /// A live hold whose payment the gateway already declined reports
    /// `Failed`; once elapsed it is left to expire.
    async fn poll_hold(
        &self,
        auth: &SecurityDepositAuthorization,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncResult>, AppError> {
        let payment = self.hold_payment(auth).await?;
        if payment.payment_link_status == LinkStatus::Failed {
            let live = auth.status_at(now) == DepositStatus::Pending;
            return Ok(live.then_some(SyncResult::Failed));
        }
        if payment.payment_link_status.is_terminal() {
            return Ok(None);
        }
        let Some(event) = self.poll_gateway(&payment).await? else {
            return Ok(None);
        };
        Ok(match self.apply_event(&event).await? {
            ApplyOutcome::Settled { .. } => Some(SyncResult::Settled),
            ApplyOutcome::Failed { .. } => Some(SyncResult::Failed),
            ApplyOutcome::Ignored { .. } => None,
        })
    }

    async fn expire_hold_if_elapsed(
        &self,
        auth: SecurityDepositAuthorization,
        now: DateTime<Utc>,
    ) -> Result<DepositSyncResponse, AppError> {
        if auth.status.is_terminal() || auth.status_at(now) != DepositStatus::Expired {
            return Ok(DepositSyncResponse {
                result: SyncResult::Unchanged,
                authorization: Some(auth),
            });
        }

        let expected = auth.status;
        let mut expired = auth.clone();
        expired.expire(now)?;
        if self.repo.update_authorization(&expired, expected).await? {
            tracing::info!(
                authorization_id = %expired.id,
                "Elapsed security deposit persisted as expired"
            );
            return Ok(DepositSyncResponse {
                result: SyncResult::Expired,
                authorization: Some(expired),
            });
        }

        let current = self.load_authorization(auth.id).await?;
        Ok(DepositSyncResponse {
            result: SyncResult::Unchanged,
            authorization: Some(current.as_seen_at(now)),
        })
    }
}

/// Gateway handle for a hold: the transaction id once known, else the session.
fn gateway_reference(payment: &Payment) -> Result<&str, AppError> {
    payment
        .gateway_transaction_id
        .as_deref()
        .or(payment.gateway_session_id.as_deref())
        .ok_or_else(|| {
            AppError::Internal(format!("Payment {} has no gateway reference", payment.id))
        })
}

/// `amount` in the booking currency, expressed in the currency the hold was
/// placed in, at the rate frozen on the payment.
fn hold_charge(payment: &Payment, amount: i64) -> Result<Money, AppError> {
    let charged = match (payment.converted_amount, payment.conversion_rate) {
        (Some(_), Some(rate)) => Money::new(
            convert_minor(amount, rate).map_err(DomainError::from)?,
            payment.final_currency,
        )?,
        _ => Money::new(amount, payment.currency)?,
    };
    Ok(charged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentpay_types::domain::Calculation;
    use rentpay_types::{CurrencyCode, MethodType};
    use rust_decimal::Decimal;

    fn hold_payment(converted: bool) -> Payment {
        let base = Money::new(150_000, CurrencyCode::EUR).unwrap();
        let calc = Calculation {
            base,
            fee: Money::zero(CurrencyCode::EUR),
            total: base,
            converted: converted.then(|| Money::new(154_500, CurrencyCode::CHF).unwrap()),
            final_currency: if converted { CurrencyCode::CHF } else { CurrencyCode::EUR },
            rate: converted.then(|| Decimal::new(103, 2)),
            fee_percentage: Decimal::ZERO,
            method_type: MethodType::VisaMastercard,
            payment_intent: PaymentIntent::SecurityDeposit,
        };
        Payment::new(BookingId::new(), &calc, Utc::now())
    }

    #[test]
    fn test_hold_charge_uses_frozen_rate() {
        let charge = hold_charge(&hold_payment(true), 50_000).unwrap();
        assert_eq!(charge.amount(), 51_500);
        assert_eq!(charge.currency(), CurrencyCode::CHF);

        let charge = hold_charge(&hold_payment(false), 50_000).unwrap();
        assert_eq!(charge.amount(), 50_000);
        assert_eq!(charge.currency(), CurrencyCode::EUR);
    }

    #[test]
    fn test_gateway_reference_prefers_transaction() {
        let mut payment = hold_payment(false);
        assert!(gateway_reference(&payment).is_err());

        payment.gateway_session_id = Some("sess_1".into());
        assert_eq!(gateway_reference(&payment).unwrap(), "sess_1");

        payment.gateway_transaction_id = Some("txn_1".into());
        assert_eq!(gateway_reference(&payment).unwrap(), "txn_1");
    }
}
