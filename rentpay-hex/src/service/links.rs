//! Payment link manager.

use chrono::{DateTime, Duration, Utc};

use rentpay_types::domain::MAX_AUTHORIZATION_HOURS;
use rentpay_types::ports::{CaptureMode, CheckoutStatus};
use rentpay_types::{
    AppError, ApplyOutcome, AttachProofRequest, BookingId, Caller, CreatePaymentRequest,
    DomainError, FinalState, GatewayEvent, LinkStatus, MarkPaidRequest, Payment, PaymentId,
    PaymentIntent, PaymentRepository, PaymentSyncResponse, SyncResult,
};

use super::PaymentService;
use super::flows::{LinkContext, MethodFlow, Opened};

impl<R: PaymentRepository> PaymentService<R> {
    pub(crate) async fn load_payment(&self, id: PaymentId) -> Result<Payment, AppError> {
        self.repo
            .get_payment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {}", id)))
    }

    /// Opens the method's link on a fresh `pending` payment.
    ///
    /// A gateway refusal leaves the payment `failed` so the caller can keep
    /// it for audit.
    pub(crate) async fn open_link(
        &self,
        payment: &mut Payment,
        capture_mode: CaptureMode,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let flow = MethodFlow::for_method(payment.payment_method_type);
        let charged = payment.charged()?;
        let opened = flow
            .open(LinkContext {
                payment: &*payment,
                charged,
                capture_mode,
                expires_at,
                settings: &self.settings,
                gateway: self.gateway.as_ref(),
            })
            .await;

        match opened {
            Ok(Opened::Link(link)) => payment.activate(link, now)?,
            Ok(Opened::Instructions(text)) => {
                payment.instructions = Some(text);
                payment.updated_at = now;
            }
            Err(err) => {
                payment.mark_failed(now)?;
                tracing::warn!(
                    payment_id = %payment.id,
                    method = %payment.payment_method_type,
                    error = %err,
                    "Gateway refused to open a payment link"
                );
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Creates a payment with amounts frozen from the authoritative
    /// calculation and opens its link.
    #[tracing::instrument(
        skip(self, req),
        fields(
            booking_id = %booking_id,
            method = %req.method_type,
            intent = %req.payment_intent
        )
    )]
    pub async fn create_payment(
        &self,
        booking_id: BookingId,
        req: CreatePaymentRequest,
        caller: Caller,
    ) -> Result<Payment, AppError> {
        if req.payment_intent == PaymentIntent::SecurityDeposit {
            return Err(AppError::BadRequest(
                "Security deposits are requested through the security-deposit endpoint".into(),
            ));
        }
        let hours = req.expires_in_hours.unwrap_or(self.settings.link_ttl_hours);
        if !(1..=MAX_AUTHORIZATION_HOURS).contains(&hours) {
            return Err(DomainError::ExpiryOutOfRange(hours).into());
        }

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

        let now = Utc::now();
        let mut payment = Payment::new(booking.id, &calc, now);

        if let Err(err) = self
            .open_link(&mut payment, CaptureMode::Charge, now + Duration::hours(hours), now)
            .await
        {
            if payment.payment_link_status == LinkStatus::Failed {
                self.repo.insert_payment(&payment).await?;
            }
            return Err(err);
        }

        self.repo.insert_payment(&payment).await?;
        tracing::info!(
            payment_id = %payment.id,
            status = %payment.payment_link_status,
            total_amount = payment.total_amount,
            "Payment created"
        );
        Ok(payment)
    }

    /// Returns the payment with an elapsed link read as expired.
    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, AppError> {
        Ok(self.load_payment(id).await?.as_seen_at(Utc::now()))
    }

    pub async fn list_payments(&self, booking_id: BookingId) -> Result<Vec<Payment>, AppError> {
        self.load_booking(booking_id).await?;
        let now = Utc::now();
        Ok(self
            .repo
            .list_payments_for_booking(booking_id)
            .await?
            .iter()
            .map(|p| p.as_seen_at(now))
            .collect())
    }

    #[tracing::instrument(skip(self), fields(payment_id = %id))]
    pub async fn cancel_payment(&self, id: PaymentId) -> Result<Payment, AppError> {
        let mut payment = self.load_payment(id).await?;
        let expected = payment.payment_link_status;
        payment.cancel(Utc::now())?;

        if !self.repo.update_payment(&payment, expected).await? {
            return Err(AppError::conflict(format!(
                "Payment {} changed while it was being cancelled",
                id
            )));
        }
        tracing::info!(payment_id = %id, "Payment link cancelled");
        Ok(payment)
    }

    #[tracing::instrument(skip(self, req), fields(payment_id = %id))]
    pub async fn attach_proof(
        &self,
        id: PaymentId,
        req: AttachProofRequest,
    ) -> Result<Payment, AppError> {
        let mut payment = self.load_payment(id).await?;
        payment.attach_proof(req.proof_url, Utc::now())?;

        if !self.repo.update_payment(&payment, LinkStatus::Active).await? {
            return Err(AppError::conflict(format!(
                "Payment {} changed while the proof was being attached",
                id
            )));
        }
        Ok(payment)
    }

    /// Admin confirmation for bank transfers and manual payments.
    #[tracing::instrument(skip(self, req), fields(payment_id = %id))]
    pub async fn mark_paid(
        &self,
        id: PaymentId,
        req: MarkPaidRequest,
    ) -> Result<Payment, AppError> {
        let paid_at = req.paid_at.unwrap_or_else(Utc::now);
        let outcome = self.repo.settle_payment(id, paid_at).await?;
        if let ApplyOutcome::Settled { credited, .. } = &outcome {
            tracing::info!(
                payment_id = %id,
                credited = credited.amount(),
                currency = %credited.currency(),
                "Payment settled by admin"
            );
        }
        Ok(outcome.payment().clone())
    }

    /// Converges a payment with the gateway when its webhook never arrived.
    #[tracing::instrument(skip(self), fields(payment_id = %id))]
    pub async fn sync_payment(&self, id: PaymentId) -> Result<PaymentSyncResponse, AppError> {
        let payment = self.load_payment(id).await?;
        let now = Utc::now();

        if payment.payment_link_status.is_terminal() {
            return Ok(PaymentSyncResponse {
                result: SyncResult::Unchanged,
                payment,
            });
        }

        if let Some(event) = self.poll_gateway(&payment).await? {
            let outcome = self.apply_event(&event).await?;
            return Ok(PaymentSyncResponse {
                result: sync_result(&outcome),
                payment: outcome.payment().as_seen_at(now),
            });
        }

        self.expire_if_elapsed(payment, now).await
    }

    /// Asks the gateway about a card checkout. `None` while it is undecided.
    pub(crate) async fn poll_gateway(
        &self,
        payment: &Payment,
    ) -> Result<Option<GatewayEvent>, AppError> {
        let Some(session_id) = payment
            .gateway_session_id
            .as_deref()
            .filter(|_| payment.payment_method_type.is_card())
        else {
            return Ok(None);
        };

        let event = match self.gateway.checkout_status(session_id).await? {
            CheckoutStatus::Pending => None,
            CheckoutStatus::Completed {
                transaction_id,
                occurred_at,
            } => Some(GatewayEvent {
                reference: session_id.to_string(),
                transaction_id,
                final_state: FinalState::Completed,
                occurred_at,
            }),
            CheckoutStatus::Failed { occurred_at } => Some(GatewayEvent {
                reference: session_id.to_string(),
                transaction_id: None,
                final_state: FinalState::Failed,
                occurred_at,
            }),
        };
        Ok(event)
    }

    async fn expire_if_elapsed(
        &self,
        payment: Payment,
        now: DateTime<Utc>,
    ) -> Result<PaymentSyncResponse, AppError> {
        if !payment.is_link_expired_at(now) {
            return Ok(PaymentSyncResponse {
                result: SyncResult::Unchanged,
                payment,
            });
        }

        let mut expired = payment.clone();
        expired.mark_expired(now)?;
        if self.repo.update_payment(&expired, LinkStatus::Active).await? {
            tracing::info!(payment_id = %expired.id, "Elapsed payment link persisted as expired");
            return Ok(PaymentSyncResponse {
                result: SyncResult::Expired,
                payment: expired,
            });
        }

        // Someone else moved it first; report what is stored now.
        let current = self.load_payment(payment.id).await?;
        Ok(PaymentSyncResponse {
            result: SyncResult::Unchanged,
            payment: current.as_seen_at(now),
        })
    }
}

pub(crate) fn sync_result(outcome: &ApplyOutcome) -> SyncResult {
    match outcome {
        ApplyOutcome::Settled { .. } => SyncResult::Settled,
        ApplyOutcome::Failed { .. } => SyncResult::Failed,
        ApplyOutcome::Ignored { .. } => SyncResult::Unchanged,
    }
}
