//! Gateway reconciler.
//!
//! Webhooks and sync polls end up in [`PaymentService::apply_event`], which
//! hands the event to the repository's atomic `apply_gateway_event`.

use rentpay_repo::security::verify_webhook_signature;
use rentpay_types::{
    AppError, ApplyOutcome, GatewayEvent, GatewayWebhookPayload, PaymentRepository, WebhookAck,
    WebhookEvent, WebhookEventQuery, WebhookStatus,
};

use super::PaymentService;

const DEFAULT_EVENT_LIMIT: i64 = 50;
const MAX_EVENT_LIMIT: i64 = 500;

impl<R: PaymentRepository> PaymentService<R> {
    /// Applies one gateway outcome. Replays and late events come back as
    /// `Ignored` rather than as errors.
    #[tracing::instrument(
        skip(self, event),
        fields(reference = %event.reference, state = %event.final_state)
    )]
    pub async fn apply_event(&self, event: &GatewayEvent) -> Result<ApplyOutcome, AppError> {
        let outcome = self.repo.apply_gateway_event(event).await?;
        match &outcome {
            ApplyOutcome::Settled {
                payment,
                credited,
                authorization,
            } => tracing::info!(
                payment_id = %payment.id,
                booking_id = %payment.booking_id,
                credited = credited.amount(),
                authorization_id = authorization.as_ref().map(|a| a.id.to_string()),
                "Gateway event settled payment"
            ),
            ApplyOutcome::Failed { payment } => tracing::warn!(
                payment_id = %payment.id,
                booking_id = %payment.booking_id,
                intent = %payment.payment_intent,
                "Gateway event failed payment"
            ),
            ApplyOutcome::Ignored { payment, reason } => tracing::info!(
                payment_id = %payment.id,
                %reason,
                "Gateway event ignored"
            ),
        }
        Ok(outcome)
    }

    /// Authenticates, journals and applies one webhook delivery.
    ///
    /// Once the delivery is recorded it is acknowledged even if applying it
    /// failed; the journal keeps the fault for manual handling.
    #[tracing::instrument(skip(self, body, signature), fields(bytes = body.len()))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, AppError> {
        if let Some(secret) = self.settings.webhook_secret.as_deref() {
            let signature = signature
                .ok_or_else(|| AppError::Unauthorized("Missing webhook signature".into()))?;
            if !verify_webhook_signature(body, signature, secret) {
                tracing::warn!("Webhook signature mismatch");
                return Err(AppError::Unauthorized("Invalid webhook signature".into()));
            }
        }

        let raw: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid webhook body: {}", e)))?;

        if let Some(expected) = self.settings.listener_id.as_deref() {
            let listener = raw.get("listenerEntityId").and_then(|v| v.as_str());
            if listener != Some(expected) {
                tracing::warn!(listener = ?listener, "Webhook for another listener");
                return Err(AppError::Unauthorized("Unknown webhook listener".into()));
            }
        }

        let reference = ["entityId", "session_id"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string);
        let record = WebhookEvent::new(reference, raw.clone());
        self.repo.record_webhook(&record).await?;

        let event = serde_json::from_value::<GatewayWebhookPayload>(raw)
            .map_err(|e| e.to_string())
            .and_then(|payload| payload.into_event().map_err(|e| e.to_string()));

        let (status, payment_id, last_error) = match event {
            Err(err) => {
                tracing::error!(
                    webhook_id = %record.id,
                    error = %err,
                    "Webhook could not be parsed"
                );
                (WebhookStatus::Failed, None, Some(err))
            }
            Ok(event) => match self.apply_event(&event).await {
                Ok(ApplyOutcome::Ignored { payment, reason }) => {
                    (WebhookStatus::Ignored, Some(payment.id), Some(reason.to_string()))
                }
                Ok(outcome) => (WebhookStatus::Applied, Some(outcome.payment().id), None),
                Err(err) => {
                    tracing::error!(
                        webhook_id = %record.id,
                        reference = %event.reference,
                        error = %err,
                        "Webhook needs manual intervention"
                    );
                    (WebhookStatus::Failed, None, Some(err.to_string()))
                }
            },
        };

        self.repo
            .update_webhook_status(record.id, status, payment_id, last_error)
            .await?;

        Ok(WebhookAck {
            received: true,
            event_id: record.id,
            status,
        })
    }

    /// Journaled webhooks, newest first.
    pub async fn list_gateway_events(
        &self,
        query: WebhookEventQuery,
    ) -> Result<Vec<WebhookEvent>, AppError> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_EVENT_LIMIT)
            .clamp(1, MAX_EVENT_LIMIT);
        Ok(self.repo.list_webhooks(query.status, limit).await?)
    }
}
