//! Inbound gateway events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::DomainError;

/// Terminal outcome reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalState {
    Completed,
    Failed,
}

impl FinalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalState::Completed => "COMPLETED",
            FinalState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for FinalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized gateway outcome, from a webhook or from a status poll.
///
/// `reference` is the gateway session id or transaction id; both are
/// accepted when looking up the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GatewayEvent {
    pub reference: String,
    pub transaction_id: Option<String>,
    pub final_state: FinalState,
    pub occurred_at: DateTime<Utc>,
}

/// Webhook body as posted by the hosted-checkout gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayWebhookPayload {
    #[serde(rename = "entityId", default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub state: FinalState,
    #[serde(rename = "eventTimestamp")]
    pub event_timestamp: DateTime<Utc>,
    #[serde(rename = "listenerEntityId", default, skip_serializing_if = "Option::is_none")]
    pub listener_entity_id: Option<String>,
    #[serde(rename = "transactionId", default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl GatewayWebhookPayload {
    /// Reference used to find the payment: `entityId`, else `session_id`.
    pub fn reference(&self) -> Option<&str> {
        self.entity_id
            .as_deref()
            .or(self.session_id.as_deref())
            .filter(|r| !r.trim().is_empty())
    }

    pub fn into_event(self) -> Result<GatewayEvent, DomainError> {
        let reference = self
            .reference()
            .map(str::to_string)
            .ok_or_else(|| {
                DomainError::ValidationError("Webhook carries no entityId or session_id".into())
            })?;
        Ok(GatewayEvent {
            reference,
            transaction_id: self.transaction_id,
            final_state: self.state,
            occurred_at: self.event_timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_parses_gateway_shape() {
        let body = r#"{
            "entityId": "sess_42",
            "state": "COMPLETED",
            "eventTimestamp": "2026-03-01T10:00:00Z",
            "listenerEntityId": "listener_1"
        }"#;
        let payload: GatewayWebhookPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.listener_entity_id.as_deref(), Some("listener_1"));

        let event = payload.into_event().unwrap();
        assert_eq!(event.reference, "sess_42");
        assert_eq!(event.final_state, FinalState::Completed);
    }

    #[test]
    fn test_session_id_fallback() {
        let body =
            r#"{"session_id":"sess_7","state":"FAILED","eventTimestamp":"2026-03-01T10:00:00Z"}"#;
        let payload: GatewayWebhookPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.into_event().unwrap().reference, "sess_7");
    }

    #[test]
    fn test_missing_reference_rejected() {
        let body = r#"{"state":"FAILED","eventTimestamp":"2026-03-01T10:00:00Z"}"#;
        let payload: GatewayWebhookPayload = serde_json::from_str(body).unwrap();
        assert!(payload.into_event().is_err());
    }

    #[test]
    fn test_unknown_state_rejected() {
        let body = r#"{"entityId":"s","state":"PENDING","eventTimestamp":"2026-03-01T10:00:00Z"}"#;
        assert!(serde_json::from_str::<GatewayWebhookPayload>(body).is_err());
    }
}
