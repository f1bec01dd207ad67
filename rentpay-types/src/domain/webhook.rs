//! Journal of inbound gateway webhooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::id::uuid_id;
use super::payment::PaymentId;
use crate::error::DomainError;

uuid_id! {
    /// Unique identifier for a recorded gateway webhook.
    WebhookEventId
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookStatus {
    #[default]
    Received,
    Applied,
    Ignored,
    Failed,
}

impl AsRef<str> for WebhookStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Received => "RECEIVED",
            Self::Applied => "APPLIED",
            Self::Ignored => "IGNORED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for WebhookStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RECEIVED" => Ok(Self::Received),
            "APPLIED" => Ok(Self::Applied),
            "IGNORED" => Ok(Self::Ignored),
            "FAILED" => Ok(Self::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown webhook status: {}",
                other
            ))),
        }
    }
}

/// A durably recorded webhook delivery.
///
/// Recorded as `RECEIVED` before anything is applied, so unresolved faults
/// can be listed and handled by hand.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookEvent {
    pub id: WebhookEventId,
    /// Gateway session or transaction id the event refers to
    pub reference: Option<String>,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub status: WebhookStatus,
    pub payment_id: Option<PaymentId>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl WebhookEvent {
    pub fn new(reference: Option<String>, payload: serde_json::Value) -> Self {
        Self {
            id: WebhookEventId::new(),
            reference,
            payload,
            status: WebhookStatus::Received,
            payment_id: None,
            received_at: Utc::now(),
            processed_at: None,
            last_error: None,
        }
    }
}
