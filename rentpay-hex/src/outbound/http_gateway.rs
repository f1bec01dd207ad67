//! REST client for the hosted-checkout card gateway.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use rentpay_types::ports::{CaptureMode, CheckoutRequest, CheckoutSession, CheckoutStatus};
use rentpay_types::{GatewayError, Money, PaymentGateway};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpGateway {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CheckoutBody {
    merchant_reference: String,
    booking_reference: String,
    amount: i64,
    currency: String,
    /// `DB` charges, `PA` only places a hold
    payment_type: &'static str,
    method: String,
    expires_at: DateTime<Utc>,
    return_url: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutCreated {
    id: String,
    redirect_url: String,
    #[serde(default)]
    transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutState {
    state: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct CaptureBody {
    amount: i64,
    currency: String,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends with bearer auth. A 404 on a call about `reference` means the
    /// gateway does not know it.
    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        reference: Option<&str>,
    ) -> Result<Response, GatewayError> {
        let resp = req
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if let (StatusCode::NOT_FOUND, Some(reference)) = (status, reference) {
            return Err(GatewayError::UnknownSession(reference.to_string()));
        }

        let body = resp.text().await.unwrap_or_default();
        let message = rejection_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
        tracing::warn!(status = status.as_u16(), %message, "Gateway request failed");

        if status.is_server_error() {
            Err(GatewayError::Unavailable(message))
        } else {
            Err(GatewayError::Rejected(message))
        }
    }
}

/// The gateway's own error text, passed on unchanged.
fn rejection_message(body: &str) -> Option<String> {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error", "description"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        });
    from_json.or_else(|| {
        let body = body.trim();
        (!body.is_empty()).then(|| body.to_string())
    })
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[tracing::instrument(skip(self, req), fields(payment_id = %req.payment_id))]
    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let body = CheckoutBody {
            merchant_reference: req.payment_id.to_string(),
            booking_reference: req.booking_id.to_string(),
            amount: req.amount.amount(),
            currency: req.amount.currency().to_string(),
            payment_type: match req.capture_mode {
                CaptureMode::Charge => "DB",
                CaptureMode::AuthorizeOnly => "PA",
            },
            method: req.method_type.to_string(),
            expires_at: req.expires_at,
            return_url: req.return_url,
        };

        let created: CheckoutCreated = self
            .send(self.client.post(self.url("/checkouts")).json(&body), None)
            .await?
            .json()
            .await
            .map_err(|e| {
                GatewayError::Unavailable(format!("Unreadable checkout response: {}", e))
            })?;

        Ok(CheckoutSession {
            session_id: created.id,
            redirect_url: created.redirect_url,
            transaction_id: created.transaction_id,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn checkout_status(&self, session_id: &str) -> Result<CheckoutStatus, GatewayError> {
        let resp = self
            .send(
                self.client.get(self.url(&format!("/checkouts/{}", session_id))),
                Some(session_id),
            )
            .await?;

        let state: CheckoutState = resp
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Unreadable status response: {}", e)))?;
        let occurred_at = state.updated_at.unwrap_or_else(Utc::now);

        match state.state.to_ascii_uppercase().as_str() {
            "COMPLETED" => Ok(CheckoutStatus::Completed {
                transaction_id: state.transaction_id,
                occurred_at,
            }),
            "FAILED" => Ok(CheckoutStatus::Failed { occurred_at }),
            _ => Ok(CheckoutStatus::Pending),
        }
    }

    #[tracing::instrument(skip(self, amount), fields(amount = amount.amount()))]
    async fn capture_hold(&self, reference: &str, amount: Money) -> Result<(), GatewayError> {
        let body = CaptureBody {
            amount: amount.amount(),
            currency: amount.currency().to_string(),
        };
        self.send(
            self.client
                .post(self.url(&format!("/transactions/{}/capture", reference)))
                .json(&body),
            Some(reference),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn release_hold(&self, reference: &str) -> Result<(), GatewayError> {
        self.send(
            self.client
                .post(self.url(&format!("/transactions/{}/release", reference))),
            Some(reference),
        )
        .await?;
        Ok(())
    }
}
