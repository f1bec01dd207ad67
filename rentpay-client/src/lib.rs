//! # Rentpay Client SDK
//!
//! A typed Rust client for the rental payment API. Portal calls need no key;
//! admin calls send the API key as a Bearer token.

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use rentpay_types::{
    ApiKeyId, AttachProofRequest, AuthorizationId, AuthorizeDepositRequest, Booking, BookingId,
    CaptureDepositRequest, ConversionRate, CreatePaymentRequest, CreateRateRequest,
    DepositAuthorizationResponse, DepositSyncResponse, MarkPaidRequest, MethodType, MethodUpdate,
    Payment, PaymentId, PaymentMethod, PaymentSyncResponse, QuoteRequest, QuoteResponse,
    RateQuery, SecurityDepositAuthorization, SecurityDepositOverview, UpsertBookingRequest,
    WebhookEvent, WebhookEventQuery,
};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A freshly created admin API key. The raw key is shown once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedApiKey {
    pub api_key: String,
    pub message: String,
}

/// API key metadata as listed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeySummary {
    pub id: ApiKeyId,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

#[derive(Serialize)]
struct NamedKey<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct MethodListQuery {
    include_disabled: bool,
}

/// Rental payment API client.
pub struct RentpayClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl RentpayClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates the first admin key. Only works while no key exists.
    pub async fn bootstrap(&self, name: &str) -> Result<String, ClientError> {
        let created: CreatedApiKey = self
            .send(Method::POST, "/api/bootstrap", Some(&NamedKey { name }))
            .await?;
        Ok(created.api_key)
    }

    pub async fn create_api_key(&self, name: &str) -> Result<CreatedApiKey, ClientError> {
        self.send(Method::POST, "/api/admin/keys", Some(&NamedKey { name }))
            .await
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKeySummary>, ClientError> {
        self.get("/api/admin/keys").await
    }

    pub async fn delete_api_key(&self, id: ApiKeyId) -> Result<(), ClientError> {
        self.send_empty(Method::DELETE, &format!("/api/admin/keys/{}", id))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Portal
    // ─────────────────────────────────────────────────────────────────────────

    /// Methods a client may pick, in display order.
    pub async fn portal_methods(&self) -> Result<Vec<PaymentMethod>, ClientError> {
        self.get("/api/portal/payment-methods").await
    }

    pub async fn portal_quote(
        &self,
        booking_id: BookingId,
        req: &QuoteRequest,
    ) -> Result<QuoteResponse, ClientError> {
        self.send(
            Method::POST,
            &format!("/api/portal/bookings/{}/quote", booking_id),
            Some(req),
        )
        .await
    }

    pub async fn portal_create_payment(
        &self,
        booking_id: BookingId,
        req: &CreatePaymentRequest,
    ) -> Result<Payment, ClientError> {
        self.send(
            Method::POST,
            &format!("/api/portal/bookings/{}/payments", booking_id),
            Some(req),
        )
        .await
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, ClientError> {
        self.get(&format!("/api/portal/payments/{}", id)).await
    }

    pub async fn attach_proof(
        &self,
        id: PaymentId,
        proof_url: &str,
    ) -> Result<Payment, ClientError> {
        let req = AttachProofRequest {
            proof_url: proof_url.to_string(),
        };
        self.send(
            Method::POST,
            &format!("/api/portal/payments/{}/proof", id),
            Some(&req),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payment methods & rates
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn admin_methods(
        &self,
        include_disabled: bool,
    ) -> Result<Vec<PaymentMethod>, ClientError> {
        self.get_with_query("/api/admin/payment-methods", &MethodListQuery { include_disabled })
            .await
    }

    pub async fn update_method(
        &self,
        method_type: MethodType,
        update: &MethodUpdate,
    ) -> Result<PaymentMethod, ClientError> {
        self.send(
            Method::PATCH,
            &format!("/api/admin/payment-methods/{}", method_type),
            Some(update),
        )
        .await
    }

    pub async fn list_rates(&self, query: &RateQuery) -> Result<Vec<ConversionRate>, ClientError> {
        self.get_with_query("/api/admin/conversion-rates", query).await
    }

    pub async fn add_rate(&self, req: &CreateRateRequest) -> Result<ConversionRate, ClientError> {
        self.send(Method::POST, "/api/admin/conversion-rates", Some(req))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bookings & payments
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn upsert_booking(
        &self,
        id: BookingId,
        req: &UpsertBookingRequest,
    ) -> Result<Booking, ClientError> {
        self.send(Method::PUT, &format!("/api/admin/bookings/{}", id), Some(req))
            .await
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, ClientError> {
        self.get(&format!("/api/admin/bookings/{}", id)).await
    }

    /// Amount preview with admin-only methods available.
    pub async fn admin_quote(
        &self,
        booking_id: BookingId,
        req: &QuoteRequest,
    ) -> Result<QuoteResponse, ClientError> {
        self.send(
            Method::POST,
            &format!("/api/admin/bookings/{}/quote", booking_id),
            Some(req),
        )
        .await
    }

    pub async fn admin_create_payment(
        &self,
        booking_id: BookingId,
        req: &CreatePaymentRequest,
    ) -> Result<Payment, ClientError> {
        self.send(
            Method::POST,
            &format!("/api/admin/bookings/{}/payments", booking_id),
            Some(req),
        )
        .await
    }

    pub async fn list_payments(&self, booking_id: BookingId) -> Result<Vec<Payment>, ClientError> {
        self.get(&format!("/api/admin/bookings/{}/payments", booking_id))
            .await
    }

    pub async fn cancel_payment(&self, id: PaymentId) -> Result<Payment, ClientError> {
        self.send::<_, ()>(Method::POST, &format!("/api/admin/payments/{}/cancel", id), None)
            .await
    }

    pub async fn mark_paid(
        &self,
        id: PaymentId,
        req: &MarkPaidRequest,
    ) -> Result<Payment, ClientError> {
        self.send(
            Method::POST,
            &format!("/api/admin/payments/{}/mark-paid", id),
            Some(req),
        )
        .await
    }

    pub async fn sync_payment(&self, id: PaymentId) -> Result<PaymentSyncResponse, ClientError> {
        self.send::<_, ()>(Method::POST, &format!("/api/admin/payments/{}/sync", id), None)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Security deposits
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn authorize_deposit(
        &self,
        booking_id: BookingId,
        req: &AuthorizeDepositRequest,
    ) -> Result<DepositAuthorizationResponse, ClientError> {
        self.send(
            Method::POST,
            &format!("/api/admin/bookings/{}/security-deposit", booking_id),
            Some(req),
        )
        .await
    }

    pub async fn get_deposit(
        &self,
        booking_id: BookingId,
    ) -> Result<SecurityDepositOverview, ClientError> {
        self.get(&format!("/api/admin/bookings/{}/security-deposit", booking_id))
            .await
    }

    pub async fn sync_deposit(
        &self,
        booking_id: BookingId,
    ) -> Result<DepositSyncResponse, ClientError> {
        self.send::<_, ()>(
            Method::POST,
            &format!("/api/admin/bookings/{}/security-deposit/sync", booking_id),
            None,
        )
        .await
    }

    pub async fn capture_deposit(
        &self,
        id: AuthorizationId,
        amount: i64,
        reason: &str,
    ) -> Result<SecurityDepositAuthorization, ClientError> {
        let req = CaptureDepositRequest {
            amount,
            reason: reason.to_string(),
        };
        self.send(
            Method::POST,
            &format!("/api/admin/security-deposits/{}/capture", id),
            Some(&req),
        )
        .await
    }

    pub async fn release_deposit(
        &self,
        id: AuthorizationId,
    ) -> Result<SecurityDepositAuthorization, ClientError> {
        self.send::<_, ()>(
            Method::POST,
            &format!("/api/admin/security-deposits/{}/release", id),
            None,
        )
        .await
    }

    pub async fn list_gateway_events(
        &self,
        query: &WebhookEventQuery,
    ) -> Result<Vec<WebhookEvent>, ClientError> {
        self.get_with_query("/api/admin/gateway-events", query).await
    }

    /// Completes a checkout on a server running the sandbox gateway.
    pub async fn sandbox_complete(&self, session_id: &str) -> Result<Payment, ClientError> {
        self.send::<_, ()>(
            Method::POST,
            &format!("/api/admin/sandbox/checkouts/{}/complete", session_id),
            None,
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.request(Method::GET, path).send().await?;
        self.handle_response(resp).await
    }

    async fn get_with_query<T: DeserializeOwned, Q: Serialize>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ClientError> {
        let resp = self.request(Method::GET, path).query(query).send().await?;
        self.handle_response(resp).await
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    async fn send_empty(&self, method: Method, path: &str) -> Result<(), ClientError> {
        let resp = self.request(method, path).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(api_error(status.as_u16(), body))
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(api_error(status.as_u16(), body))
        }
    }
}

/// Builds an API error from a non-2xx body, preferring its `error` field.
fn api_error(status: u16, body: String) -> ClientError {
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body);
    ClientError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RentpayClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = RentpayClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_api_key() {
        let client = RentpayClient::new("http://localhost:3000").with_api_key("test-key");
        assert_eq!(client.api_key, Some("test-key".to_string()));
    }

    #[test]
    fn test_api_key_sent_as_bearer() {
        let client = RentpayClient::new("http://localhost:3000").with_api_key("sk_1");
        let req = client
            .request(Method::GET, "/api/admin/keys")
            .build()
            .unwrap();
        assert_eq!(req.url().as_str(), "http://localhost:3000/api/admin/keys");
        assert_eq!(req.headers()["authorization"], "Bearer sk_1");
    }

    #[test]
    fn test_api_error_prefers_error_field() {
        let err = api_error(409, r#"{"error":"Payment already paid","code":409}"#.into());
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.to_string(), "API error: 409 - Payment already paid");

        let err = api_error(502, "upstream down".into());
        assert_eq!(err.to_string(), "API error: 502 - upstream down");
    }
}
