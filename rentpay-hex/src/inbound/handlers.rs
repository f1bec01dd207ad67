//! HTTP request handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use rentpay_types::{
    ApiKeyId, AppError, AttachProofRequest, AuthorizationId, AuthorizeDepositRequest, BookingId,
    Caller, CaptureDepositRequest, CreatePaymentRequest, CreateRateRequest, MarkPaidRequest,
    MethodType, MethodUpdate, PaymentId, PaymentRepository, QuoteRequest, RateQuery,
    UpsertBookingRequest, WebhookEventQuery,
};

use crate::PaymentService;
use crate::outbound::SandboxGateway;

/// Header carrying the hex HMAC-SHA256 of an inbound webhook body.
pub const SIGNATURE_HEADER: &str = "X-Gateway-Signature";

/// Application state shared across handlers.
pub struct AppState<R: PaymentRepository> {
    pub service: PaymentService<R>,
    /// Set when the sandbox gateway is in use; enables `/sandbox` routes.
    pub sandbox: Option<Arc<SandboxGateway>>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict {
                message,
                current,
                requested,
            } => {
                let body = serde_json::json!({
                    "error": message,
                    "code": StatusCode::CONFLICT.as_u16(),
                    "current": current,
                    "requested": requested,
                });
                return (StatusCode::CONFLICT, Json(body)).into_response();
            }
            AppError::Gateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn parse_path<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", what, raw)).into())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Portal (client-facing, no API key)
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state))]
pub async fn portal_list_methods<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let methods = state.service.list_methods(false).await?;
    Ok(Json(methods))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id))]
pub async fn portal_quote<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<QuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let quote = state.service.quote(booking_id, req, Caller::Client).await?;
    Ok(Json(quote))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id))]
pub async fn portal_create_payment<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let payment = state
        .service
        .create_payment(booking_id, req, Caller::Client)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn get_payment<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = parse_path(&id, "payment ID")?;
    let payment = state.service.get_payment(payment_id).await?;
    Ok(Json(payment))
}

#[tracing::instrument(skip(state, req), fields(payment_id = %id))]
pub async fn attach_proof<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<AttachProofRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = parse_path(&id, "payment ID")?;
    let payment = state.service.attach_proof(payment_id, req).await?;
    Ok(Json(payment))
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway webhooks
// ─────────────────────────────────────────────────────────────────────────────

/// Inbound gateway webhook. The raw body is needed for the signature.
#[tracing::instrument(skip(state, headers, body))]
pub async fn gateway_webhook<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let ack = state.service.handle_webhook(&body, signature).await?;
    Ok(Json(ack))
}

#[tracing::instrument(skip(state))]
pub async fn list_gateway_events<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<WebhookEventQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let events = state.service.list_gateway_events(query).await?;
    Ok(Json(events))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment methods & conversion rates (admin)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct MethodListQuery {
    #[serde(default)]
    pub include_disabled: bool,
}

#[tracing::instrument(skip(state))]
pub async fn admin_list_methods<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<MethodListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let methods = if query.include_disabled {
        state.service.list_all_methods().await?
    } else {
        state.service.list_methods(true).await?
    };
    Ok(Json(methods))
}

#[tracing::instrument(skip(state, update), fields(method = %method))]
pub async fn update_method<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(method): Path<String>,
    Json(update): Json<MethodUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let method_type: MethodType = parse_path(&method, "payment method")?;
    let method = state.service.update_method(method_type, update).await?;
    Ok(Json(method))
}

#[tracing::instrument(skip(state))]
pub async fn list_rates<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<RateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rates = state.service.list_rates(query).await?;
    Ok(Json(rates))
}

#[tracing::instrument(skip(state, req))]
pub async fn add_rate<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateRateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let rate = state.service.add_rate(req).await?;
    Ok((StatusCode::CREATED, Json(rate)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Bookings & payments (admin)
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(booking_id = %id))]
pub async fn upsert_booking<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<UpsertBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let booking = state.service.upsert_booking(booking_id, req).await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state), fields(booking_id = %id))]
pub async fn get_booking<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let booking = state.service.get_booking(booking_id).await?;
    Ok(Json(booking))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id))]
pub async fn admin_quote<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<QuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let quote = state.service.quote(booking_id, req, Caller::Admin).await?;
    Ok(Json(quote))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id))]
pub async fn admin_create_payment<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let payment = state
        .service
        .create_payment(booking_id, req, Caller::Admin)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[tracing::instrument(skip(state), fields(booking_id = %id))]
pub async fn list_payments<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let payments = state.service.list_payments(booking_id).await?;
    Ok(Json(payments))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn cancel_payment<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = parse_path(&id, "payment ID")?;
    let payment = state.service.cancel_payment(payment_id).await?;
    Ok(Json(payment))
}

#[tracing::instrument(skip(state, req), fields(payment_id = %id))]
pub async fn mark_paid<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    req: Option<Json<MarkPaidRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = parse_path(&id, "payment ID")?;
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let payment = state.service.mark_paid(payment_id, req).await?;
    Ok(Json(payment))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn sync_payment<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = parse_path(&id, "payment ID")?;
    let synced = state.service.sync_payment(payment_id).await?;
    Ok(Json(synced))
}

// ─────────────────────────────────────────────────────────────────────────────
// Security deposits (admin)
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(booking_id = %id))]
pub async fn authorize_deposit<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<AuthorizeDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let created = state.service.authorize_deposit(booking_id, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(skip(state), fields(booking_id = %id))]
pub async fn get_deposit<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let overview = state.service.get_deposit(booking_id).await?;
    Ok(Json(overview))
}

#[tracing::instrument(skip(state), fields(booking_id = %id))]
pub async fn sync_deposit<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = parse_path(&id, "booking ID")?;
    let synced = state.service.sync_deposit(booking_id).await?;
    Ok(Json(synced))
}

#[tracing::instrument(skip(state, req), fields(authorization_id = %id))]
pub async fn capture_deposit<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<CaptureDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let authorization_id: AuthorizationId = parse_path(&id, "security deposit ID")?;
    let authorization = state.service.capture_deposit(authorization_id, req).await?;
    Ok(Json(authorization))
}

#[tracing::instrument(skip(state), fields(authorization_id = %id))]
pub async fn release_deposit<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let authorization_id: AuthorizationId = parse_path(&id, "security deposit ID")?;
    let authorization = state.service.release_deposit(authorization_id).await?;
    Ok(Json(authorization))
}

// ─────────────────────────────────────────────────────────────────────────────
// Sandbox checkout (admin, local runs only)
// ─────────────────────────────────────────────────────────────────────────────

fn sandbox<R: PaymentRepository>(state: &AppState<R>) -> Result<&SandboxGateway, ApiError> {
    state
        .sandbox
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Sandbox gateway is not enabled".into()).into())
}

/// Plays the payer completing a sandbox checkout and delivers the resulting
/// gateway event, as the real gateway's webhook would.
#[tracing::instrument(skip(state), fields(session_id = %session_id))]
pub async fn sandbox_complete<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event = sandbox(&state)?
        .complete(&session_id)
        .map_err(AppError::from)?;
    let outcome = state.service.apply_event(&event).await?;
    Ok(Json(outcome.payment().clone()))
}

#[tracing::instrument(skip(state), fields(session_id = %session_id))]
pub async fn sandbox_fail<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event = sandbox(&state)?
        .fail(&session_id)
        .map_err(AppError::from)?;
    let outcome = state.service.apply_event(&event).await?;
    Ok(Json(outcome.payment().clone()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Bootstrap & API Key Management
// ─────────────────────────────────────────────────────────────────────────────

/// Bootstrap endpoint - creates the first API key.
///
/// This endpoint only works when there are NO existing API keys in the system.
/// It returns the raw API key (only shown once) that should be saved securely.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct BootstrapRequest {
    /// Name for the API key
    #[schema(example = "back-office")]
    pub name: String,
}

#[derive(serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct BootstrapResponse {
    /// The generated API key (shown only once)
    #[schema(example = "sk_abc123xyz...")]
    pub api_key: String,
    /// Informational message
    pub message: String,
}

#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn bootstrap<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<BootstrapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key_count = state.service.repo().count_api_keys().await.map_err(AppError::from)?;

    if key_count > 0 {
        return Err(AppError::BadRequest(
            "Bootstrap not allowed: API keys already exist. \
             Use an existing key to create new ones."
                .into(),
        )
        .into());
    }

    let (_api_key, raw_key) = state
        .service
        .repo()
        .create_api_key(&req.name)
        .await
        .map_err(AppError::from)?;

    tracing::info!("First admin API key created");
    Ok((
        StatusCode::CREATED,
        Json(BootstrapResponse {
            api_key: raw_key,
            message: "First API key created. Save this key securely - it won't be shown again!"
                .into(),
        }),
    ))
}

/// Request to create a new API key.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct CreateApiKeyRequest {
    /// Name for the API key
    #[schema(example = "booking-sync")]
    pub name: String,
}

/// Response containing API key info (without the raw key).
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ApiKeyInfo {
    pub id: ApiKeyId,
    pub name: String,
    pub is_active: bool,
    /// When the key was created (ISO 8601)
    #[schema(value_type = String, example = "2026-01-01T00:00:00Z")]
    pub created_at: String,
    #[schema(value_type = Option<String>)]
    pub last_used_at: Option<String>,
}

#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn create_api_key<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (_api_key, raw_key) = state
        .service
        .repo()
        .create_api_key(&req.name)
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(BootstrapResponse {
            api_key: raw_key,
            message: "API key created. Save this key securely - it won't be shown again!".into(),
        }),
    ))
}

/// List all active API keys (without exposing raw keys).
#[tracing::instrument(skip(state))]
pub async fn list_api_keys<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let keys = state
        .service
        .repo()
        .list_api_keys()
        .await
        .map_err(AppError::from)?;

    let response: Vec<ApiKeyInfo> = keys
        .into_iter()
        .map(|k| ApiKeyInfo {
            id: k.id,
            name: k.name,
            is_active: k.is_active,
            created_at: k.created_at.to_rfc3339(),
            last_used_at: k.last_used_at.map(|dt| dt.to_rfc3339()),
        })
        .collect();

    Ok(Json(response))
}

/// Delete (deactivate) an API key.
#[tracing::instrument(skip(state), fields(key_id = %id))]
pub async fn delete_api_key<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ApiKeyId = parse_path(&id, "API key ID")?;

    let deleted = state
        .service
        .repo()
        .delete_api_key(key_id)
        .await
        .map_err(AppError::from)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(AppError::NotFound("API key not found".into()).into())
    }
}
