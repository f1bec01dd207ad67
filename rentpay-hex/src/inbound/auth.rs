//! Authentication middleware for admin API keys.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use rentpay_types::PaymentRepository;

use super::handlers::AppState;

/// Routes behind an API key, sandbox checkout controls included. Portal,
/// webhook, docs and health routes are public.
const ADMIN_PREFIX: &str = "/api/admin";

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header))
}

fn requires_api_key(path: &str) -> bool {
    path == ADMIN_PREFIX || path.starts_with("/api/admin/")
}

/// Authentication middleware that validates API keys on admin routes.
///
/// The key is hashed with SHA-256 and looked up among active keys; a miss
/// is a 401.
pub async fn auth_middleware<R: PaymentRepository>(
    State(state): State<Arc<AppState<R>>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !requires_api_key(request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    let key_hash = rentpay_repo::security::hash_api_key(api_key);

    match state.service.repo().verify_api_key_hash(&key_hash).await {
        Ok(Some(key)) => {
            tracing::debug!(key_name = %key.name, "Admin request authenticated");
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid API key"),
        Err(e) => {
            tracing::error!("API key verification failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "code": 500
                })),
            )
                .into_response()
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_bearer() {
        assert_eq!(
            extract_api_key(Some("Bearer sk_test_123")),
            Some("sk_test_123")
        );
    }

    #[test]
    fn test_extract_api_key_raw() {
        assert_eq!(extract_api_key(Some("sk_test_123")), Some("sk_test_123"));
    }

    #[test]
    fn test_extract_api_key_none() {
        assert_eq!(extract_api_key(None), None);
    }

    #[test]
    fn test_only_admin_routes_need_a_key() {
        assert!(requires_api_key("/api/admin/payment-methods"));
        assert!(requires_api_key("/api/admin"));
        assert!(!requires_api_key("/api/administrator"));
        assert!(!requires_api_key("/api/portal/payment-methods"));
        assert!(!requires_api_key("/api/webhooks/gateway"));
        assert!(!requires_api_key("/health"));
    }
}
