//! Rate limiting middleware using Governor.
//!
//! Token bucket per API key; anonymous portal traffic is bucketed by the
//! forwarded client address.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde_json::json;
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Rate limiter state shared across requests.
pub struct RateLimiterState {
    /// Per-key rate limiters
    limiters: DashMap<String, Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    quota: Quota,
    period: Duration,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl RateLimiterState {
    /// Allows `requests` per `period`, all of them usable in one burst.
    /// A zero quota is treated as one request.
    pub fn new(requests: u32, period: Duration) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period / burst.get())
            .unwrap_or_else(|| Quota::per_minute(burst))
            .allow_burst(burst);

        Self {
            limiters: DashMap::new(),
            quota,
            period,
        }
    }

    /// Returns true if the request is allowed, false if rate limited.
    pub fn check(&self, key: &str) -> bool {
        let limiter = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();

        limiter.check().is_ok()
    }
}

fn exempt(path: &str) -> bool {
    path == "/health" || path.starts_with("/api/webhooks/")
}

fn bucket_key(request: &Request<Body>) -> String {
    let headers = request.headers();
    if let Some(auth) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        return auth.trim_start_matches("Bearer ").to_string();
    }
    headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let key = bucket_key(&request);
    if !limiter.check(&key) {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded. Please try again later.",
                "code": 429,
                "retry_after_seconds": limiter.period.as_secs()
            })),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_limited_independently() {
        let limiter = RateLimiterState::new(2, Duration::from_secs(60));
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }

    #[test]
    fn test_zero_quota_allows_one() {
        let limiter = RateLimiterState::new(0, Duration::from_secs(60));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
    }

    #[test]
    fn test_bucket_key_prefers_api_key() {
        let request = Request::builder()
            .header("Authorization", "Bearer sk_1")
            .header("X-Forwarded-For", "10.0.0.1, 10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bucket_key(&request), "sk_1");

        let request = Request::builder()
            .header("X-Forwarded-For", "10.0.0.1, 10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bucket_key(&request), "ip:10.0.0.1");
    }
}
