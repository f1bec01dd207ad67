//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use rentpay_types::PaymentRepository;

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::PaymentService;
use crate::openapi::ApiDoc;
use crate::outbound::SandboxGateway;

/// HTTP Server for the rental payment API.
pub struct HttpServer<R: PaymentRepository> {
    state: Arc<AppState<R>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: PaymentRepository> HttpServer<R> {
    /// Creates a new HTTP server with the given service.
    pub fn new(service: PaymentService<R>) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                sandbox: None,
            }),
            rate_limiter: Arc::new(RateLimiterState::default()), // 100 req/min default
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(service: PaymentService<R>, requests_per_minute: u32) -> Self {
        use std::time::Duration;
        Self {
            state: Arc::new(AppState {
                service,
                sandbox: None,
            }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Serves the admin sandbox checkout routes against `sandbox`.
    pub fn with_sandbox(mut self, sandbox: Arc<SandboxGateway>) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.sandbox = Some(sandbox);
        }
        self
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        let portal = Router::new()
            .route(
                "/payment-methods",
                get(handlers::portal_list_methods::<R>),
            )
            .route("/bookings/{id}/quote", post(handlers::portal_quote::<R>))
            .route(
                "/bookings/{id}/payments",
                post(handlers::portal_create_payment::<R>),
            )
            .route("/payments/{id}", get(handlers::get_payment::<R>))
            .route("/payments/{id}/proof", post(handlers::attach_proof::<R>));

        let admin = Router::new()
            .route(
                "/payment-methods",
                get(handlers::admin_list_methods::<R>),
            )
            .route(
                "/payment-methods/{method}",
                axum::routing::patch(handlers::update_method::<R>),
            )
            .route(
                "/conversion-rates",
                get(handlers::list_rates::<R>).post(handlers::add_rate::<R>),
            )
            .route(
                "/bookings/{id}",
                get(handlers::get_booking::<R>).put(handlers::upsert_booking::<R>),
            )
            .route("/bookings/{id}/quote", post(handlers::admin_quote::<R>))
            .route(
                "/bookings/{id}/payments",
                get(handlers::list_payments::<R>).post(handlers::admin_create_payment::<R>),
            )
            .route(
                "/bookings/{id}/security-deposit",
                get(handlers::get_deposit::<R>).post(handlers::authorize_deposit::<R>),
            )
            .route(
                "/bookings/{id}/security-deposit/sync",
                post(handlers::sync_deposit::<R>),
            )
            .route("/payments/{id}", get(handlers::get_payment::<R>))
            .route("/payments/{id}/cancel", post(handlers::cancel_payment::<R>))
            .route("/payments/{id}/mark-paid", post(handlers::mark_paid::<R>))
            .route("/payments/{id}/sync", post(handlers::sync_payment::<R>))
            .route(
                "/security-deposits/{id}/capture",
                post(handlers::capture_deposit::<R>),
            )
            .route(
                "/security-deposits/{id}/release",
                post(handlers::release_deposit::<R>),
            )
            .route(
                "/gateway-events",
                get(handlers::list_gateway_events::<R>),
            )
            .route(
                "/keys",
                get(handlers::list_api_keys::<R>).post(handlers::create_api_key::<R>),
            )
            .route(
                "/keys/{id}",
                axum::routing::delete(handlers::delete_api_key::<R>),
            )
            .route(
                "/sandbox/checkouts/{session_id}/complete",
                post(handlers::sandbox_complete::<R>),
            )
            .route(
                "/sandbox/checkouts/{session_id}/fail",
                post(handlers::sandbox_fail::<R>),
            );

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
            .route("/api/bootstrap", post(handlers::bootstrap::<R>))
            .route("/api/webhooks/gateway", post(handlers::gateway_webhook::<R>))
            .nest("/api/portal", portal)
            .nest("/api/admin", admin)
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R>,
            ))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
