//! # Rentpay Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Pick the card gateway (hosted checkout or sandbox)
//! - Create the payment service
//! - Start the HTTP server

mod config;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    metrics::SdkMeterProvider, propagation::TraceContextPropagator, trace as sdktrace,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::GatewayConfig;
use rentpay_hex::{HttpGateway, PaymentService, SandboxGateway, inbound::HttpServer};
use rentpay_repo::build_repo;
use rentpay_types::PaymentGateway;

struct Telemetry {
    tracer: sdktrace::Tracer,
    tracer_provider: sdktrace::SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

fn init_telemetry(endpoint: &str) -> anyhow::Result<Telemetry> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let tracer_provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    // HTTP metrics from the router are recorded against the global provider
    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .build();
    global::set_meter_provider(meter_provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok(Telemetry {
        tracer: tracer_provider.tracer("rentpay-service"),
        tracer_provider,
        meter_provider,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize OpenTelemetry when a collector is configured
    let telemetry = config
        .otlp_endpoint
        .as_deref()
        .map(init_telemetry)
        .transpose()?;
    let otel_layer = telemetry
        .as_ref()
        .map(|t| tracing_opentelemetry::layer().with_tracer(t.tracer.clone()));

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rentpay_app=debug,rentpay_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    tracing::info!("Starting rentpay server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build repository (handles connection, migration and method seeding)
    let repo = build_repo(&config.database_url).await?;

    // Pick the card gateway
    let (gateway, sandbox): (Arc<dyn PaymentGateway>, Option<Arc<SandboxGateway>>) =
        match &config.gateway {
            GatewayConfig::Hosted { base_url, api_key } => {
                tracing::info!(gateway = %base_url, "Using hosted-checkout gateway");
                let http = HttpGateway::new(base_url.as_str(), api_key.as_str())?;
                (Arc::new(http) as Arc<dyn PaymentGateway>, None)
            }
            GatewayConfig::Sandbox => {
                tracing::warn!("GATEWAY_SANDBOX enabled, card payments use the sandbox gateway");
                let sandbox = Arc::new(SandboxGateway::new(
                    config.settings.portal_base_url.as_str(),
                ));
                (sandbox.clone() as Arc<dyn PaymentGateway>, Some(sandbox))
            }
        };

    if config.settings.webhook_secret.is_none() {
        tracing::warn!("GATEWAY_WEBHOOK_SECRET not set, inbound webhooks are not authenticated");
    }

    // Create the payment service
    let service = PaymentService::new(repo, gateway, config.settings);

    // Create and run the HTTP server
    let mut server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    if let Some(sandbox) = sandbox {
        server = server.with_sandbox(sandbox);
    }
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces and metrics are flushed before exit
    if let Some(telemetry) = telemetry {
        let _ = telemetry.tracer_provider.shutdown();
        let _ = telemetry.meter_provider.shutdown();
    }
    Ok(())
}
