//! Client example walking a rental booking through payment and deposit flows
//! against an in-process server backed by the sandbox gateway.
//!
//! Run with: cargo run -p rentpay-app --example client_example --no-default-features --features sqlite

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::tempdir;
use tokio::net::TcpListener;

use rentpay_client::RentpayClient;
use rentpay_hex::{PaymentService, SandboxGateway, ServiceSettings, inbound::HttpServer};
use rentpay_repo::build_repo;
use rentpay_types::{
    AuthorizeDepositRequest, BookingId, CreatePaymentRequest, CreateRateRequest, CurrencyCode,
    MarkPaidRequest, MethodType, PaymentIntent, QuoteRequest, UpsertBookingRequest,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Find an available port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let port = addr.port();
    drop(listener);
    let base_url = format!("http://127.0.0.1:{port}");

    let tmp = tempdir()?;
    let db_path = tmp.path().join("rentpay.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    println!("🚀 Starting server on port {port}...");
    println!("   Database: {db_url}");

    let repo = build_repo(&db_url).await?;
    let sandbox = Arc::new(SandboxGateway::new(base_url.as_str()));
    let settings = ServiceSettings {
        portal_base_url: base_url.clone(),
        ..ServiceSettings::default()
    };
    let service = PaymentService::new(repo, sandbox.clone(), settings);
    let router = HttpServer::new(service).with_sandbox(sandbox).router();

    let server_addr = format!("127.0.0.1:{port}");
    let server_listener = TcpListener::bind(&server_addr).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(server_listener, router.into_make_service()).await {
            eprintln!("server error: {e}");
        }
    });

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let client = RentpayClient::new(&base_url);
    println!("✓ Health: {}", client.health().await?);

    // ─────────────────────────────────────────────────────────────────────────
    // Back office setup
    // ─────────────────────────────────────────────────────────────────────────

    let api_key = client.bootstrap("back-office").await?;
    let admin = RentpayClient::new(&base_url).with_api_key(api_key);
    println!("✓ Bootstrapped admin key");

    let rate = admin
        .add_rate(&CreateRateRequest {
            from_currency: CurrencyCode::EUR,
            to_currency: CurrencyCode::CHF,
            rate: Decimal::from_str("0.95")?,
            effective_date: None,
            source: Some("manual".into()),
        })
        .await?;
    println!("✓ Rate EUR→CHF {}", rate.rate);

    let booking_id = BookingId::new();
    let booking = admin
        .upsert_booking(
            booking_id,
            &UpsertBookingRequest {
                amount_total: 120_000,
                currency: CurrencyCode::EUR,
                security_deposit_amount: 50_000,
                payment_amount_percent: Decimal::from(30),
            },
        )
        .await?;
    println!(
        "✓ Booking {} total {} {}",
        booking.id, booking.amount_total, booking.currency
    );

    // ─────────────────────────────────────────────────────────────────────────
    // Client pays the initial share by card through the portal
    // ─────────────────────────────────────────────────────────────────────────

    let methods = client.portal_methods().await?;
    println!("✓ Portal offers {} methods", methods.len());

    let quote = client
        .portal_quote(
            booking_id,
            &QuoteRequest {
                payment_intent: PaymentIntent::ClientPayment,
                method_type: MethodType::VisaMastercard,
                amount_override: None,
            },
        )
        .await?;
    println!(
        "✓ Quote: base {} + fee {} = {} {}, charged {:?} {}",
        quote.base_amount,
        quote.fee_amount,
        quote.total_amount,
        quote.currency,
        quote.converted_amount,
        quote.final_currency
    );

    let card = client
        .portal_create_payment(
            booking_id,
            &CreatePaymentRequest {
                payment_intent: PaymentIntent::ClientPayment,
                method_type: MethodType::VisaMastercard,
                amount_override: None,
                expires_in_hours: None,
            },
        )
        .await?;
    println!("✓ Payment link {:?}", card.payment_link_url);

    let session_id = card
        .gateway_session_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("card payment has no checkout session"))?;
    let paid = admin.sandbox_complete(&session_id).await?;
    println!("✓ Checkout completed, link is {:?}", paid.payment_link_status);

    let booking = admin.get_booking(booking_id).await?;
    println!("✓ Amount paid so far: {} {}", booking.amount_paid, booking.currency);

    // ─────────────────────────────────────────────────────────────────────────
    // Security deposit: hold, then capture damages
    // ─────────────────────────────────────────────────────────────────────────

    let hold = admin
        .authorize_deposit(
            booking_id,
            &AuthorizeDepositRequest {
                amount: None,
                method_type: MethodType::VisaMastercard,
                expires_in_hours: 168,
            },
        )
        .await?;
    println!(
        "✓ Deposit hold requested: {} ({:?})",
        hold.authorization.amount, hold.authorization.status
    );

    if let Some(session_id) = hold.payment.gateway_session_id.as_deref() {
        admin.sandbox_complete(session_id).await?;
    }
    let overview = admin.get_deposit(booking_id).await?;
    let current = overview
        .current
        .ok_or_else(|| anyhow::anyhow!("no current deposit hold"))?;
    println!("✓ Deposit is {:?}", current.status);

    let captured = admin
        .capture_deposit(current.id, 8_000, "Scratch on rear bumper")
        .await?;
    println!(
        "✓ Captured {} of {}",
        captured.captured_amount.unwrap_or_default(),
        captured.amount
    );

    // ─────────────────────────────────────────────────────────────────────────
    // Balance by bank transfer with proof, confirmed by the back office
    // ─────────────────────────────────────────────────────────────────────────

    let transfer = admin
        .admin_create_payment(
            booking_id,
            &CreatePaymentRequest {
                payment_intent: PaymentIntent::BalancePayment,
                method_type: MethodType::BankTransfer,
                amount_override: None,
                expires_in_hours: Some(72),
            },
        )
        .await?;
    println!("✓ Bank transfer link for {} {}", transfer.total_amount, transfer.currency);

    client
        .attach_proof(transfer.id, "https://files.example.com/receipt.pdf")
        .await?;
    let settled = admin
        .mark_paid(transfer.id, &MarkPaidRequest { paid_at: None })
        .await?;
    println!("✓ Transfer confirmed: {:?}", settled.payment_link_status);

    let booking = admin.get_booking(booking_id).await?;
    println!(
        "✓ Booking {} paid {} of {} {}",
        booking.id, booking.amount_paid, booking.amount_total, booking.currency
    );

    let payments = admin.list_payments(booking_id).await?;
    println!("✓ {} payments on record", payments.len());

    println!("\n🎉 Demo complete");
    Ok(())
}
