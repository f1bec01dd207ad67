//! Rentpay CLI
//!
//! Command-line interface for the rental payment API.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;

use rentpay_client::RentpayClient;
use rentpay_types::{
    ApiKeyId, AuthorizationId, AuthorizeDepositRequest, BookingId, CreatePaymentRequest,
    CreateRateRequest, CurrencyCode, MarkPaidRequest, MethodType, MethodUpdate, PaymentId,
    PaymentIntent, QuoteRequest, RateQuery, UpsertBookingRequest, WebhookEventQuery,
    WebhookStatus,
};

#[derive(Parser)]
#[command(name = "rentpay")]
#[command(author, version, about = "Rental payment API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the rental payment API
    #[arg(long, env = "RENTPAY_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key for admin commands
    #[arg(long, env = "RENTPAY_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Payment method registry
    Method {
        #[command(subcommand)]
        action: MethodCommands,
    },
    /// Conversion rate table
    Rate {
        #[command(subcommand)]
        action: RateCommands,
    },
    /// Booking mirror
    Booking {
        #[command(subcommand)]
        action: BookingCommands,
    },
    /// Payment links
    Payment {
        #[command(subcommand)]
        action: PaymentCommands,
    },
    /// Security deposit holds
    Deposit {
        #[command(subcommand)]
        action: DepositCommands,
    },
    /// Journaled gateway webhooks
    Events {
        #[arg(long)]
        status: Option<WebhookStatus>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Complete a checkout on a server started with GATEWAY_SANDBOX=true (admin key)
    SandboxComplete {
        session_id: String,
    },
    /// API key management
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Bootstrap the first API key
    Bootstrap {
        /// Name for the new API key
        #[arg(long, default_value = "bootstrap-key")]
        name: String,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum MethodCommands {
    /// List payment methods
    List {
        /// Only the methods a client sees in the portal
        #[arg(long)]
        portal: bool,
        /// Include disabled methods
        #[arg(long, conflicts_with = "portal")]
        all: bool,
    },
    /// Change a method's fee or availability
    Update {
        /// visa_mastercard, amex, bank_transfer or manual
        method: MethodType,
        /// Fee percentage, e.g. 2.9
        #[arg(long)]
        fee: Option<Decimal>,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
}

#[derive(Subcommand)]
enum RateCommands {
    /// List conversion rates, newest first
    List {
        #[arg(long)]
        from: Option<CurrencyCode>,
        #[arg(long)]
        to: Option<CurrencyCode>,
    },
    /// Record a conversion rate
    Add {
        #[arg(long)]
        from: CurrencyCode,
        #[arg(long)]
        to: CurrencyCode,
        #[arg(long)]
        rate: Decimal,
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        effective_date: Option<DateTime<Utc>>,
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Subcommand)]
enum BookingCommands {
    /// Create or refresh a booking mirror
    Upsert {
        id: BookingId,
        /// Total rental price in minor units
        #[arg(long)]
        total: i64,
        #[arg(long)]
        currency: CurrencyCode,
        /// Security deposit in minor units
        #[arg(long, default_value_t = 0)]
        deposit: i64,
        /// Share of the total due as the initial client payment
        #[arg(long, default_value = "100")]
        percent: Decimal,
    },
    /// Show a booking
    Get { id: BookingId },
}

#[derive(Subcommand)]
enum PaymentCommands {
    /// Preview fee and conversion
    Quote {
        booking: BookingId,
        #[arg(long, default_value = "client_payment")]
        intent: PaymentIntent,
        #[arg(long)]
        method: MethodType,
        /// Amount override in minor units
        #[arg(long)]
        amount: Option<i64>,
        /// Quote as the client portal would
        #[arg(long)]
        portal: bool,
    },
    /// Create a payment link
    Create {
        booking: BookingId,
        #[arg(long, default_value = "client_payment")]
        intent: PaymentIntent,
        #[arg(long)]
        method: MethodType,
        /// Amount override in minor units
        #[arg(long)]
        amount: Option<i64>,
        /// Link lifetime in hours
        #[arg(long)]
        expires_in_hours: Option<i64>,
        /// Create through the client portal
        #[arg(long)]
        portal: bool,
    },
    /// Show a payment
    Get { id: PaymentId },
    /// List a booking's payments
    List { booking: BookingId },
    /// Attach the bank-transfer proof URL
    Proof { id: PaymentId, url: String },
    /// Cancel an active link
    Cancel { id: PaymentId },
    /// Confirm a bank transfer or manual payment
    MarkPaid {
        id: PaymentId,
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        paid_at: Option<DateTime<Utc>>,
    },
    /// Converge with the gateway
    Sync { id: PaymentId },
}

#[derive(Subcommand)]
enum DepositCommands {
    /// Request a card hold
    Authorize {
        booking: BookingId,
        /// Hold amount in minor units; defaults to the booking's deposit
        #[arg(long)]
        amount: Option<i64>,
        #[arg(long, default_value = "visa_mastercard")]
        method: MethodType,
        #[arg(long, default_value_t = 168)]
        expires_in_hours: i64,
    },
    /// Show the booking's current hold and history
    Get { booking: BookingId },
    /// Converge the booking's current hold with the gateway
    Sync { booking: BookingId },
    /// Charge part or all of a hold
    Capture {
        id: AuthorizationId,
        /// Amount in minor units of the booking currency
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        reason: String,
    },
    /// Release a hold
    Release { id: AuthorizationId },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a new API key
    Create {
        /// Name for the new key
        #[arg(long)]
        name: String,
    },
    /// List all API keys
    List,
    /// Delete (deactivate) an API key
    Delete {
        /// API key ID (UUID)
        #[arg(long)]
        id: ApiKeyId,
    },
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn enabled_flag(enable: bool, disable: bool) -> Option<bool> {
    match (enable, disable) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = RentpayClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Method { action } => match action {
            MethodCommands::List { portal, all } => {
                let methods = if portal {
                    client.portal_methods().await?
                } else {
                    client.admin_methods(all).await?
                };
                print(&methods)?;
            }
            MethodCommands::Update {
                method,
                fee,
                enable,
                disable,
            } => {
                let update = MethodUpdate {
                    fee_percentage: fee,
                    is_enabled: enabled_flag(enable, disable),
                };
                print(&client.update_method(method, &update).await?)?;
            }
        },

        Commands::Rate { action } => match action {
            RateCommands::List { from, to } => {
                print(&client.list_rates(&RateQuery { from, to }).await?)?;
            }
            RateCommands::Add {
                from,
                to,
                rate,
                effective_date,
                source,
            } => {
                let req = CreateRateRequest {
                    from_currency: from,
                    to_currency: to,
                    rate,
                    effective_date,
                    source,
                };
                print(&client.add_rate(&req).await?)?;
            }
        },

        Commands::Booking { action } => match action {
            BookingCommands::Upsert {
                id,
                total,
                currency,
                deposit,
                percent,
            } => {
                let req = UpsertBookingRequest {
                    amount_total: total,
                    currency,
                    security_deposit_amount: deposit,
                    payment_amount_percent: percent,
                };
                print(&client.upsert_booking(id, &req).await?)?;
            }
            BookingCommands::Get { id } => print(&client.get_booking(id).await?)?,
        },

        Commands::Payment { action } => match action {
            PaymentCommands::Quote {
                booking,
                intent,
                method,
                amount,
                portal,
            } => {
                let req = QuoteRequest {
                    payment_intent: intent,
                    method_type: method,
                    amount_override: amount,
                };
                let quote = if portal {
                    client.portal_quote(booking, &req).await?
                } else {
                    client.admin_quote(booking, &req).await?
                };
                print(&quote)?;
            }
            PaymentCommands::Create {
                booking,
                intent,
                method,
                amount,
                expires_in_hours,
                portal,
            } => {
                let req = CreatePaymentRequest {
                    payment_intent: intent,
                    method_type: method,
                    amount_override: amount,
                    expires_in_hours,
                };
                let payment = if portal {
                    client.portal_create_payment(booking, &req).await?
                } else {
                    client.admin_create_payment(booking, &req).await?
                };
                print(&payment)?;
            }
            PaymentCommands::Get { id } => print(&client.get_payment(id).await?)?,
            PaymentCommands::List { booking } => print(&client.list_payments(booking).await?)?,
            PaymentCommands::Proof { id, url } => print(&client.attach_proof(id, &url).await?)?,
            PaymentCommands::Cancel { id } => print(&client.cancel_payment(id).await?)?,
            PaymentCommands::MarkPaid { id, paid_at } => {
                print(&client.mark_paid(id, &MarkPaidRequest { paid_at }).await?)?;
            }
            PaymentCommands::Sync { id } => print(&client.sync_payment(id).await?)?,
        },

        Commands::Deposit { action } => match action {
            DepositCommands::Authorize {
                booking,
                amount,
                method,
                expires_in_hours,
            } => {
                let req = AuthorizeDepositRequest {
                    amount,
                    method_type: method,
                    expires_in_hours,
                };
                print(&client.authorize_deposit(booking, &req).await?)?;
            }
            DepositCommands::Get { booking } => print(&client.get_deposit(booking).await?)?,
            DepositCommands::Sync { booking } => print(&client.sync_deposit(booking).await?)?,
            DepositCommands::Capture { id, amount, reason } => {
                print(&client.capture_deposit(id, amount, &reason).await?)?;
            }
            DepositCommands::Release { id } => print(&client.release_deposit(id).await?)?,
        },

        Commands::Events { status, limit } => {
            print(
                &client
                    .list_gateway_events(&WebhookEventQuery { status, limit })
                    .await?,
            )?;
        }

        Commands::SandboxComplete { session_id } => {
            print(&client.sandbox_complete(&session_id).await?)?;
        }

        Commands::Key { action } => match action {
            KeyCommands::Create { name } => {
                let created = client.create_api_key(&name).await?;
                println!("{}", created.api_key);
            }
            KeyCommands::List => print(&client.list_api_keys().await?)?,
            KeyCommands::Delete { id } => {
                client.delete_api_key(id).await?;
                println!("✓ API key deleted");
            }
        },

        Commands::Bootstrap { name } => {
            let api_key = client.bootstrap(&name).await?;
            println!("{}", api_key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_payment_create() {
        let booking = BookingId::new();
        let cli = Cli::try_parse_from([
            "rentpay",
            "payment",
            "create",
            &booking.to_string(),
            "--method",
            "bank_transfer",
            "--intent",
            "balance_payment",
        ])
        .unwrap();
        match cli.command {
            Commands::Payment {
                action:
                    PaymentCommands::Create {
                        booking: parsed,
                        intent,
                        method,
                        portal,
                        ..
                    },
            } => {
                assert_eq!(parsed, booking);
                assert_eq!(intent, PaymentIntent::BalancePayment);
                assert_eq!(method, MethodType::BankTransfer);
                assert!(!portal);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_rejects_unknown_method() {
        let result = Cli::try_parse_from([
            "rentpay",
            "method",
            "update",
            "paypal",
            "--fee",
            "1.5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_enabled_flag() {
        assert_eq!(enabled_flag(true, false), Some(true));
        assert_eq!(enabled_flag(false, true), Some(false));
        assert_eq!(enabled_flag(false, false), None);
    }
}
