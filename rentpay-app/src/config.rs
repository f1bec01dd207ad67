//! Configuration loading from environment.

use std::env;

use rentpay_hex::ServiceSettings;

/// Card gateway the server talks to.
#[derive(Debug, PartialEq, Eq)]
pub enum GatewayConfig {
    Hosted { base_url: String, api_key: String },
    /// In-process sandbox, only ever chosen explicitly
    Sandbox,
}

impl GatewayConfig {
    /// A hosted gateway when `base_url` is set. Otherwise the sandbox, if
    /// `sandbox` opts in to it.
    fn resolve(
        base_url: Option<String>,
        api_key: String,
        sandbox: bool,
    ) -> anyhow::Result<Self> {
        match (base_url, sandbox) {
            (Some(_), true) => {
                anyhow::bail!("GATEWAY_BASE_URL and GATEWAY_SANDBOX=true are mutually exclusive")
            }
            (Some(base_url), false) => Ok(Self::Hosted { base_url, api_key }),
            (None, true) => Ok(Self::Sandbox),
            (None, false) => anyhow::bail!(
                "No card gateway configured: set GATEWAY_BASE_URL, \
                 or GATEWAY_SANDBOX=true for local runs"
            ),
        }
    }
}

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub gateway: GatewayConfig,
    pub rate_limit_per_minute: u32,
    /// Collector endpoint; OpenTelemetry export is off when unset
    pub otlp_endpoint: Option<String>,
    pub settings: ServiceSettings,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid ({}): {}", name, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = parsed("PORT", 3000)?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let defaults = ServiceSettings::default();
        let link_ttl_hours = parsed("PAYMENT_LINK_TTL_HOURS", defaults.link_ttl_hours)?;
        if link_ttl_hours < 1 {
            anyhow::bail!("PAYMENT_LINK_TTL_HOURS must be at least 1, got {}", link_ttl_hours);
        }

        let settings = ServiceSettings {
            portal_base_url: optional("PORTAL_BASE_URL")
                .unwrap_or(defaults.portal_base_url)
                .trim_end_matches('/')
                .to_string(),
            link_ttl_hours,
            bank_beneficiary: optional("BANK_TRANSFER_BENEFICIARY")
                .unwrap_or(defaults.bank_beneficiary),
            bank_iban: optional("BANK_TRANSFER_IBAN").unwrap_or(defaults.bank_iban),
            webhook_secret: optional("GATEWAY_WEBHOOK_SECRET"),
            listener_id: optional("GATEWAY_LISTENER_ID"),
        };

        Ok(Self {
            port,
            database_url,
            gateway: GatewayConfig::resolve(
                optional("GATEWAY_BASE_URL"),
                env::var("GATEWAY_API_KEY").unwrap_or_default(),
                parsed("GATEWAY_SANDBOX", false)?,
            )?,
            rate_limit_per_minute: parsed("RATE_LIMIT_PER_MINUTE", 100)?,
            otlp_endpoint: optional("OTEL_EXPORTER_OTLP_ENDPOINT"),
            settings,
        })
    }
}
