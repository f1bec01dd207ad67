//! Payment Application Service
//!
//! Orchestrates domain operations through the repository and gateway ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! The operations are split by component:
//! - `calculator` - fee and conversion quotes
//! - `registry` - payment methods, conversion rates, booking mirror
//! - `links` - payment link manager
//! - `deposits` - security deposit authorizer
//! - `reconciler` - gateway webhooks and event application

use std::sync::Arc;

use rentpay_types::{PaymentGateway, PaymentRepository};

mod calculator;
mod deposits;
pub mod flows;
mod links;
mod reconciler;
mod registry;

/// Deployment-specific knobs for link creation and webhook intake.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Base for bank-transfer instruction links and gateway return URLs
    pub portal_base_url: String,
    /// Default lifetime of card and bank-transfer links
    pub link_ttl_hours: i64,
    pub bank_beneficiary: String,
    pub bank_iban: String,
    /// HMAC secret inbound webhooks must be signed with, if any
    pub webhook_secret: Option<String>,
    /// Expected `listenerEntityId` on inbound webhooks, if any
    pub listener_id: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            portal_base_url: "http://localhost:3000".into(),
            link_ttl_hours: 48,
            bank_beneficiary: "Rental Company Ltd".into(),
            bank_iban: "CH00 0000 0000 0000 0000 0".into(),
            webhook_secret: None,
            listener_id: None,
        }
    }
}

/// Application service for the rental payment core.
///
/// Generic over `R: PaymentRepository` - the adapter is injected at compile time.
/// The gateway is chosen at runtime (HTTP or sandbox), so it sits behind a
/// trait object.
pub struct PaymentService<R: PaymentRepository> {
    repo: R,
    gateway: Arc<dyn PaymentGateway>,
    settings: ServiceSettings,
}

impl<R: PaymentRepository> PaymentService<R> {
    /// Creates a new payment service.
    pub fn new(repo: R, gateway: Arc<dyn PaymentGateway>, settings: ServiceSettings) -> Self {
        Self {
            repo,
            gateway,
            settings,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }
}
