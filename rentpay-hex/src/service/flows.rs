//! Method flows: how each kind of payment method opens a link and who
//! confirms it.
//!
//! The link manager never branches on method strings; it resolves a
//! [`MethodFlow`] from the [`MethodType`] and dispatches through [`LinkFlow`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rentpay_rates::format_minor;
use rentpay_types::domain::{CardNetwork, MethodKind, OpenedLink};
use rentpay_types::ports::{CaptureMode, CheckoutRequest};
use rentpay_types::{GatewayError, MethodType, Money, Payment, PaymentGateway};

use super::ServiceSettings;

/// Who moves a payment of this flow to `paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationChannel {
    /// Gateway webhook or gateway status poll
    Gateway,
    /// Explicit admin action
    Admin,
}

/// What opening a flow produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    /// A live link; the payment becomes `active`.
    Link(OpenedLink),
    /// Instructions only; the payment stays `pending`.
    Instructions(String),
}

/// Everything a flow may need to open a link.
pub struct LinkContext<'a> {
    pub payment: &'a Payment,
    /// What the payer is asked for, in the currency they pay in
    pub charged: Money,
    pub capture_mode: CaptureMode,
    pub expires_at: DateTime<Utc>,
    pub settings: &'a ServiceSettings,
    pub gateway: &'a dyn PaymentGateway,
}

#[async_trait]
pub trait LinkFlow {
    async fn open(&self, ctx: LinkContext<'_>) -> Result<Opened, GatewayError>;

    fn confirmation_channel(&self) -> ConfirmationChannel;
}

/// Hosted card checkout through the gateway.
pub struct CardFlow {
    pub network: CardNetwork,
}

/// Static bank-transfer instructions plus an instruction page link.
pub struct BankTransferFlow;

/// Cash, crypto and anything else settled outside the system.
pub struct ManualFlow;

#[async_trait]
impl LinkFlow for CardFlow {
    async fn open(&self, ctx: LinkContext<'_>) -> Result<Opened, GatewayError> {
        let payment = ctx.payment;
        let session = ctx
            .gateway
            .create_checkout(CheckoutRequest {
                payment_id: payment.id,
                booking_id: payment.booking_id,
                amount: ctx.charged,
                method_type: payment.payment_method_type,
                capture_mode: ctx.capture_mode,
                expires_at: ctx.expires_at,
                return_url: format!(
                    "{}/payments/{}",
                    ctx.settings.portal_base_url.trim_end_matches('/'),
                    payment.id
                ),
            })
            .await?;

        tracing::debug!(
            payment_id = %payment.id,
            network = ?self.network,
            session_id = %session.session_id,
            "Gateway checkout opened"
        );

        Ok(Opened::Link(OpenedLink {
            url: Some(session.redirect_url),
            expires_at: Some(ctx.expires_at),
            gateway_session_id: Some(session.session_id),
            gateway_transaction_id: session.transaction_id,
            instructions: None,
        }))
    }

    fn confirmation_channel(&self) -> ConfirmationChannel {
        ConfirmationChannel::Gateway
    }
}

#[async_trait]
impl LinkFlow for BankTransferFlow {
    async fn open(&self, ctx: LinkContext<'_>) -> Result<Opened, GatewayError> {
        let payment = ctx.payment;
        let charged = ctx.charged;
        let instructions = format!(
            "Transfer {} {} to {} (IBAN {}) quoting reference {}, \
             then upload the transfer receipt.",
            format_minor(charged.amount(), charged.currency()),
            charged.currency(),
            ctx.settings.bank_beneficiary,
            ctx.settings.bank_iban,
            payment_reference(payment),
        );

        Ok(Opened::Link(OpenedLink {
            url: Some(format!(
                "{}/bank-transfer/{}",
                ctx.settings.portal_base_url.trim_end_matches('/'),
                payment.id
            )),
            expires_at: Some(ctx.expires_at),
            gateway_session_id: None,
            gateway_transaction_id: None,
            instructions: Some(instructions),
        }))
    }

    fn confirmation_channel(&self) -> ConfirmationChannel {
        ConfirmationChannel::Admin
    }
}

#[async_trait]
impl LinkFlow for ManualFlow {
    async fn open(&self, ctx: LinkContext<'_>) -> Result<Opened, GatewayError> {
        let charged = ctx.charged;
        Ok(Opened::Instructions(format!(
            "Collect {} {} outside the system (cash, crypto or other) with reference {}.",
            format_minor(charged.amount(), charged.currency()),
            charged.currency(),
            payment_reference(ctx.payment),
        )))
    }

    fn confirmation_channel(&self) -> ConfirmationChannel {
        ConfirmationChannel::Admin
    }
}

/// Closed set of method flows.
pub enum MethodFlow {
    Card(CardFlow),
    BankTransfer(BankTransferFlow),
    Manual(ManualFlow),
}

impl MethodFlow {
    pub fn for_method(method_type: MethodType) -> Self {
        match method_type.kind() {
            MethodKind::Card(network) => MethodFlow::Card(CardFlow { network }),
            MethodKind::BankTransfer => MethodFlow::BankTransfer(BankTransferFlow),
            MethodKind::Manual => MethodFlow::Manual(ManualFlow),
        }
    }

    fn as_flow(&self) -> &(dyn LinkFlow + Send + Sync) {
        match self {
            MethodFlow::Card(flow) => flow,
            MethodFlow::BankTransfer(flow) => flow,
            MethodFlow::Manual(flow) => flow,
        }
    }

    pub async fn open(&self, ctx: LinkContext<'_>) -> Result<Opened, GatewayError> {
        self.as_flow().open(ctx).await
    }

    pub fn confirmation_channel(&self) -> ConfirmationChannel {
        self.as_flow().confirmation_channel()
    }
}

/// Short human reference printed on transfer slips.
fn payment_reference(payment: &Payment) -> String {
    let id = payment.id.to_string();
    format!("RP-{}", id[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_dispatch() {
        assert_eq!(
            MethodFlow::for_method(MethodType::Amex).confirmation_channel(),
            ConfirmationChannel::Gateway
        );
        assert_eq!(
            MethodFlow::for_method(MethodType::VisaMastercard).confirmation_channel(),
            ConfirmationChannel::Gateway
        );
        assert_eq!(
            MethodFlow::for_method(MethodType::BankTransfer).confirmation_channel(),
            ConfirmationChannel::Admin
        );
        assert!(matches!(
            MethodFlow::for_method(MethodType::Manual),
            MethodFlow::Manual(_)
        ));
    }
}
