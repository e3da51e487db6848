//! # Payment gateway adapters
//!
//! Each [`PaymentMethod`] has exactly one adapter. Adapters are stateless translators between orders and the
//! gateway's wire formats:
//! * they build the parameters the client needs to start a payment ([`InitiationParams`]),
//! * they read the paid amount and transaction reference out of callback payloads,
//! * they build signed refund requests and interpret the gateway's answer.
//!
//! The adapters never perform I/O. The only network call, sending a refund request, goes through a
//! [`RefundTransport`]. [`Gateways`] puts the two together.
mod bank;
mod card;
mod offline;
pub mod signing;
mod transport;
mod wallet;

pub use bank::{BankGateway, BankPayParams};
pub use card::{CardGateway, CardPayParams};
use chrono::{DateTime, Utc};
use log::*;
pub use offline::{OfflineGateway, OfflineInstructions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
pub use transport::{HttpRefundTransport, RefundTransport};
pub use wallet::{WalletGateway, WalletPayParams};

use crate::{
    config::{GatewayConfig, OfflineConfig},
    db_types::{Money, Order, OrderType, PaymentMethod},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Invalid callback payload: {0}")]
    InvalidPayload(String),
    #[error("Could not sign the request: {0}")]
    Signing(String),
    #[error("Could not reach the payment gateway: {0}")]
    Transport(String),
    #[error("The payment gateway rejected the refund: {0}")]
    RefundRejected(String),
    #[error("{method} payments do not support {operation}")]
    Unsupported { method: PaymentMethod, operation: &'static str },
}

/// What the client needs to start a payment. Online gateways get signed credentials; offline orders get
/// instructions for a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payment_method", rename_all = "snake_case")]
pub enum InitiationParams {
    Wallet(WalletPayParams),
    Card(CardPayParams),
    Bank(BankPayParams),
    Offline(OfflineInstructions),
}

impl InitiationParams {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Wallet(_) => PaymentMethod::Wallet,
            Self::Card(_) => PaymentMethod::Card,
            Self::Bank(_) => PaymentMethod::Bank,
            Self::Offline(_) => PaymentMethod::Offline,
        }
    }
}

/// A signed, gateway-specific refund request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub method: PaymentMethod,
    pub url: String,
    pub body: Value,
}

/// The gateway's raw answer to a [`RefundRequest`]. Non-JSON bodies are kept as a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub status: u16,
    pub body: Value,
}

impl RefundResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_http_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The string value of `field` in the response body, if there is one.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }
}

pub trait GatewayAdapter: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// The parameters for a fresh payment attempt. Apart from timestamp, nonce and signature fields, the result only
    /// depends on the order and the URLs.
    fn build_initiation_params(
        &self,
        order: &Order,
        return_url: &str,
        notify_url: &str,
    ) -> Result<InitiationParams, GatewayError>;

    /// The amount the gateway says was paid, as found in a success callback payload.
    fn extract_paid_amount(&self, payload: &Value) -> Result<Money, GatewayError>;

    /// The gateway's own reference for the payment, if the payload carries one.
    fn extract_transaction_id(&self, payload: &Value) -> Option<String>;

    /// The request that refunds `amount` of `order`. `None` means the refund is settled without contacting any
    /// gateway.
    fn refund_request(&self, order: &Order, amount: Money, reason: &str)
        -> Result<Option<RefundRequest>, GatewayError>;

    fn refund_succeeded(&self, response: &RefundResponse) -> bool;
}

/// The adapter table, plus the transport used to talk to the gateways.
pub struct Gateways<T> {
    wallet: WalletGateway,
    card: CardGateway,
    bank: BankGateway,
    offline: OfflineGateway,
    transport: T,
}

impl<T> Gateways<T> {
    pub fn new(config: &GatewayConfig, offline: &OfflineConfig, transport: T) -> Self {
        if config.sandbox {
            info!("💳️ Payment gateways configured in sandbox mode");
        }
        Self {
            wallet: WalletGateway::new(config.wallet.clone()),
            card: CardGateway::new(config.card.clone()),
            bank: BankGateway::new(config.bank.clone()),
            offline: OfflineGateway::new(offline.clone()),
            transport,
        }
    }

    pub fn adapter(&self, method: PaymentMethod) -> &dyn GatewayAdapter {
        match method {
            PaymentMethod::Wallet => &self.wallet,
            PaymentMethod::Card => &self.card,
            PaymentMethod::Bank => &self.bank,
            PaymentMethod::Offline => &self.offline,
        }
    }
}

impl<T: RefundTransport> Gateways<T> {
    /// Asks the gateway that took the payment for `order` to return `amount`.
    ///
    /// Returns `Ok(true)` if the refund was accepted, and `Ok(false)` if the gateway answered but declined.
    pub async fn request_refund(&self, order: &Order, amount: Money, reason: &str) -> Result<bool, GatewayError> {
        let adapter = self.adapter(order.payment_method);
        let request = match adapter.refund_request(order, amount, reason)? {
            Some(request) => request,
            None => {
                info!("💳️ Refund of {amount} for order [{}] is settled offline", order.order_no);
                return Ok(true);
            },
        };
        debug!("💳️ Sending {} refund request for order [{}] to {}", request.method, order.order_no, request.url);
        let response = self.transport.send(&request).await?;
        let accepted = adapter.refund_succeeded(&response);
        if accepted {
            info!("💳️ {} accepted the refund of {amount} for order [{}]", request.method, order.order_no);
        } else {
            warn!(
                "💳️ {} declined the refund for order [{}]. HTTP {}: {}",
                request.method, order.order_no, response.status, response.body
            );
        }
        Ok(accepted)
    }
}

/// Reads an amount in minor units. Accepts integers and integer strings.
pub(crate) fn minor_units(value: &Value) -> Result<Money, GatewayError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Money::from_minor)
            .ok_or_else(|| GatewayError::InvalidPayload(format!("{n} is not a whole amount"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Money::from_minor)
            .map_err(|e| GatewayError::InvalidPayload(format!("{s} is not a whole amount: {e}"))),
        v => Err(GatewayError::InvalidPayload(format!("{v} is not an amount"))),
    }
}

/// Reads an amount in major units. Accepts decimal strings like `"80.00"` and JSON numbers. Extra decimal places are
/// rounded to the nearest minor unit.
pub(crate) fn major_units(value: &Value) -> Result<Money, GatewayError> {
    match value {
        Value::String(s) => s.trim().parse::<Money>().or_else(|e| {
            let invalid = |_| GatewayError::InvalidPayload(format!("{s} is not an amount: {e}"));
            let v = s.trim().parse::<f64>().map_err(invalid)?;
            Money::try_from(v).map_err(|e| GatewayError::InvalidPayload(format!("{s} is not an amount: {e}")))
        }),
        Value::Number(n) => {
            let v = n.as_f64().ok_or_else(|| GatewayError::InvalidPayload(format!("{n} is not an amount")))?;
            Money::try_from(v).map_err(|e| GatewayError::InvalidPayload(format!("{n} is not an amount: {e}")))
        },
        v => Err(GatewayError::InvalidPayload(format!("{v} is not an amount"))),
    }
}

/// The first of `keys` that holds a non-empty string or a number.
pub(crate) fn string_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match payload.pointer(k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// The gateway-side identifier of a refund. Derived from the order number so that a repeated request is recognised
/// as the same refund.
pub(crate) fn refund_no(order: &Order) -> String {
    format!("R{}", order.order_no)
}

pub(crate) fn compact_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// A human-readable payment subject for the order.
pub(crate) fn subject(order: &Order) -> String {
    let what = match order.order_type {
        OrderType::Registration => "Activity registration",
        OrderType::GroupBuy => "Group buy",
        OrderType::CollectReward => "Reward collection",
    };
    format!("{what} {}", order.order_no)
}
