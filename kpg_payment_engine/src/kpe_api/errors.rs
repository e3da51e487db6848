use thiserror::Error;

use crate::{db_types::Money, gateways::GatewayError, traits::OrderStoreError};

#[derive(Debug, Clone, Error)]
pub enum PaymentFlowError {
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("Invalid order state: {0}")]
    InvalidState(String),
    #[error("Paid amount {paid} does not match the order amount {expected}")]
    AmountMismatch { expected: Money, paid: Money },
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {0} does not exist")]
    OrderNoNotFound(String),
    #[error("Order store error: {0}")]
    Store(#[from] OrderStoreError),
}
