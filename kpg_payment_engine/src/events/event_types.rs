use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{Money, Order, OrderStatusType};

/// Emitted exactly once per order, when it moves to `paid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when a pending order is cancelled, whether by staff, a failed payment, or an expired offline deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub order: Order,
    pub amount: Money,
}

impl OrderRefundedEvent {
    pub fn new(order: Order) -> Self {
        let amount = order.refund_amount.unwrap_or(order.final_amount);
        Self { order, amount }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentSuccess,
    PaymentFailed,
    OrderCancelled,
    RefundSuccess,
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PaymentSuccess => "payment_success",
            Self::PaymentFailed => "payment_failed",
            Self::OrderCancelled => "order_cancelled",
            Self::RefundSuccess => "refund_success",
        };
        f.write_str(s)
    }
}

/// A message for a user. Delivery is somebody else's problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
}

impl NotificationEvent {
    pub fn new<T: Into<String>, C: Into<String>>(user_id: i64, kind: NotificationKind, title: T, content: C) -> Self {
        Self { user_id, kind, title: title.into(), content: content.into() }
    }
}
