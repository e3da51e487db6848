use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Money, OrderStatusType, OrderType, PaymentMethod};

/// An order creation request, as received from the outer layer. Nothing in here has been validated yet.
///
/// `order_type` is a raw string so that foreign values can be rejected with a validation error rather than a
/// deserialization failure further out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub user_id: i64,
    pub activity_id: i64,
    pub order_type: String,
    #[serde(default)]
    pub registration_id: Option<i64>,
    #[serde(default)]
    pub group_buy_id: Option<i64>,
    #[serde(default)]
    pub collect_activity_id: Option<i64>,
    pub original_amount: Money,
    #[serde(default)]
    pub discount_amount: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub offline_contact: Option<String>,
    #[serde(default)]
    pub offline_location: Option<String>,
    #[serde(default)]
    pub offline_deadline: Option<DateTime<Utc>>,
}

impl NewOrderRequest {
    pub fn new<S: Into<String>>(
        user_id: i64,
        activity_id: i64,
        order_type: S,
        original_amount: Money,
        discount_amount: Money,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            user_id,
            activity_id,
            order_type: order_type.into(),
            registration_id: None,
            group_buy_id: None,
            collect_activity_id: None,
            original_amount,
            discount_amount,
            payment_method,
            remark: None,
            offline_contact: None,
            offline_location: None,
            offline_deadline: None,
        }
    }

    pub fn with_registration_id(mut self, id: i64) -> Self {
        self.registration_id = Some(id);
        self
    }

    pub fn with_group_buy_id(mut self, id: i64) -> Self {
        self.group_buy_id = Some(id);
        self
    }

    pub fn with_collect_activity_id(mut self, id: i64) -> Self {
        self.collect_activity_id = Some(id);
        self
    }

    pub fn with_remark<S: Into<String>>(mut self, remark: S) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_offline_contact<S: Into<String>>(mut self, contact: S) -> Self {
        self.offline_contact = Some(contact.into());
        self
    }

    pub fn with_offline_location<S: Into<String>>(mut self, location: S) -> Self {
        self.offline_location = Some(location.into());
        self
    }

    pub fn with_offline_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.offline_deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub user_id: Option<i64>,
    pub activity_id: Option<i64>,
    pub status: Option<OrderStatusType>,
    pub order_type: Option<OrderType>,
    pub payment_method: Option<PaymentMethod>,
}

impl OrderQueryFilter {
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_activity_id(mut self, activity_id: i64) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() &&
            self.activity_id.is_none() &&
            self.status.is_none() &&
            self.order_type.is_none() &&
            self.payment_method.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(user_id) = &self.user_id {
            write!(f, "user_id: {user_id}. ")?;
        }
        if let Some(activity_id) = &self.activity_id {
            write!(f, "activity_id: {activity_id}. ")?;
        }
        if let Some(status) = &self.status {
            write!(f, "status: {status}. ")?;
        }
        if let Some(order_type) = &self.order_type {
            write!(f, "order_type: {order_type}. ")?;
        }
        if let Some(method) = &self.payment_method {
            write!(f, "payment_method: {method}. ")?;
        }
        Ok(())
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page selection. Out-of-range values are clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size.clamp(1, MAX_PAGE_SIZE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// The number of records matching the filter, across all pages
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        let page_size = u32::try_from(pagination.limit()).unwrap_or(DEFAULT_PAGE_SIZE);
        Self { items, total, page: pagination.page.max(1), page_size }
    }

    pub fn total_pages(&self) -> i64 {
        if self.page_size == 0 {
            return 0;
        }
        let size = i64::from(self.page_size);
        (self.total + size - 1) / size
    }
}

/// The outcome of a gateway callback, as reported back to the gateway. Callback handling never fails at the boundary:
/// a gateway that receives an error would just keep retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CallbackAck {
    /// The callback caused a state transition
    Processed,
    /// The callback was a repeat delivery, or the order had already moved on. Nothing was changed.
    Duplicate,
    /// The callback could not be applied. Nothing was changed.
    Rejected { reason: String },
}

impl CallbackAck {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}
