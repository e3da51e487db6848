use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderNo, OrderStatusType, OrderTransition},
    order_objects::{OrderQueryFilter, Page, Pagination},
};

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("An order with order number {0} already exists")]
    OrderAlreadyExists(OrderNo),
    #[error("Illegal order status transition from {from} to {to}")]
    IllegalTransition { from: OrderStatusType, to: OrderStatusType },
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        OrderStoreError::DatabaseError(e.to_string())
    }
}

/// The durable record of orders.
///
/// Orders are keyed by their numeric `id` and by their `order_no`. They are never deleted.
///
/// Status changes only ever happen via [`OrderStore::conditional_update_status`]. Implementations must apply the
/// status check and the write as a single atomic step, so that of any number of concurrent callers expecting the same
/// current status, exactly one succeeds.
#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order with `pending` status and returns the stored record.
    ///
    /// Returns [`OrderStoreError::OrderAlreadyExists`] if the order number is already taken.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderStoreError>;

    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderStoreError>;

    /// Applies `transition` to order `id`, if and only if its current status is `expected`.
    ///
    /// * `Ok(Some(order))`: the transition was applied. `order` is the updated record.
    /// * `Ok(None)`: the order does not exist, or its status is no longer `expected`. Nothing was changed. Callers
    ///   that care about the difference should re-read the order.
    /// * `Err(IllegalTransition)`: `expected -> transition.new_status` is not a legal transition. Nothing was changed.
    async fn conditional_update_status(
        &self,
        id: i64,
        expected: OrderStatusType,
        transition: OrderTransition,
    ) -> Result<Option<Order>, OrderStoreError>;

    /// Fetches one page of orders matching `filter`, newest first.
    async fn search_orders(
        &self,
        filter: OrderQueryFilter,
        pagination: Pagination,
    ) -> Result<Page<Order>, OrderStoreError>;

    /// Fetches the `pending` offline orders whose payment deadline is before `now`.
    async fn fetch_overdue_offline_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, OrderStoreError>;

    /// Closes the database connection pool.
    async fn close(&mut self) -> Result<(), OrderStoreError> {
        Ok(())
    }
}
