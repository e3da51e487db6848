use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderNo, OrderStatusType, OrderTransition, PaymentMethod},
    order_objects::{OrderQueryFilter, Page, Pagination},
    traits::OrderStoreError,
};

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// New orders always start in the `pending` state.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderStoreError> {
    let (registration_id, group_buy_id, collect_activity_id) = order.reference.columns();
    let (offline_contact, offline_location, offline_deadline) = match order.offline {
        Some(details) => (Some(details.contact), Some(details.location), Some(details.deadline)),
        None => (None, None, None),
    };
    let order_no = order.order_no.clone();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_no,
                user_id,
                activity_id,
                order_type,
                registration_id,
                group_buy_id,
                collect_activity_id,
                original_amount,
                discount_amount,
                final_amount,
                payment_method,
                status,
                remark,
                offline_contact,
                offline_location,
                offline_deadline,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *;
        "#,
    )
    .bind(order.order_no)
    .bind(order.user_id)
    .bind(order.activity_id)
    .bind(order.reference.order_type())
    .bind(registration_id)
    .bind(group_buy_id)
    .bind(collect_activity_id)
    .bind(order.original_amount)
    .bind(order.discount_amount)
    .bind(order.final_amount)
    .bind(order.payment_method)
    .bind(OrderStatusType::Pending)
    .bind(order.remark)
    .bind(offline_contact)
    .bind(offline_location)
    .bind(offline_deadline)
    .bind(order.created_at)
    .bind(order.created_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => OrderStoreError::OrderAlreadyExists(order_no),
        _ => OrderStoreError::from(e),
    })?;
    debug!("📝️ Order [{}] inserted with id {}", order.order_no, order.id);
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_order_no(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_no = $1")
        .bind(order_no.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Applies the transition in a single `UPDATE ... WHERE id = ? AND status = ? RETURNING *` statement.
///
/// Returns `None` if no row matched, i.e. the order does not exist or it is no longer in the `expected` state.
pub async fn conditional_update_status(
    id: i64,
    expected: OrderStatusType,
    transition: OrderTransition,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderStoreError> {
    if !expected.can_transition_to(transition.new_status) {
        return Err(OrderStoreError::IllegalTransition { from: expected, to: transition.new_status });
    }
    let OrderTransition {
        new_status,
        remark,
        payment_time,
        transaction_id,
        confirmed_by,
        payment_proof,
        refund_time,
        refund_amount,
        refund_reason,
    } = transition;
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET ");
    let mut set_clause = builder.separated(", ");
    set_clause.push("status = ");
    set_clause.push_bind_unseparated(new_status);
    set_clause.push("updated_at = ");
    set_clause.push_bind_unseparated(Utc::now());
    if let Some(remark) = remark {
        set_clause.push("remark = ");
        set_clause.push_bind_unseparated(remark);
    }
    if let Some(payment_time) = payment_time {
        set_clause.push("payment_time = ");
        set_clause.push_bind_unseparated(payment_time);
    }
    if let Some(transaction_id) = transaction_id {
        set_clause.push("transaction_id = ");
        set_clause.push_bind_unseparated(transaction_id);
    }
    if let Some(staff_id) = confirmed_by {
        set_clause.push("confirmed_by = ");
        set_clause.push_bind_unseparated(staff_id);
    }
    if let Some(proof) = payment_proof {
        set_clause.push("payment_proof = ");
        set_clause.push_bind_unseparated(proof);
    }
    if let Some(refund_time) = refund_time {
        set_clause.push("refund_time = ");
        set_clause.push_bind_unseparated(refund_time);
    }
    if let Some(amount) = refund_amount {
        set_clause.push("refund_amount = ");
        set_clause.push_bind_unseparated(amount);
    }
    if let Some(reason) = refund_reason {
        set_clause.push("refund_reason = ");
        set_clause.push_bind_unseparated(reason);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND status = ");
    builder.push_bind(expected);
    builder.push(" RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let result = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    match &result {
        Some(order) => debug!("📝️ Order #{id} moved from {expected} to {}", order.status),
        None => debug!("📝️ Order #{id} was not in the {expected} state. {new_status} transition skipped"),
    }
    Ok(result)
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &OrderQueryFilter) {
    if filter.is_empty() {
        return;
    }
    builder.push(" WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = filter.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(activity_id) = filter.activity_id {
        where_clause.push("activity_id = ");
        where_clause.push_bind_unseparated(activity_id);
    }
    if let Some(status) = filter.status {
        where_clause.push("status = ");
        where_clause.push_bind_unseparated(status);
    }
    if let Some(order_type) = filter.order_type {
        where_clause.push("order_type = ");
        where_clause.push_bind_unseparated(order_type);
    }
    if let Some(method) = filter.payment_method {
        where_clause.push("payment_method = ");
        where_clause.push_bind_unseparated(method);
    }
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in descending order
pub async fn search_orders(
    filter: OrderQueryFilter,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Page<Order>, sqlx::Error> {
    let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM orders");
    push_filter(&mut count_query, &filter);
    let total: i64 = count_query.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM orders");
    push_filter(&mut builder, &filter);
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    builder.push_bind(pagination.limit());
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset());
    trace!("📝️ Executing query: {}", builder.sql());
    let items = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ search_orders: {} of {total} orders returned", items.len());
    Ok(Page::new(items, total, pagination))
}

pub async fn fetch_overdue_offline_orders(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
        SELECT * FROM orders
        WHERE
            payment_method = $1 AND
            status = $2 AND
            offline_deadline IS NOT NULL AND
            unixepoch(offline_deadline) < unixepoch($3)
        ORDER BY offline_deadline ASC"#,
    )
    .bind(PaymentMethod::Offline)
    .bind(OrderStatusType::Pending)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
