//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`OrderStore`] trait.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{new_pool, orders, MIGRATOR};
use crate::{
    config::EngineConfig,
    db_types::{NewOrder, Order, OrderNo, OrderStatusType, OrderTransition},
    order_objects::{OrderQueryFilter, Page, Pagination},
    traits::{OrderStore, OrderStoreError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{}] has been saved in the DB with id {}", order.order_no, order.id);
        Ok(order)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_id(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_no(order_no, &mut conn).await?;
        Ok(order)
    }

    async fn conditional_update_status(
        &self,
        id: i64,
        expected: OrderStatusType,
        transition: OrderTransition,
    ) -> Result<Option<Order>, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::conditional_update_status(id, expected, transition, &mut tx).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn search_orders(
        &self,
        filter: OrderQueryFilter,
        pagination: Pagination,
    ) -> Result<Page<Order>, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        trace!("🗃️ Searching orders. {filter}");
        let page = orders::search_orders(filter, pagination, &mut tx).await?;
        tx.commit().await?;
        Ok(page)
    }

    async fn fetch_overdue_offline_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_overdue_offline_orders(now, &mut conn).await?;
        Ok(orders)
    }

    async fn close(&mut self) -> Result<(), OrderStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object from the engine configuration
    pub async fn new(config: &EngineConfig) -> Result<Self, sqlx::Error> {
        SqliteDatabase::new_with_url(config.database_url.as_str(), config.db_max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date with the embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}
