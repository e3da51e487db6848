//! # Order storage contract
//!
//! This module defines the behaviour that a database backend needs to expose in order to be used by the payment
//! engine.
//!
//! * [`OrderStore`] is the durable record of orders. It is the only place where order status changes, and it does so
//!   exclusively through a conditional (compare-and-swap) update.
mod order_store;

pub use order_store::{OrderStore, OrderStoreError};
