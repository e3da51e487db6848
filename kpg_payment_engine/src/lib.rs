//! Kindergarten Payment Engine
//!
//! The payment engine is the order and payment lifecycle core of the kindergarten platform. Parents pay for activity
//! registrations, group-buy deals and reward-collection activities through one of several payment gateways, or
//! offline at the front desk. This library owns the order state machine and everything that touches it.
//!
//! The library is divided into these main sections:
//! 1. Order storage ([`OrderStore`]). The store contract is a trait, and SQLite is the supported backend
//!    ([`SqliteDatabase`]). Status changes are compare-and-swap updates, so concurrent callbacks can never apply the
//!    same transition twice.
//! 2. Gateway adapters ([`mod@gateways`]). One stateless adapter per [`PaymentMethod`](db_types::PaymentMethod)
//!    translates orders into gateway-specific payment parameters, parses callback payloads and builds refund requests.
//! 3. The public API ([`PaymentFlowApi`]). It creates orders, initiates payments, consumes gateway callbacks and
//!    offline confirmations, and coordinates refunds.
//!
//! The engine also emits events when orders are paid, annulled or refunded, and when a user should be notified. A
//! simple actor framework ([`mod@events`]) lets you hook into these events and perform custom actions.
pub mod config;
pub mod db_types;
pub mod events;
pub mod gateways;
mod kpe_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use kpe_api::{
    errors::PaymentFlowError,
    order_objects,
    payment_flow_api::PaymentFlowApi,
    post_payment::{ActionError, ActionHandler, PostPaymentDispatcher},
    refunds::DEFAULT_REFUND_REASON,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{OrderStore, OrderStoreError};
