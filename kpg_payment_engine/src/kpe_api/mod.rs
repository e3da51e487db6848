//! # Payment engine public API
//!
//! * [`payment_flow_api`] is the primary API. It creates orders, hands out payment parameters, consumes gateway
//!   callbacks and staff confirmations, and coordinates refunds.
//! * [`post_payment`] holds the per-order-type actions that run once an order is paid.
//! * [`order_objects`] are the request, filter and response types used by the API.
//!
//! # API usage
//!
//! The API is constructed explicitly from a store backend, the gateway table and the event producers:
//!
//! ```rust,ignore
//! use kpg_payment_engine::{config::EngineConfig, gateways::{Gateways, HttpRefundTransport}, *};
//! let config = EngineConfig::from_env_or_default();
//! let db = SqliteDatabase::new(&config).await?;
//! let transport = HttpRefundTransport::new(config.gateways.refund_timeout)?;
//! let gateways = Gateways::new(&config.gateways, &config.offline, transport);
//! let api = PaymentFlowApi::new(db, gateways, PostPaymentDispatcher::default(), producers, &config);
//! let order = api.create_order(request).await?;
//! ```
pub mod errors;
pub mod order_objects;
pub mod payment_flow_api;
pub mod post_payment;
pub mod refunds;
