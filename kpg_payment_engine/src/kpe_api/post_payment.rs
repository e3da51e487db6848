//! Business actions that follow a successful payment.
//!
//! Each [`OrderType`] has at most one action: confirming the registration, settling the group-buy share, or accruing
//! the reward. The dispatcher is invoked exactly once per order, by whichever caller won the `pending -> paid`
//! transition. Action failures are logged and never undo the payment.
use std::{fmt::Debug, future::Future, sync::Arc};

use futures_util::{future::BoxFuture, FutureExt};
use log::*;
use thiserror::Error;

use crate::db_types::{Order, OrderType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Post-payment action failed: {0}")]
pub struct ActionError(pub String);

impl ActionError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}

pub type ActionHandler = Arc<dyn Fn(Order) -> BoxFuture<'static, Result<(), ActionError>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct PostPaymentDispatcher {
    on_registration: Option<ActionHandler>,
    on_group_buy: Option<ActionHandler>,
    on_collect_reward: Option<ActionHandler>,
}

impl Debug for PostPaymentDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostPaymentDispatcher")
            .field("on_registration", &self.on_registration.is_some())
            .field("on_group_buy", &self.on_group_buy.is_some())
            .field("on_collect_reward", &self.on_collect_reward.is_some())
            .finish()
    }
}

fn boxed<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(Order) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    Arc::new(move |order| f(order).boxed())
}

impl PostPaymentDispatcher {
    /// Confirms the activity registration the order paid for.
    pub fn on_registration<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Order) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.on_registration = Some(boxed(f));
        self
    }

    /// Settles the user's share of the group-buy deal.
    pub fn on_group_buy<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Order) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.on_group_buy = Some(boxed(f));
        self
    }

    /// Accrues the reward for the collect-reward activity.
    pub fn on_collect_reward<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Order) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.on_collect_reward = Some(boxed(f));
        self
    }

    pub fn handler(&self, order_type: OrderType) -> Option<&ActionHandler> {
        match order_type {
            OrderType::Registration => self.on_registration.as_ref(),
            OrderType::GroupBuy => self.on_group_buy.as_ref(),
            OrderType::CollectReward => self.on_collect_reward.as_ref(),
        }
    }

    /// Runs the action for the order's type. Never fails.
    pub async fn dispatch(&self, order: &Order) {
        let Some(handler) = self.handler(order.order_type) else {
            debug!(
                "🎯️ No post-payment action is registered for {} orders. [{}] needs no follow-up",
                order.order_type, order.order_no
            );
            return;
        };
        trace!("🎯️ Running {} post-payment action for order [{}]", order.order_type, order.order_no);
        match (handler)(order.clone()).await {
            Ok(()) => debug!("🎯️ {} post-payment action for [{}] completed", order.order_type, order.order_no),
            Err(e) => error!(
                "🎯️ {} post-payment action for order [{}] failed. The order stays paid. {e}",
                order.order_type, order.order_no
            ),
        }
    }
}
