use chrono::Utc;
use log::*;

use crate::{
    db_types::{Order, OrderStatusType, OrderTransition},
    events::{NotificationKind, OrderRefundedEvent},
    gateways::{GatewayError, RefundTransport},
    kpe_api::{errors::PaymentFlowError, payment_flow_api::PaymentFlowApi},
    traits::OrderStore,
};

pub const DEFAULT_REFUND_REASON: &str = "User requested refund";

impl<B, T> PaymentFlowApi<B, T>
where
    B: OrderStore,
    T: RefundTransport,
{
    /// Refunds the full `final_amount` of a `paid` order.
    ///
    /// The gateway is asked first. The order only moves to `refunded` once the gateway has accepted the refund;
    /// offline orders are settled by staff and need no gateway call. A blank `reason` is replaced with
    /// [`DEFAULT_REFUND_REASON`].
    ///
    /// If a concurrent request refunded the order while the gateway call was in flight, the refunded order is
    /// returned. Gateway refund requests carry an id derived from the order number, so the gateway sees the repeat as
    /// the same refund.
    pub async fn request_refund(&self, order_id: i64, reason: Option<String>) -> Result<Order, PaymentFlowError> {
        let order = self.fetch_order(order_id).await?;
        if order.status != OrderStatusType::Paid {
            return Err(PaymentFlowError::InvalidState(format!(
                "not refundable. Order [{}] is {}",
                order.order_no, order.status
            )));
        }
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string());
        let amount = order.final_amount;
        debug!("🔄️💸️ Requesting a {} refund of {amount} for order [{}]", order.payment_method, order.order_no);
        let accepted = self.gateways.request_refund(&order, amount, &reason).await.map_err(|e| {
            error!("🔄️💸️ Refund request for order [{}] failed. The order stays paid. {e}", order.order_no);
            e
        })?;
        if !accepted {
            return Err(GatewayError::RefundRejected(format!(
                "{} declined the refund for order {}",
                order.payment_method, order.order_no
            ))
            .into());
        }
        let transition = OrderTransition::refunded(amount, reason.as_str(), Utc::now());
        match self.db.conditional_update_status(order.id, OrderStatusType::Paid, transition).await? {
            Some(refunded) => {
                info!("🔄️💸️ Order [{}] refunded. {amount} returned. {reason}", refunded.order_no);
                self.producers.publish_order_refunded(OrderRefundedEvent::new(refunded.clone())).await;
                let content = format!("Your refund of {amount} for order {} has been processed.", refunded.order_no);
                self.producers
                    .notify(refunded.user_id, NotificationKind::RefundSuccess, "Refund successful", content)
                    .await;
                Ok(refunded)
            },
            None => {
                let current = self.fetch_order(order.id).await?;
                match current.status {
                    OrderStatusType::Refunded => {
                        info!("🔄️💸️ Order [{}] was refunded by a concurrent request", current.order_no);
                        Ok(current)
                    },
                    status => Err(PaymentFlowError::InvalidState(format!(
                        "Order [{}] became {status} while the refund was in flight",
                        current.order_no
                    ))),
                }
            },
        }
    }
}
