use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::Value;

use crate::{
    config::{EngineConfig, OfflineConfig},
    db_types::{
        Money,
        NewOrder,
        OfflineDetails,
        Order,
        OrderNo,
        OrderReference,
        OrderStatusType,
        OrderTransition,
        OrderType,
        PaymentMethod,
    },
    events::{EventProducers, NotificationKind, OrderAnnulledEvent, OrderPaidEvent},
    gateways::{Gateways, InitiationParams, RefundTransport},
    kpe_api::{
        errors::PaymentFlowError,
        order_objects::{CallbackAck, NewOrderRequest, OrderQueryFilter, Page, Pagination},
        post_payment::PostPaymentDispatcher,
    },
    traits::{OrderStore, OrderStoreError},
};

/// Paid and expected amounts may differ by at most one minor unit.
pub const AMOUNT_TOLERANCE: Money = Money::from_minor(1);
/// How many fresh order numbers to try before giving up on a unique-key collision.
pub const MAX_ORDER_NO_ATTEMPTS: usize = 3;

/// The result of a `pending -> paid` attempt that did not fail.
enum PaidOutcome {
    /// This call moved the order to `paid`.
    Transitioned(Order),
    /// Somebody else already did.
    AlreadyPaid(Order),
}

/// `PaymentFlowApi` is the primary API for the order and payment lifecycle.
///
/// It owns the order state machine:
///
/// | From \ To | Pending | Paid | Cancelled | Refunded |
/// |-----------|---------|------|-----------|----------|
/// | Pending   | Err     | 1    | 2         | Err      |
/// | Paid      | Err     | Err  | Err       | 3        |
/// | Cancelled | Err     | Err  | Err       | Err      |
/// | Refunded  | Err     | Err  | Err       | Err      |
///
/// 1. A verified gateway callback ([`Self::handle_payment_callback`]) or a staff confirmation
///    ([`Self::confirm_offline_payment`]). The post-payment action for the order type runs, then the `OrderPaid` event
///    and a notification are published.
/// 2. A failed payment ([`Self::handle_payment_failure`]), an offline cancellation, or an expired offline deadline.
/// 3. A refund accepted by the gateway ([`Self::request_refund`]).
///
/// Every transition is a compare-and-swap on the current status, so duplicate and concurrent deliveries are applied
/// at most once, and side effects only run for the caller that won.
pub struct PaymentFlowApi<B, T> {
    pub(crate) db: B,
    pub(crate) gateways: Gateways<T>,
    pub(crate) dispatcher: PostPaymentDispatcher,
    pub(crate) producers: EventProducers,
    offline: OfflineConfig,
    default_return_url: String,
    default_notify_url: String,
}

impl<B, T> Debug for PaymentFlowApi<B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B, T> PaymentFlowApi<B, T> {
    pub fn new(
        db: B,
        gateways: Gateways<T>,
        dispatcher: PostPaymentDispatcher,
        producers: EventProducers,
        config: &EngineConfig,
    ) -> Self {
        Self {
            db,
            gateways,
            dispatcher,
            producers,
            offline: config.offline.clone(),
            default_return_url: config.default_return_url.clone(),
            default_notify_url: config.default_notify_url.clone(),
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn gateways(&self) -> &Gateways<T> {
        &self.gateways
    }
}

impl<B, T> PaymentFlowApi<B, T>
where
    B: OrderStore,
    T: RefundTransport,
{
    /// Validates and stores a new `pending` order.
    ///
    /// * `order_type` must be one of the known order types, and the matching reference id (and no other) must be set.
    /// * `original_amount` must be positive, and the discount must lie between zero and the original amount.
    ///
    /// `final_amount` is computed here and never changes afterwards. Offline orders that arrive without payment
    /// instructions get the configured defaults, with a deadline of now plus the payment window.
    pub async fn create_order(&self, request: NewOrderRequest) -> Result<Order, PaymentFlowError> {
        let order_type = request
            .order_type
            .parse::<OrderType>()
            .map_err(|e| PaymentFlowError::ValidationError(e.to_string()))?;
        let reference = OrderReference::from_columns(
            order_type,
            request.registration_id,
            request.group_buy_id,
            request.collect_activity_id,
        )
        .ok_or_else(|| {
            PaymentFlowError::ValidationError(format!(
                "A {order_type} order must reference exactly one {order_type} record, and nothing else"
            ))
        })?;
        if reference.id() <= 0 {
            return Err(PaymentFlowError::ValidationError(format!("Invalid {order_type} id: {}", reference.id())));
        }
        if request.user_id <= 0 {
            return Err(PaymentFlowError::ValidationError(format!("Invalid user id: {}", request.user_id)));
        }
        if request.activity_id <= 0 {
            return Err(PaymentFlowError::ValidationError(format!("Invalid activity id: {}", request.activity_id)));
        }
        let original = request.original_amount;
        let discount = request.discount_amount;
        if !original.is_positive() {
            return Err(PaymentFlowError::ValidationError(format!("Original amount must be positive, not {original}")));
        }
        if discount.is_negative() || discount > original {
            return Err(PaymentFlowError::ValidationError(format!(
                "Discount {discount} must be between 0.00 and the original amount {original}"
            )));
        }
        let now = Utc::now();
        let offline = match request.payment_method {
            PaymentMethod::Offline => Some(OfflineDetails {
                contact: request.offline_contact.unwrap_or_else(|| self.offline.contact.clone()),
                location: request.offline_location.unwrap_or_else(|| self.offline.location.clone()),
                deadline: request.offline_deadline.unwrap_or(now + self.offline.payment_window),
            }),
            _ => None,
        };
        let mut last_error = None;
        for attempt in 1..=MAX_ORDER_NO_ATTEMPTS {
            let mut order = NewOrder::new(
                OrderNo::generate(now),
                request.user_id,
                request.activity_id,
                reference,
                original,
                discount,
                request.payment_method,
            );
            order.created_at = now;
            if let Some(remark) = &request.remark {
                order = order.with_remark(remark.clone());
            }
            if let Some(details) = &offline {
                order = order.with_offline_details(details.clone());
            }
            match self.db.insert_order(order).await {
                Ok(order) => {
                    info!(
                        "🔄️📦️ Order [{}] created for user #{}. {} - {} = {} by {}",
                        order.order_no,
                        order.user_id,
                        order.original_amount,
                        order.discount_amount,
                        order.final_amount,
                        order.payment_method
                    );
                    return Ok(order);
                },
                Err(OrderStoreError::OrderAlreadyExists(order_no)) => {
                    warn!("🔄️📦️ Order number {order_no} is taken (attempt {attempt}). Generating a new one");
                    last_error = Some(OrderStoreError::OrderAlreadyExists(order_no));
                },
                Err(e) => return Err(e.into()),
            }
        }
        error!("🔄️📦️ Could not find a free order number after {MAX_ORDER_NO_ATTEMPTS} attempts");
        Err(last_error.map(PaymentFlowError::from).unwrap_or_else(|| {
            PaymentFlowError::ValidationError("Could not generate an order number".to_string())
        }))
    }

    /// Returns the parameters the client needs to pay for a `pending` order with the given method.
    ///
    /// This never changes the order, so it can be called any number of times. Missing URLs fall back to the
    /// configured defaults.
    pub async fn initiate_payment(
        &self,
        order_id: i64,
        method: PaymentMethod,
        return_url: Option<&str>,
        notify_url: Option<&str>,
    ) -> Result<InitiationParams, PaymentFlowError> {
        let order = self.fetch_order(order_id).await?;
        if order.status != OrderStatusType::Pending {
            return Err(PaymentFlowError::InvalidState(format!(
                "order not payable. Order [{}] is {}",
                order.order_no, order.status
            )));
        }
        check_method(&order, method)?;
        let return_url = return_url.unwrap_or(self.default_return_url.as_str());
        let notify_url = notify_url.unwrap_or(self.default_notify_url.as_str());
        let params = self.gateways.adapter(method).build_initiation_params(&order, return_url, notify_url)?;
        debug!("🔄️💳️ {method} payment parameters issued for order [{}]", order.order_no);
        Ok(params)
    }

    /// Handles a success callback from a payment gateway.
    ///
    /// Repeat deliveries for an order that is already paid succeed without side effects. The paid amount must match
    /// the order's `final_amount` to within [`AMOUNT_TOLERANCE`]; a mismatch leaves the order untouched.
    pub async fn handle_payment_callback(
        &self,
        order_id: i64,
        payload: &Value,
        method: PaymentMethod,
    ) -> Result<Order, PaymentFlowError> {
        match self.process_payment_callback(order_id, payload, method).await? {
            PaidOutcome::Transitioned(order) | PaidOutcome::AlreadyPaid(order) => Ok(order),
        }
    }

    /// The gateway-facing variant of [`Self::handle_payment_callback`]. It never fails; every outcome is reported as
    /// a [`CallbackAck`].
    pub async fn acknowledge_payment_callback(
        &self,
        order_id: i64,
        payload: &Value,
        method: PaymentMethod,
    ) -> CallbackAck {
        match self.process_payment_callback(order_id, payload, method).await {
            Ok(PaidOutcome::Transitioned(_)) => CallbackAck::Processed,
            Ok(PaidOutcome::AlreadyPaid(_)) => CallbackAck::Duplicate,
            Err(e) => {
                warn!("🔄️💳️ {method} callback for order #{order_id} rejected. {e}");
                CallbackAck::Rejected { reason: e.to_string() }
            },
        }
    }

    async fn process_payment_callback(
        &self,
        order_id: i64,
        payload: &Value,
        method: PaymentMethod,
    ) -> Result<PaidOutcome, PaymentFlowError> {
        let order = self.fetch_order(order_id).await?;
        check_method(&order, method)?;
        match order.status {
            OrderStatusType::Paid | OrderStatusType::Refunded => {
                let (order_no, status) = (&order.order_no, order.status);
                info!("🔄️💳️ Order [{order_no}] is already {status}. Duplicate {method} callback ignored");
                return Ok(PaidOutcome::AlreadyPaid(order));
            },
            OrderStatusType::Pending => {},
            status => {
                return Err(PaymentFlowError::InvalidState(format!(
                    "Order [{}] is {status} and cannot be paid",
                    order.order_no
                )));
            },
        }
        let adapter = self.gateways.adapter(method);
        let paid = adapter.extract_paid_amount(payload)?;
        if paid.abs_diff(order.final_amount) > AMOUNT_TOLERANCE {
            error!(
                "🔄️💳️ Amount mismatch on {method} callback for order [{}]. Expected {}, but {paid} was paid. The \
                 order has NOT been marked as paid",
                order.order_no, order.final_amount
            );
            return Err(PaymentFlowError::AmountMismatch { expected: order.final_amount, paid });
        }
        let transaction_id = adapter.extract_transaction_id(payload);
        let transition = OrderTransition::paid(Utc::now()).with_transaction_id(transaction_id);
        self.mark_as_paid(order, transition).await
    }

    /// Handles a failure callback from a payment gateway by cancelling the order. Never fails.
    ///
    /// If the order was paid in the meantime, the failure is logged as a conflict and the order is left alone.
    pub async fn handle_payment_failure(
        &self,
        order_id: i64,
        error_code: &str,
        error_message: &str,
        method: PaymentMethod,
    ) -> CallbackAck {
        let order = match self.fetch_order(order_id).await.and_then(|o| check_method(&o, method).map(|_| o)) {
            Ok(order) => order,
            Err(e) => {
                warn!("🔄️❌️ {method} failure callback for order #{order_id} rejected. {e}");
                return CallbackAck::Rejected { reason: e.to_string() };
            },
        };
        match order.status {
            OrderStatusType::Pending => {},
            OrderStatusType::Paid => {
                warn!(
                    "🔄️❌️ Conflict: {method} reported payment failure [{error_code}] for order [{}], which is already \
                     paid. The order is unchanged",
                    order.order_no
                );
                return CallbackAck::Duplicate;
            },
            status => {
                info!("🔄️❌️ Order [{}] is already {status}. Failure callback ignored", order.order_no);
                return CallbackAck::Duplicate;
            },
        }
        let remark = format!("Payment failed [{error_code}]: {error_message}");
        let transition = OrderTransition::cancelled(remark);
        match self.db.conditional_update_status(order.id, OrderStatusType::Pending, transition).await {
            Ok(Some(cancelled)) => {
                info!("🔄️❌️ Order [{}] cancelled after failed {method} payment", cancelled.order_no);
                let content = format!(
                    "Your payment for order {} failed: {error_message}. Please try again.",
                    cancelled.order_no
                );
                self.call_order_annulled_hook(&cancelled).await;
                self.producers
                    .notify(cancelled.user_id, NotificationKind::PaymentFailed, "Payment failed", content)
                    .await;
                CallbackAck::Processed
            },
            Ok(None) => {
                warn!(
                    "🔄️❌️ Conflict: order [{}] left the pending state while its {method} failure [{error_code}] was being \
                     processed. The order is unchanged",
                    order.order_no
                );
                CallbackAck::Duplicate
            },
            Err(e) => {
                error!("🔄️❌️ Could not cancel order [{}] after failed payment. {e}", order.order_no);
                CallbackAck::Rejected { reason: e.to_string() }
            },
        }
    }

    /// Staff confirmation that an offline order has been paid in person.
    pub async fn confirm_offline_payment(
        &self,
        order_id: i64,
        staff_id: i64,
        payment_proof: Option<String>,
    ) -> Result<Order, PaymentFlowError> {
        if staff_id <= 0 {
            return Err(PaymentFlowError::ValidationError(format!("Invalid staff id: {staff_id}")));
        }
        let order = self.fetch_pending_offline_order(order_id).await?;
        let transition =
            OrderTransition::paid(Utc::now()).with_confirmed_by(staff_id).with_payment_proof(payment_proof);
        match self.mark_as_paid(order, transition).await? {
            PaidOutcome::Transitioned(order) => {
                info!("🔄️🧾️ Offline payment for order [{}] confirmed by staff #{staff_id}", order.order_no);
                Ok(order)
            },
            PaidOutcome::AlreadyPaid(order) => Err(PaymentFlowError::InvalidState(format!(
                "Order [{}] was confirmed by staff #{} in the meantime",
                order.order_no,
                order.confirmed_by.unwrap_or_default()
            ))),
        }
    }

    /// Cancels a `pending` offline order, recording `reason` as the order remark.
    pub async fn cancel_offline_payment(&self, order_id: i64, reason: &str) -> Result<Order, PaymentFlowError> {
        let order = self.fetch_pending_offline_order(order_id).await?;
        let transition = OrderTransition::cancelled(reason);
        let cancelled = self
            .db
            .conditional_update_status(order.id, OrderStatusType::Pending, transition)
            .await?
            .ok_or_else(|| {
                let msg = format!("Order [{}] left the pending state in the meantime", order.order_no);
                PaymentFlowError::InvalidState(msg)
            })?;
        info!("🔄️🧾️ Offline order [{}] cancelled. {reason}", cancelled.order_no);
        self.call_order_annulled_hook(&cancelled).await;
        let content = format!("Your order {} has been cancelled: {reason}", cancelled.order_no);
        self.producers.notify(cancelled.user_id, NotificationKind::OrderCancelled, "Order cancelled", content).await;
        Ok(cancelled)
    }

    /// Cancels every `pending` offline order whose payment deadline is before `now`.
    ///
    /// The engine has no background loop; the host decides how often to call this. Orders that change state while
    /// the sweep runs are skipped.
    pub async fn cancel_overdue_offline_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, PaymentFlowError> {
        let overdue = self.db.fetch_overdue_offline_orders(now).await?;
        trace!("🔄️⏰️ {} overdue offline orders found", overdue.len());
        let mut cancelled = Vec::with_capacity(overdue.len());
        for order in overdue {
            let transition = OrderTransition::cancelled("Offline payment deadline passed");
            match self.db.conditional_update_status(order.id, OrderStatusType::Pending, transition).await? {
                Some(order) => {
                    info!("🔄️⏰️ Offline order [{}] cancelled. The payment deadline has passed", order.order_no);
                    self.call_order_annulled_hook(&order).await;
                    let content =
                        format!("Your order {} was cancelled because it was not paid in time.", order.order_no);
                    self.producers
                        .notify(order.user_id, NotificationKind::OrderCancelled, "Order cancelled", content)
                        .await;
                    cancelled.push(order);
                },
                None => debug!("🔄️⏰️ Order [{}] changed state before it could be expired. Skipped", order.order_no),
            }
        }
        Ok(cancelled)
    }

    pub async fn fetch_order(&self, order_id: i64) -> Result<Order, PaymentFlowError> {
        self.db.fetch_order(order_id).await?.ok_or(PaymentFlowError::OrderNotFound(order_id))
    }

    pub async fn fetch_order_by_order_no(&self, order_no: &str) -> Result<Order, PaymentFlowError> {
        let parsed = order_no.parse::<OrderNo>().map_err(|e| PaymentFlowError::ValidationError(e.to_string()))?;
        self.db
            .fetch_order_by_order_no(&parsed)
            .await?
            .ok_or_else(|| PaymentFlowError::OrderNoNotFound(order_no.to_string()))
    }

    pub async fn search_orders(
        &self,
        filter: OrderQueryFilter,
        pagination: Pagination,
    ) -> Result<Page<Order>, PaymentFlowError> {
        let page = self.db.search_orders(filter, pagination).await?;
        Ok(page)
    }

    async fn fetch_pending_offline_order(&self, order_id: i64) -> Result<Order, PaymentFlowError> {
        let order = self.fetch_order(order_id).await?;
        if !order.is_offline() {
            return Err(PaymentFlowError::InvalidState(format!(
                "Order [{}] is a {} order, not an offline order",
                order.order_no, order.payment_method
            )));
        }
        if order.status != OrderStatusType::Pending {
            return Err(PaymentFlowError::InvalidState(format!(
                "Order [{}] is {}, not pending",
                order.order_no, order.status
            )));
        }
        Ok(order)
    }

    /// Applies `pending -> paid`. If this call wins, the post-payment action, the `OrderPaid` event and the user
    /// notification follow, in that order. If it loses, the order is re-read to find out why.
    async fn mark_as_paid(&self, order: Order, transition: OrderTransition) -> Result<PaidOutcome, PaymentFlowError> {
        match self.db.conditional_update_status(order.id, OrderStatusType::Pending, transition).await? {
            Some(paid) => {
                info!(
                    "🔄️✅️ Order [{}] is paid. {} received via {}",
                    paid.order_no, paid.final_amount, paid.payment_method
                );
                self.dispatcher.dispatch(&paid).await;
                self.call_order_paid_hook(&paid).await;
                let content =
                    format!("Your payment of {} for order {} was successful.", paid.final_amount, paid.order_no);
                self.producers
                    .notify(paid.user_id, NotificationKind::PaymentSuccess, "Payment successful", content)
                    .await;
                Ok(PaidOutcome::Transitioned(paid))
            },
            None => {
                let current = self.fetch_order(order.id).await?;
                match current.status {
                    OrderStatusType::Paid | OrderStatusType::Refunded => {
                        info!("🔄️✅️ Order [{}] was paid by a concurrent request. Nothing to do", current.order_no);
                        Ok(PaidOutcome::AlreadyPaid(current))
                    },
                    status => Err(PaymentFlowError::InvalidState(format!(
                        "Order [{}] became {status} before the payment could be recorded",
                        current.order_no
                    ))),
                }
            },
        }
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
    }

    pub(crate) async fn call_order_annulled_hook(&self, order: &Order) {
        self.producers.publish_order_annulled(OrderAnnulledEvent::new(order.clone())).await;
    }
}

fn check_method(order: &Order, method: PaymentMethod) -> Result<(), PaymentFlowError> {
    if order.payment_method == method {
        Ok(())
    } else {
        Err(PaymentFlowError::ValidationError(format!(
            "Order [{}] is payable by {}, not {method}",
            order.order_no, order.payment_method
        )))
    }
}
