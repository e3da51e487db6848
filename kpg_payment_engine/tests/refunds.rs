use kpg_payment_engine::{
    db_types::{Money, OrderStatusType, PaymentMethod},
    gateways::{GatewayError, RefundResponse},
    order_objects::{CallbackAck, NewOrderRequest},
    PaymentFlowError,
    DEFAULT_REFUND_REASON,
};
use serde_json::json;

use crate::support::{
    mocks::{accepting_wallet_refunds, no_refunds, MockTransport},
    prepare_env::{setup, tear_down},
};

mod support;

fn request(method: PaymentMethod) -> NewOrderRequest {
    NewOrderRequest::new(42, 7, "group_buy", Money::from_major(100), Money::from_major(20), method)
        .with_group_buy_id(12)
}

#[tokio::test]
async fn paid_wallet_order_is_refunded_in_full() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|req| {
            req.method == PaymentMethod::Wallet &&
                req.url == "https://wallet.test/v3/refund" &&
                req.body["refund_fee"] == "8000" &&
                req.body["refund_desc"] == "Class cancelled" &&
                req.body["transaction_id"] == "4200001"
        })
        .times(1)
        .returning(|_| Ok(RefundResponse::new(200, json!({"result_code": "SUCCESS"}))));
    let api = setup(transport).await;
    let order = api.create_order(request(PaymentMethod::Wallet)).await.unwrap();
    let payload = json!({"amount": {"total": 8000}, "transaction_id": "4200001"});
    api.handle_payment_callback(order.id, &payload, PaymentMethod::Wallet).await.unwrap();

    let refunded = api.request_refund(order.id, Some("Class cancelled".into())).await.expect("Refund failed");
    assert_eq!(refunded.status, OrderStatusType::Refunded);
    assert_eq!(refunded.refund_amount, Some(Money::from_major(80)));
    assert_eq!(refunded.refund_reason.as_deref(), Some("Class cancelled"));
    assert!(refunded.refund_time.is_some());
    assert_eq!(refunded.transaction_id.as_deref(), Some("4200001"));
    tear_down(api).await;
}

#[tokio::test]
async fn blank_reason_gets_the_default() {
    let api = setup(accepting_wallet_refunds(1)).await;
    let order = api.create_order(request(PaymentMethod::Wallet)).await.unwrap();
    let payload = json!({"total_fee": "8000", "transaction_id": "4200002"});
    api.handle_payment_callback(order.id, &payload, PaymentMethod::Wallet).await.unwrap();
    let refunded = api.request_refund(order.id, Some("   ".into())).await.expect("Refund failed");
    assert_eq!(refunded.refund_reason.as_deref(), Some(DEFAULT_REFUND_REASON));
    tear_down(api).await;
}

#[tokio::test]
async fn only_paid_orders_can_be_refunded() {
    let api = setup(no_refunds()).await;
    let order = api.create_order(request(PaymentMethod::Wallet)).await.unwrap();
    let err = api.request_refund(order.id, None).await.expect_err("Pending orders are not refundable");
    assert!(matches!(err, PaymentFlowError::InvalidState(_)));
    assert_eq!(api.fetch_order(order.id).await.unwrap().status, OrderStatusType::Pending);

    api.handle_payment_failure(order.id, "USERPAYING", "Timed out", PaymentMethod::Wallet).await;
    let err = api.request_refund(order.id, None).await.expect_err("Cancelled orders are not refundable");
    assert!(matches!(err, PaymentFlowError::InvalidState(_)));
    let err = api.request_refund(order.id + 1, None).await.expect_err("No such order");
    assert!(matches!(err, PaymentFlowError::OrderNotFound(_)));
    tear_down(api).await;
}

#[tokio::test]
async fn refunds_happen_once() {
    let api = setup(accepting_wallet_refunds(1)).await;
    let order = api.create_order(request(PaymentMethod::Wallet)).await.unwrap();
    let payload = json!({"amount": {"total": 8000}, "transaction_id": "4200003"});
    api.handle_payment_callback(order.id, &payload, PaymentMethod::Wallet).await.unwrap();
    api.request_refund(order.id, None).await.expect("Refund failed");
    let err = api.request_refund(order.id, None).await.expect_err("Already refunded");
    assert!(matches!(err, PaymentFlowError::InvalidState(_)));

    // A late re-delivery of the original payment notification is a duplicate, not a new payment
    let ack = api.acknowledge_payment_callback(order.id, &payload, PaymentMethod::Wallet).await;
    assert_eq!(ack, CallbackAck::Duplicate);
    let replayed = api.handle_payment_callback(order.id, &payload, PaymentMethod::Wallet).await.unwrap();
    assert_eq!(replayed.status, OrderStatusType::Refunded);
    tear_down(api).await;
}

#[tokio::test]
async fn declined_refund_leaves_order_paid() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(1)
        .returning(|_| Ok(RefundResponse::new(200, json!({"code": "40004", "sub_msg": "ACQ.TRADE_NOT_ALLOW_REFUND"}))));
    let api = setup(transport).await;
    let order = api.create_order(request(PaymentMethod::Card)).await.unwrap();
    let payload = json!({"total_amount": "80.00", "trade_no": "2024101622001"});
    api.handle_payment_callback(order.id, &payload, PaymentMethod::Card).await.unwrap();
    let err = api.request_refund(order.id, None).await.expect_err("Refund was declined");
    assert!(matches!(err, PaymentFlowError::Gateway(GatewayError::RefundRejected(_))));
    let order = api.fetch_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
    assert!(order.refund_time.is_none());
    tear_down(api).await;
}

#[tokio::test]
async fn unreachable_gateway_leaves_order_paid() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(1).returning(|_| Err(GatewayError::Transport("connection timed out".into())));
    let api = setup(transport).await;
    let order = api.create_order(request(PaymentMethod::Bank)).await.unwrap();
    let payload = json!({"amount": "80.00", "query_id": "Q77"});
    api.handle_payment_callback(order.id, &payload, PaymentMethod::Bank).await.unwrap();
    let err = api.request_refund(order.id, Some("Duplicate payment".into())).await.expect_err("Transport failed");
    assert!(matches!(err, PaymentFlowError::Gateway(GatewayError::Transport(_))));
    assert_eq!(api.fetch_order(order.id).await.unwrap().status, OrderStatusType::Paid);
    tear_down(api).await;
}

#[tokio::test]
async fn offline_refunds_settle_without_a_gateway() {
    let api = setup(no_refunds()).await;
    let order = api.create_order(request(PaymentMethod::Offline)).await.unwrap();
    api.confirm_offline_payment(order.id, 5, None).await.unwrap();
    let refunded = api.request_refund(order.id, Some("Returned in cash".into())).await.expect("Refund failed");
    assert_eq!(refunded.status, OrderStatusType::Refunded);
    assert_eq!(refunded.refund_amount, Some(Money::from_major(80)));
    tear_down(api).await;
}
