use std::str::FromStr;

use cucumber::{then, when};
use kpg_payment_engine::{
    db_types::{Money, OrderStatusType, PaymentMethod},
    gateways::InitiationParams,
    order_objects::NewOrderRequest,
    PaymentFlowError,
};
use serde_json::{json, Value};

use crate::cucumber::PaymentWorld;

fn money(s: &str) -> Money {
    Money::from_str(s).expect("Not a valid amount")
}

fn method(s: &str) -> PaymentMethod {
    PaymentMethod::from_str(s).expect("Not a valid payment method")
}

fn callback_payload(method: PaymentMethod, amount: Money, txid: &str) -> Value {
    match method {
        PaymentMethod::Wallet => json!({"amount": {"total": amount.value()}, "transaction_id": txid}),
        PaymentMethod::Card => json!({"total_amount": amount.to_string(), "trade_no": txid}),
        PaymentMethod::Bank => json!({"amount": amount.to_string(), "query_id": txid}),
        PaymentMethod::Offline => json!({}),
    }
}

#[when(
    expr = "user {int} orders {word} #{int} for activity {int} at {word} with a discount of {word} paying by {word}"
)]
async fn create_order(
    world: &mut PaymentWorld,
    user_id: i64,
    order_type: String,
    reference: i64,
    activity_id: i64,
    original: String,
    discount: String,
    pay_by: String,
) {
    let (original, discount) = (money(&original), money(&discount));
    let request = NewOrderRequest::new(user_id, activity_id, order_type.as_str(), original, discount, method(&pay_by));
    let request = match order_type.as_str() {
        "registration" => request.with_registration_id(reference),
        "group_buy" => request.with_group_buy_id(reference),
        _ => request.with_collect_activity_id(reference),
    };
    let order = world.api().create_order(request).await.expect("Error creating order");
    world.order = Some(order);
}

#[when(expr = "the client initiates a {word} payment")]
async fn initiate_payment(world: &mut PaymentWorld, pay_by: String) {
    let id = world.order().id;
    match world.api().initiate_payment(id, method(&pay_by), None, None).await {
        Ok(params) => world.initiations.push(params),
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "the {word} gateway reports a payment of {word} with transaction id {word}")]
async fn payment_callback(world: &mut PaymentWorld, gateway: String, amount: String, txid: String) {
    let id = world.order().id;
    let method = method(&gateway);
    let payload = callback_payload(method, money(&amount), &txid);
    if let Err(e) = world.api().handle_payment_callback(id, &payload, method).await {
        world.last_error = Some(e);
    }
    world.refresh_order().await;
}

#[when(expr = "staff member {int} confirms the offline payment")]
async fn confirm_offline(world: &mut PaymentWorld, staff_id: i64) {
    let id = world.order().id;
    if let Err(e) = world.api().confirm_offline_payment(id, staff_id, None).await {
        world.last_error = Some(e);
    }
    world.refresh_order().await;
}

#[when(expr = "the user requests a refund because {string}")]
async fn request_refund(world: &mut PaymentWorld, reason: String) {
    let id = world.order().id;
    if let Err(e) = world.api().request_refund(id, Some(reason)).await {
        world.last_error = Some(e);
    }
    world.refresh_order().await;
}

#[then(expr = "the order is {word}")]
async fn check_status(world: &mut PaymentWorld, status: String) {
    let expected = OrderStatusType::from_str(&status).expect("Not a valid order status");
    let order = world.refresh_order().await;
    assert_eq!(order.status, expected, "Order status is incorrect");
}

#[then(expr = "the order amounts are {word} - {word} = {word}")]
async fn check_amounts(world: &mut PaymentWorld, original: String, discount: String, final_amount: String) {
    let order = world.order();
    assert_eq!(order.original_amount, money(&original), "Original amount is incorrect");
    assert_eq!(order.discount_amount, money(&discount), "Discount is incorrect");
    assert_eq!(order.final_amount, money(&final_amount), "Final amount is incorrect");
}

#[then(expr = "every wallet payment request asks for {int} cents for the order")]
async fn check_wallet_initiations(world: &mut PaymentWorld, cents: i64) {
    assert!(!world.initiations.is_empty(), "No payment was initiated");
    let order_no = world.order().order_no.to_string();
    for params in &world.initiations {
        let InitiationParams::Wallet(params) = params else {
            panic!("Expected wallet parameters, got {params:?}");
        };
        assert_eq!(params.total_fee, cents);
        assert_eq!(params.out_trade_no, order_no);
    }
}

#[then(expr = "the transaction id is {word}")]
async fn check_txid(world: &mut PaymentWorld, txid: String) {
    assert_eq!(world.order().transaction_id.as_deref(), Some(txid.as_str()));
}

#[then(expr = "the post-payment action ran {int} time(s)")]
async fn check_actions(world: &mut PaymentWorld, count: usize) {
    assert_eq!(world.system().actions_run(), count, "Post-payment action count is incorrect");
}

#[then(expr = "the refund amount is {word}")]
async fn check_refund(world: &mut PaymentWorld, amount: String) {
    let order = world.order();
    assert_eq!(order.refund_amount, Some(money(&amount)), "Refund amount is incorrect");
    assert!(order.refund_time.is_some(), "Refund time is not set");
}

#[then("no error occurred")]
async fn check_no_error(world: &mut PaymentWorld) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
}

#[then(expr = "the request failed with {word}")]
async fn check_error(world: &mut PaymentWorld, kind: String) {
    let err = world.last_error.take().expect("Expected the request to fail");
    let matched = match kind.as_str() {
        "AmountMismatch" => matches!(err, PaymentFlowError::AmountMismatch { .. }),
        "InvalidState" => matches!(err, PaymentFlowError::InvalidState(_)),
        "ValidationError" => matches!(err, PaymentFlowError::ValidationError(_)),
        other => panic!("Unknown error kind {other}"),
    };
    assert!(matched, "Expected {kind}, got {err:?}");
}
