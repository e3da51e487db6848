use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures_util::future::join_all;
use kpg_payment_engine::{
    db_types::{Money, OrderStatusType, PaymentMethod},
    events::{EventHandlers, EventHooks},
    order_objects::{CallbackAck, NewOrderRequest},
    PostPaymentDispatcher,
};
use log::*;
use serde_json::json;

use crate::support::{
    mocks::no_refunds,
    prepare_env::{setup_with, tear_down},
};

mod support;

const NUM_DELIVERIES: usize = 10;

#[tokio::test]
async fn duplicate_deliveries_have_one_winner() {
    let actions = Arc::new(AtomicUsize::new(0));
    let paid_events = Arc::new(AtomicUsize::new(0));
    let notifications = Arc::new(AtomicUsize::new(0));

    let a = actions.clone();
    let dispatcher = PostPaymentDispatcher::default().on_group_buy(move |order| {
        let a = a.clone();
        async move {
            debug!("🚀️ Settling group-buy share for {}", order.order_no);
            a.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    let mut hooks = EventHooks::default();
    let p = paid_events.clone();
    hooks.on_order_paid(move |ev| {
        let p = p.clone();
        Box::pin(async move {
            info!("🚀️ Order paid: {}", ev.order.order_no);
            p.fetch_add(1, Ordering::SeqCst);
        })
    });
    let n = notifications.clone();
    hooks.on_notification(move |ev| {
        let n = n.clone();
        Box::pin(async move {
            info!("🚀️ Notification for user #{}: {}", ev.user_id, ev.title);
            n.fetch_add(1, Ordering::SeqCst);
        })
    });
    let handlers = EventHandlers::new(NUM_DELIVERIES, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = setup_with(no_refunds(), dispatcher, producers).await;
    let request =
        NewOrderRequest::new(42, 8, "group_buy", Money::from_major(60), Money::from_major(10), PaymentMethod::Wallet)
            .with_group_buy_id(5);
    let order = api.create_order(request).await.unwrap();
    let payload = json!({"amount": {"total": 5000}, "transaction_id": "4200009"});

    let deliveries =
        (0..NUM_DELIVERIES).map(|_| api.acknowledge_payment_callback(order.id, &payload, PaymentMethod::Wallet));
    let acks = join_all(deliveries).await;
    let processed = acks.iter().filter(|a| **a == CallbackAck::Processed).count();
    let duplicates = acks.iter().filter(|a| **a == CallbackAck::Duplicate).count();
    assert_eq!(processed, 1, "{acks:?}");
    assert_eq!(duplicates, NUM_DELIVERIES - 1, "{acks:?}");

    let order = api.fetch_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(order.transaction_id.as_deref(), Some("4200009"));
    assert_eq!(actions.load(Ordering::SeqCst), 1);

    tear_down(api).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(paid_events.load(Ordering::SeqCst), 1);
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn offline_confirmation_races_a_cancellation() {
    let api = setup_with(no_refunds(), PostPaymentDispatcher::default(), Default::default()).await;
    let request =
        NewOrderRequest::new(42, 7, "registration", Money::from_major(80), Money::from_minor(0), PaymentMethod::Offline)
            .with_registration_id(3);
    let order = api.create_order(request).await.unwrap();
    let (confirmed, cancelled) =
        tokio::join!(api.confirm_offline_payment(order.id, 5, None), api.cancel_offline_payment(order.id, "Withdrawn"));
    assert!(confirmed.is_ok() ^ cancelled.is_ok(), "Exactly one must win: {confirmed:?} / {cancelled:?}");
    let order = api.fetch_order(order.id).await.unwrap();
    let expected = if confirmed.is_ok() { OrderStatusType::Paid } else { OrderStatusType::Cancelled };
    assert_eq!(order.status, expected);
    tear_down(api).await;
}
