use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use cucumber::World;
use kpg_payment_engine::{
    db_types::Order,
    events::EventProducers,
    gateways::InitiationParams,
    PaymentFlowApi,
    PaymentFlowError,
    PostPaymentDispatcher,
    SqliteDatabase,
};
use log::*;

use crate::support::{
    mocks::{accepting_refunds, MockTransport},
    prepare_env::setup_with,
};

#[derive(Default, Debug, World)]
pub struct PaymentWorld {
    pub system: Option<PaymentSystem>,
    pub order: Option<Order>,
    pub initiations: Vec<InitiationParams>,
    pub last_error: Option<PaymentFlowError>,
}

impl PaymentWorld {
    pub fn system(&self) -> &PaymentSystem {
        self.system.as_ref().expect("Payment system not initialised")
    }

    pub fn api(&self) -> &PaymentFlowApi<SqliteDatabase, MockTransport> {
        &self.system().api
    }

    pub fn order(&self) -> &Order {
        self.order.as_ref().expect("No order has been created")
    }

    pub async fn refresh_order(&mut self) -> &Order {
        let id = self.order().id;
        let order = self.api().fetch_order(id).await.expect("Error fetching order");
        self.order.insert(order)
    }
}

pub struct PaymentSystem {
    pub db_path: String,
    pub api: PaymentFlowApi<SqliteDatabase, MockTransport>,
    actions: Arc<AtomicUsize>,
}

impl Debug for PaymentSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentSystem({})", self.db_path)
    }
}

impl PaymentSystem {
    pub async fn new() -> Self {
        let actions = Arc::new(AtomicUsize::new(0));
        let counter = actions.clone();
        let count = move |order: Order| {
            let counter = counter.clone();
            async move {
                debug!("🚀️ Post-payment action for {}", order.order_no);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };
        let dispatcher = PostPaymentDispatcher::default()
            .on_registration(count.clone())
            .on_group_buy(count.clone())
            .on_collect_reward(count);
        let api = setup_with(accepting_refunds(), dispatcher, EventProducers::default()).await;
        let db_path = kpg_payment_engine::OrderStore::url(api.db()).to_string();
        Self { db_path, api, actions }
    }

    pub fn actions_run(&self) -> usize {
        self.actions.load(Ordering::SeqCst)
    }
}
