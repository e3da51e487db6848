use std::env;

use kpg_common::Secret;
use kpg_payment_engine::{
    config::{BankConfig, CardConfig, EngineConfig, WalletConfig},
    events::EventProducers,
    gateways::{Gateways, RefundTransport},
    OrderStore,
    PaymentFlowApi,
    PostPaymentDispatcher,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.migrate().await.expect("Error running DB migrations");
    db
}

pub fn random_db_path() -> String {
    let dir = env::temp_dir();
    format!("sqlite://{}/kpg_test_store_{}.db", dir.display(), rand::random::<u64>())
}

pub async fn create_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        if let Err(e) = Sqlite::drop_database(url).await {
            warn!("Error dropping database {url}: {e:?}");
        }
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("🚀️ Created Sqlite database {url}");
}

pub async fn tear_down<T>(api: PaymentFlowApi<SqliteDatabase, T>) {
    let mut db = api.db().clone();
    let url = db.url().to_string();
    drop(api);
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Failed to remove database {url}: {e}");
    }
}

/// An engine configuration with credentials for every gateway.
pub fn test_config(url: &str) -> EngineConfig {
    let mut config = EngineConfig { database_url: url.to_string(), ..Default::default() };
    config.gateways.wallet = WalletConfig {
        app_id: "wx-test-app".into(),
        merchant_id: "1900000109".into(),
        api_key: Secret::new("wallet-test-key".into()),
        refund_url: "https://wallet.test/v3/refund".into(),
    };
    config.gateways.card = CardConfig {
        app_id: "card-test-app".into(),
        signing_key: Secret::new("card-test-key".into()),
        refund_url: "https://card.test/gateway".into(),
    };
    config.gateways.bank = BankConfig {
        merchant_id: "777290058110048".into(),
        signing_key: Secret::new("bank-test-key".into()),
        refund_url: "https://bank.test/backTransReq".into(),
        currency_code: "CNY".into(),
    };
    config
}

pub async fn setup_with<T: RefundTransport>(
    transport: T,
    dispatcher: PostPaymentDispatcher,
    producers: EventProducers,
) -> PaymentFlowApi<SqliteDatabase, T> {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    let config = test_config(&url);
    let gateways = Gateways::new(&config.gateways, &config.offline, transport);
    PaymentFlowApi::new(db, gateways, dispatcher, producers, &config)
}

pub async fn setup<T: RefundTransport>(transport: T) -> PaymentFlowApi<SqliteDatabase, T> {
    setup_with(transport, PostPaymentDispatcher::default(), EventProducers::default()).await
}
