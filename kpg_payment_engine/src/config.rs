//! Engine configuration.
//!
//! Everything is read from `KPG_*` environment variables with [`EngineConfig::from_env_or_default`]. Missing or
//! invalid values are logged and replaced with defaults, so a misconfigured engine still starts (but gateway calls
//! made with empty credentials will be rejected by the gateways).
use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use kpg_common::{
    helpers::{parse_boolean_flag, parse_env_var},
    Secret,
    DEFAULT_CURRENCY_CODE,
};
use log::*;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/kpg_store.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;
const DEFAULT_RETURN_URL: &str = "http://localhost:8080/payment/return";
const DEFAULT_NOTIFY_URL: &str = "http://localhost:8080/payment/notify";
const DEFAULT_REFUND_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const DEFAULT_OFFLINE_PAYMENT_WINDOW: Duration = Duration::hours(48);
const DEFAULT_OFFLINE_CONTACT: &str = "Kindergarten front desk";
const DEFAULT_OFFLINE_LOCATION: &str = "Kindergarten reception office";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    /// The channel capacity for each event handler
    pub event_buffer_size: usize,
    /// Where the gateway sends the user after paying, if the caller does not supply a URL
    pub default_return_url: String,
    /// Where the gateway sends its asynchronous callbacks, if the caller does not supply a URL
    pub default_notify_url: String,
    pub gateways: GatewayConfig,
    pub offline: OfflineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            default_return_url: DEFAULT_RETURN_URL.to_string(),
            default_notify_url: DEFAULT_NOTIFY_URL.to_string(),
            gateways: GatewayConfig::default(),
            offline: OfflineConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("KPG_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ KPG_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let db_max_connections = env_or_default("KPG_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS);
        let event_buffer_size = env_or_default("KPG_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        let default_return_url = env::var("KPG_DEFAULT_RETURN_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ KPG_DEFAULT_RETURN_URL is not set. Using {DEFAULT_RETURN_URL}.");
            DEFAULT_RETURN_URL.to_string()
        });
        let default_notify_url = env::var("KPG_DEFAULT_NOTIFY_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ KPG_DEFAULT_NOTIFY_URL is not set. Using {DEFAULT_NOTIFY_URL}.");
            DEFAULT_NOTIFY_URL.to_string()
        });
        Self {
            database_url,
            db_max_connections,
            event_buffer_size,
            default_return_url,
            default_notify_url,
            gateways: GatewayConfig::from_env_or_default(),
            offline: OfflineConfig::from_env_or_default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub wallet: WalletConfig,
    pub card: CardConfig,
    pub bank: BankConfig,
    /// Applied to every outbound refund request
    pub refund_timeout: StdDuration,
    /// When true, the gateways are expected to be their sandbox deployments. This is only reported in the logs; the
    /// refund URLs decide where requests actually go.
    pub sandbox: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            wallet: WalletConfig::default(),
            card: CardConfig::default(),
            bank: BankConfig::default(),
            refund_timeout: DEFAULT_REFUND_TIMEOUT,
            sandbox: true,
        }
    }
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let refund_timeout =
            StdDuration::from_secs(env_or_default("KPG_REFUND_TIMEOUT_SECS", DEFAULT_REFUND_TIMEOUT.as_secs()));
        let sandbox = parse_boolean_flag(env::var("KPG_GATEWAY_SANDBOX").ok(), true);
        if sandbox {
            warn!("🪛️ Payment gateways are running in sandbox mode. Set KPG_GATEWAY_SANDBOX=0 in production.");
        }
        Self {
            wallet: WalletConfig::from_env(),
            card: CardConfig::from_env(),
            bank: BankConfig::from_env(),
            refund_timeout,
            sandbox,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WalletConfig {
    pub app_id: String,
    pub merchant_id: String,
    pub api_key: Secret<String>,
    pub refund_url: String,
}

impl WalletConfig {
    pub fn from_env() -> Self {
        Self {
            app_id: required_var("KPG_WALLET_APP_ID"),
            merchant_id: required_var("KPG_WALLET_MERCHANT_ID"),
            api_key: Secret::new(required_var("KPG_WALLET_API_KEY")),
            refund_url: required_var("KPG_WALLET_REFUND_URL"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CardConfig {
    pub app_id: String,
    pub signing_key: Secret<String>,
    pub refund_url: String,
}

impl CardConfig {
    pub fn from_env() -> Self {
        Self {
            app_id: required_var("KPG_CARD_APP_ID"),
            signing_key: Secret::new(required_var("KPG_CARD_SIGNING_KEY")),
            refund_url: required_var("KPG_CARD_REFUND_URL"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BankConfig {
    pub merchant_id: String,
    pub signing_key: Secret<String>,
    pub refund_url: String,
    pub currency_code: String,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            merchant_id: String::default(),
            signing_key: Secret::default(),
            refund_url: String::default(),
            currency_code: DEFAULT_CURRENCY_CODE.to_string(),
        }
    }
}

impl BankConfig {
    pub fn from_env() -> Self {
        let currency_code = env::var("KPG_BANK_CURRENCY_CODE").ok().unwrap_or_else(|| {
            info!("🪛️ KPG_BANK_CURRENCY_CODE is not set. Using {DEFAULT_CURRENCY_CODE}.");
            DEFAULT_CURRENCY_CODE.to_string()
        });
        Self {
            merchant_id: required_var("KPG_BANK_MERCHANT_ID"),
            signing_key: Secret::new(required_var("KPG_BANK_SIGNING_KEY")),
            refund_url: required_var("KPG_BANK_REFUND_URL"),
            currency_code,
        }
    }
}

/// Instructions handed to users who choose to pay offline.
#[derive(Clone, Debug)]
pub struct OfflineConfig {
    pub contact: String,
    pub location: String,
    /// How long after creation an offline order may stay unpaid
    pub payment_window: Duration,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            contact: DEFAULT_OFFLINE_CONTACT.to_string(),
            location: DEFAULT_OFFLINE_LOCATION.to_string(),
            payment_window: DEFAULT_OFFLINE_PAYMENT_WINDOW,
        }
    }
}

impl OfflineConfig {
    pub fn from_env_or_default() -> Self {
        let contact = env::var("KPG_OFFLINE_CONTACT").ok().unwrap_or_else(|| DEFAULT_OFFLINE_CONTACT.to_string());
        let location = env::var("KPG_OFFLINE_LOCATION").ok().unwrap_or_else(|| DEFAULT_OFFLINE_LOCATION.to_string());
        let hours = env_or_default("KPG_OFFLINE_PAYMENT_WINDOW_HOURS", DEFAULT_OFFLINE_PAYMENT_WINDOW.num_hours());
        let payment_window = if hours > 0 {
            Duration::hours(hours)
        } else {
            warn!("🪛️ KPG_OFFLINE_PAYMENT_WINDOW_HOURS must be positive. Using the default instead.");
            DEFAULT_OFFLINE_PAYMENT_WINDOW
        };
        Self { contact, location, payment_window }
    }
}

fn required_var(key: &str) -> String {
    env::var(key).ok().unwrap_or_else(|| {
        error!("🪛️ {key} is not set. Requests that need it will be rejected by the gateway.");
        String::default()
    })
}

fn env_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match parse_env_var::<T>(key) {
        Ok(Some(v)) => v,
        Ok(None) => default,
        Err(e) => {
            error!("🪛️ {e}. Using the default, {default}, instead.");
            default
        },
    }
}
