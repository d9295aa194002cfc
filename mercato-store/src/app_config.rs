use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout_seconds() -> u64 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Payment provider account. `shop_id`/`secret_key` are the HTTP basic auth pair.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub api_base: String,
    pub shop_id: String,
    pub secret_key: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_currency() -> String { "RUB".to_string() }
fn default_timeout_seconds() -> u64 { 10 }

impl PaymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrdersConfig {
    pub unpaid_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            unpaid_ttl_seconds: mercato_order::models::DEFAULT_UNPAID_TTL_SECONDS,
            sweep_interval_seconds: 600,
        }
    }
}

impl OrdersConfig {
    /// `None` when the configured value does not fit a `chrono::Duration`.
    pub fn unpaid_ttl(&self) -> Option<chrono::Duration> {
        let seconds = i64::try_from(self.unpaid_ttl_seconds).ok()?;
        chrono::Duration::try_seconds(seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Networks allowed to post payment notifications. Empty means the provider's published ranges.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    #[serde(default)]
    pub allowed_networks: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `MERCATO__PAYMENT__SECRET_KEY=...`
            .add_source(config::Environment::with_prefix("MERCATO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
