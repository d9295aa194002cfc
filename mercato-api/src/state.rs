use mercato_core::payment::PaymentGateway;
use mercato_order::{
    CheckoutGate, EventPublisher, ExpirySweeper, IpAllowList, OrderManager, OrderStore,
    PaymentOrchestrator, PaymentReconciler,
};
use mercato_store::app_config::Config;
use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// Runtime knobs of the order services, usually read from [`Config`].
#[derive(Clone)]
pub struct ServiceOptions {
    pub jwt_secret: String,
    pub currency: String,
    pub gateway_timeout: Duration,
    pub unpaid_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    pub allow_list: IpAllowList,
}

impl ServiceOptions {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            currency: mercato_order::orchestrator::DEFAULT_CURRENCY.to_string(),
            gateway_timeout: mercato_order::orchestrator::DEFAULT_GATEWAY_TIMEOUT,
            unpaid_ttl: mercato_order::models::default_unpaid_ttl(),
            sweep_interval: Duration::from_secs(600),
            allow_list: IpAllowList::default(),
        }
    }

    /// Rejects zero durations and a TTL that does not fit `chrono::Duration`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        if config.orders.unpaid_ttl_seconds == 0 {
            bail!("orders.unpaid_ttl_seconds must be greater than zero");
        }
        if config.orders.sweep_interval_seconds == 0 {
            bail!("orders.sweep_interval_seconds must be greater than zero");
        }
        if config.payment.timeout_seconds == 0 {
            bail!("payment.timeout_seconds must be greater than zero");
        }
        let unpaid_ttl = config
            .orders
            .unpaid_ttl()
            .context("orders.unpaid_ttl_seconds is out of range")?;

        let allow_list = if config.webhook.allowed_networks.is_empty() {
            IpAllowList::default()
        } else {
            IpAllowList::from_cidrs(&config.webhook.allowed_networks)?
        };

        Ok(Self {
            jwt_secret: config.auth.jwt_secret.clone(),
            currency: config.payment.currency.clone(),
            gateway_timeout: config.payment.timeout(),
            unpaid_ttl,
            sweep_interval: config.orders.sweep_interval(),
            allow_list,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderManager>,
    pub gate: Arc<CheckoutGate>,
    pub payments: Arc<PaymentOrchestrator>,
    pub reconciler: Arc<PaymentReconciler>,
    pub sweeper: Arc<ExpirySweeper>,
    pub allow_list: Arc<IpAllowList>,
    pub events: EventPublisher,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        options: ServiceOptions,
    ) -> anyhow::Result<Self> {
        let events = EventPublisher::default();
        let orders = Arc::new(OrderManager::new(store.clone(), events.clone()));
        let payments = PaymentOrchestrator::new(store.clone(), gateway)
            .with_currency(options.currency)
            .with_timeout(options.gateway_timeout);
        let sweeper = ExpirySweeper::new(store.clone(), orders.clone()).with_ttl(options.unpaid_ttl);

        Ok(Self {
            gate: Arc::new(CheckoutGate::new(store.clone())),
            reconciler: Arc::new(PaymentReconciler::new(store, events.clone())),
            payments: Arc::new(payments),
            sweeper: Arc::new(sweeper),
            orders,
            allow_list: Arc::new(options.allow_list),
            events,
            metrics: Arc::new(Metrics::new()?),
            auth: AuthConfig {
                secret: options.jwt_secret,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_store::app_config::{
        AuthConfig as JwtConfig, DatabaseConfig, OrdersConfig, PaymentConfig, ServerConfig,
        WebhookConfig,
    };

    fn config() -> Config {
        Config {
            server: ServerConfig { port: 8000 },
            database: DatabaseConfig {
                url: "postgres://localhost/mercato".to_string(),
                max_connections: 5,
                acquire_timeout_seconds: 3,
            },
            auth: JwtConfig {
                jwt_secret: "secret".to_string(),
            },
            payment: PaymentConfig {
                api_base: "https://api.yookassa.ru/v3".to_string(),
                shop_id: "1".to_string(),
                secret_key: "k".to_string(),
                currency: "RUB".to_string(),
                timeout_seconds: 10,
            },
            orders: OrdersConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }

    #[test]
    fn test_options_from_defaults() {
        let options = ServiceOptions::from_config(&config()).unwrap();
        assert_eq!(options.unpaid_ttl, chrono::Duration::hours(3));
        assert_eq!(options.sweep_interval, Duration::from_secs(600));
        assert_eq!(options.gateway_timeout, Duration::from_secs(10));
        assert_eq!(options.allow_list, IpAllowList::default());
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        let mut cfg = config();
        cfg.orders.unpaid_ttl_seconds = 0;
        assert!(ServiceOptions::from_config(&cfg).is_err());

        let mut cfg = config();
        cfg.orders.sweep_interval_seconds = 0;
        assert!(ServiceOptions::from_config(&cfg).is_err());

        let mut cfg = config();
        cfg.payment.timeout_seconds = 0;
        assert!(ServiceOptions::from_config(&cfg).is_err());

        let mut cfg = config();
        cfg.orders.unpaid_ttl_seconds = u64::MAX;
        assert!(ServiceOptions::from_config(&cfg).is_err());
    }

    #[test]
    fn test_bad_network_is_rejected() {
        let mut cfg = config();
        cfg.webhook.allowed_networks = vec!["10.0.0.1/8".to_string()];
        assert!(ServiceOptions::from_config(&cfg).is_err());
    }
}
