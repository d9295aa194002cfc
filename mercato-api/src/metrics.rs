//! Prometheus counters for the order workflow and the `/metrics` endpoint.

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub orders_created: IntCounter,
    pub orders_expired: IntCounter,
    pub webhooks_rejected: IntCounter,
    pub payments_settled: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_created = counter(&registry, "mercato_orders_created_total", "Orders placed.")?;
        let orders_expired = counter(
            &registry,
            "mercato_orders_expired_total",
            "Unpaid orders removed by the expiry sweep.",
        )?;
        let webhooks_rejected = counter(
            &registry,
            "mercato_webhooks_rejected_total",
            "Payment notifications refused by the origin check.",
        )?;
        let payments_settled = counter(
            &registry,
            "mercato_payments_settled_total",
            "Payments that moved an order to paid.",
        )?;

        Ok(Self {
            registry,
            orders_created,
            orders_expired,
            webhooks_rejected,
            payments_settled,
        })
    }

    pub fn render(&self) -> Result<(String, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut encoded = Vec::new();
        encoder.encode(&self.registry.gather(), &mut encoded)?;
        Ok((
            encoder.format_type().to_string(),
            String::from_utf8_lossy(&encoded).into_owned(),
        ))
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let (content_type, body) = state
        .metrics
        .render()
        .map_err(|e| AppError::InternalServerError(format!("failed to encode metrics: {}", e)))?;
    Ok((StatusCode::OK, [(CONTENT_TYPE, content_type)], body))
}
