//! YooKassa payments API client.

use async_trait::async_trait;
use mercato_core::payment::{GatewayError, PaymentConfirmation, PaymentGateway, RemotePaymentRequest};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::app_config::PaymentConfig;

#[derive(Debug, Clone)]
pub struct YooKassaGateway {
    http: Client,
    api_base: String,
    shop_id: String,
    secret_key: String,
    timeout: Duration,
}

impl YooKassaGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            shop_id: config.shop_id.clone(),
            secret_key: config.secret_key.clone(),
            timeout: config.timeout(),
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Body of `POST /payments`. Captured immediately, redirect confirmation.
pub fn payment_body(request: &RemotePaymentRequest) -> Value {
    json!({
        "amount": {
            "value": format!("{:.2}", request.amount),
            "currency": request.currency,
        },
        "confirmation": {
            "type": "redirect",
            "return_url": request.return_url,
        },
        "capture": true,
        "description": request.description,
        "metadata": {
            "order_id": request.order_id.to_string(),
        },
    })
}

#[derive(Debug, Deserialize)]
struct CreatedPayment {
    #[serde(default)]
    id: Option<String>,
    confirmation: Option<Confirmation>,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    confirmation_url: Option<String>,
}

fn parse_confirmation(body: &str) -> Result<PaymentConfirmation, GatewayError> {
    let created: CreatedPayment =
        serde_json::from_str(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    let confirmation_url = created
        .confirmation
        .and_then(|c| c.confirmation_url)
        .ok_or_else(|| GatewayError::InvalidResponse("missing confirmation_url".to_string()))?;
    debug!("Provider payment {:?} awaiting confirmation", created.id);
    Ok(PaymentConfirmation { confirmation_url })
}

#[async_trait]
impl PaymentGateway for YooKassaGateway {
    async fn create_remote_payment(
        &self,
        request: &RemotePaymentRequest,
    ) -> Result<PaymentConfirmation, GatewayError> {
        let url = format!("{}/payments", self.api_base);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", request.idempotency_key.to_string())
            .json(&payment_body(request))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            warn!("Payment creation for order {} rejected with {}", request.order_id, status);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_confirmation(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_core::OrderId;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn test_payment_body_shape() {
        let request = RemotePaymentRequest {
            idempotency_key: Uuid::new_v4(),
            order_id: OrderId(12),
            amount: Decimal::new(100, 0),
            currency: "RUB".to_string(),
            return_url: "https://shop.example/done".to_string(),
            description: "Payment for order #12 for a@example.com".to_string(),
        };

        let body = payment_body(&request);

        assert_eq!(body["amount"]["value"], "100.00");
        assert_eq!(body["amount"]["currency"], "RUB");
        assert_eq!(body["confirmation"]["type"], "redirect");
        assert_eq!(body["confirmation"]["return_url"], "https://shop.example/done");
        assert_eq!(body["capture"], true);
        assert_eq!(body["metadata"]["order_id"], "12");
    }

    #[test]
    fn test_parse_confirmation() {
        let ok = r#"{
            "id": "2c5a5a4e-000f-5000-9000-1b2b9a5c9a8b",
            "status": "pending",
            "confirmation": {"type": "redirect", "confirmation_url": "https://yoomoney.ru/checkout?orderId=1"}
        }"#;
        assert_eq!(
            parse_confirmation(ok).unwrap().confirmation_url,
            "https://yoomoney.ru/checkout?orderId=1"
        );

        assert!(matches!(
            parse_confirmation(r#"{"id": "x", "status": "pending"}"#),
            Err(GatewayError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_confirmation("<html>"),
            Err(GatewayError::InvalidResponse(_))
        ));
    }
}
