use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::OrderId;

/// Local payment status. `Succeeded` and `Canceled` are terminal.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Canceled,
}

impl PaymentStatus {
    /// Single-letter code persisted in `payments.status`.
    pub fn code(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "P",
            PaymentStatus::Succeeded => "S",
            PaymentStatus::Canceled => "C",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P" => Ok(PaymentStatus::Pending),
            "S" => Ok(PaymentStatus::Succeeded),
            "C" => Ok(PaymentStatus::Canceled),
            other => Err(format!("unknown payment status code: {}", other)),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Canceled => "canceled",
        };
        f.write_str(label)
    }
}

/// One attempt at collecting money for an order on the provider side.
#[derive(Debug, Clone, Serialize)]
pub struct RemotePaymentRequest {
    /// Fresh per attempt; the provider deduplicates retries of the same attempt on it.
    pub idempotency_key: Uuid,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub currency: String,
    pub return_url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub confirmation_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment provider did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider rejected the payment ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// Outbound side of the payment provider integration.
///
/// Implementations own their credentials; callers receive an instance through
/// their constructor instead of reaching for process-wide configuration.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_remote_payment(
        &self,
        request: &RemotePaymentRequest,
    ) -> Result<PaymentConfirmation, GatewayError>;
}
