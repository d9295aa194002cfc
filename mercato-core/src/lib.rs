pub mod identity;
pub mod payment;

use serde::Serialize;
use std::collections::BTreeMap;

pub use identity::{AddressId, OrderId, OrderItemId, PaymentId, ProductId, UserId};

/// Message attached to every out-of-stock rejection.
pub const OUT_OF_STOCK_DETAIL: &str =
    "The quantity of ordered items exceeds product quantity in stock";

/// Every line that could not be covered by current stock, keyed by product name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockShortfall {
    pub detail: String,
    /// `"<requested> > <available>"` per product.
    pub products: BTreeMap<String, String>,
}

impl StockShortfall {
    pub fn new(products: BTreeMap<String, String>) -> Self {
        Self {
            detail: OUT_OF_STOCK_DETAIL.to_string(),
            products,
        }
    }

    pub fn line_message(requested: i32, available: i32) -> String {
        format!("{} > {}", requested, available)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{}", .0.detail)]
    OutOfStock(StockShortfall),
    #[error("Already paid: {0}")]
    AlreadyPaid(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<payment::GatewayError> for CoreError {
    fn from(err: payment::GatewayError) -> Self {
        CoreError::Gateway(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortfall_payload_shape() {
        let mut products = BTreeMap::new();
        products.insert("Kettle".to_string(), StockShortfall::line_message(3, 1));
        let shortfall = StockShortfall::new(products);

        let json = serde_json::to_value(&shortfall).unwrap();
        assert_eq!(json["detail"], OUT_OF_STOCK_DETAIL);
        assert_eq!(json["products"]["Kettle"], "3 > 1");
    }
}
