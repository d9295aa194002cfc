use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Events emitted by the order workflow once the corresponding transaction has committed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShopEvent {
    OrderPlaced(OrderPlacedEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderPaid(OrderPaidEvent),
    PaymentCanceled(PaymentCanceledEvent),
    UnpaidOrdersSwept(UnpaidOrdersSweptEvent),
}

impl ShopEvent {
    /// Stable name used as the log target / topic for the event.
    pub fn name(&self) -> &'static str {
        match self {
            ShopEvent::OrderPlaced(_) => "order.placed",
            ShopEvent::OrderCancelled(_) => "order.cancelled",
            ShopEvent::OrderPaid(_) => "order.paid",
            ShopEvent::PaymentCanceled(_) => "payment.canceled",
            ShopEvent::UnpaidOrdersSwept(_) => "orders.swept",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderPlacedEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub total: Decimal,
    pub line_count: usize,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderCancelledEvent {
    pub order_id: i64,
    pub user_id: i64,
    /// False when the order was already paid and its stock stayed allocated.
    pub stock_released: bool,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderPaidEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentCanceledEvent {
    pub order_id: i64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UnpaidOrdersSweptEvent {
    pub deleted: usize,
    pub failed: usize,
    pub cutoff: i64,
    pub timestamp: i64,
}
