use chrono::{DateTime, Duration, Utc};
use mercato_core::payment::PaymentStatus;
use mercato_core::{AddressId, OrderId, OrderItemId, PaymentId, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default lifetime of an unpaid order before the sweeper removes it.
pub const DEFAULT_UNPAID_TTL_SECONDS: u64 = 3 * 60 * 60;

pub fn default_unpaid_ttl() -> Duration {
    Duration::seconds(DEFAULT_UNPAID_TTL_SECONDS as i64)
}

/// Account data the order workflow reads from the user subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: UserId,
    pub email: String,
    pub shipping_address_id: Option<AddressId>,
}

/// One row of a user's cart. Unique per (user, product).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// A customer's purchase.
///
/// Nothing but `is_paid` and the timestamps ever changes after creation;
/// `total` is frozen from the cart snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub shipping_address_id: Option<AddressId>,
    pub total: Decimal,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Unpaid and older than `ttl` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.is_paid && self.created_at < now - ttl
    }
}

/// A product line of an order. Quantity is frozen at order creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub shipping_address_id: Option<AddressId>,
    pub total: Decimal,
}

/// Local record of the current payment attempt for an order (at most one per order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    /// Provider's method type (`bank_card`, `sbp`, ...); only set on success.
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(created_at: DateTime<Utc>, is_paid: bool) -> Order {
        Order {
            id: OrderId(1),
            user_id: UserId(1),
            shipping_address_id: None,
            total: Decimal::ZERO,
            is_paid,
            created_at,
            updated_at: created_at,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_order_expiry_window() {
        let now = Utc::now();
        assert!(order(now - Duration::hours(4), false).is_expired(now, default_unpaid_ttl()));
        assert!(!order(now - Duration::hours(2), false).is_expired(now, default_unpaid_ttl()));
        assert!(!order(now - Duration::hours(4), true).is_expired(now, default_unpaid_ttl()));
    }
}
