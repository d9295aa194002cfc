use mercato_core::{CoreError, CoreResult, UserId};
use std::sync::Arc;

use crate::models::Customer;
use crate::store::OrderStore;

pub const NO_ADDRESS_MESSAGE: &str = "User must have an address to make orders!";
pub const EMPTY_CART_MESSAGE: &str = "Your cart is empty!";

/// Preconditions for placing an order: a shipping address and a non-empty cart.
pub struct CheckoutGate {
    store: Arc<dyn OrderStore>,
}

impl CheckoutGate {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self, user_id: UserId) -> CoreResult<Customer> {
        let customer = self
            .store
            .find_customer(user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {}", user_id)))?;

        if customer.shipping_address_id.is_none() {
            return Err(CoreError::Forbidden(NO_ADDRESS_MESSAGE.to_string()));
        }
        if self.store.cart_items(user_id).await?.is_empty() {
            return Err(CoreError::Forbidden(EMPTY_CART_MESSAGE.to_string()));
        }
        Ok(customer)
    }
}
