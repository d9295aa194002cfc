use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercato_catalog::{Product, StockTx};
use mercato_core::{CoreResult, OrderId, OrderItemId, ProductId, UserId};

use crate::models::{CartItem, Customer, NewOrder, NewPayment, Order, OrderItem, Payment};

/// Persistence for the order workflow.
///
/// Reads outside a transaction are plain snapshots; every mutation goes
/// through [`OrderTx`], obtained from [`OrderStore::begin`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> CoreResult<Box<dyn OrderTx>>;

    async fn find_customer(&self, user_id: UserId) -> CoreResult<Option<Customer>>;

    async fn cart_items(&self, user_id: UserId) -> CoreResult<Vec<CartItem>>;

    /// Order with its items.
    async fn get_order(&self, order_id: OrderId) -> CoreResult<Option<Order>>;

    /// A user's orders, newest first, optionally filtered on `is_paid`.
    async fn list_orders(&self, user_id: UserId, is_paid: Option<bool>) -> CoreResult<Vec<Order>>;

    /// Ids of unpaid orders created strictly before `cutoff`, oldest first.
    async fn find_unpaid_before(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<OrderId>>;

    async fn get_payment(&self, order_id: OrderId) -> CoreResult<Option<Payment>>;
}

/// A unit of work. Dropping it without [`OrderTx::commit`] rolls everything back.
#[async_trait]
pub trait OrderTx: StockTx {
    async fn find_customer(&mut self, user_id: UserId) -> CoreResult<Option<Customer>>;

    /// Cart rows in the order they were added.
    async fn cart_items(&mut self, user_id: UserId) -> CoreResult<Vec<CartItem>>;

    /// Load and row-lock products. Locks are taken in ascending id order.
    async fn lock_products(&mut self, product_ids: &[ProductId]) -> CoreResult<Vec<Product>>;

    async fn insert_order(&mut self, order: &NewOrder) -> CoreResult<Order>;

    async fn insert_order_item(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> CoreResult<OrderItem>;

    /// Row-lock the order and load it with its items.
    async fn lock_order(&mut self, order_id: OrderId) -> CoreResult<Option<Order>>;

    async fn delete_order_item(&mut self, item_id: OrderItemId) -> CoreResult<()>;

    async fn delete_order(&mut self, order_id: OrderId) -> CoreResult<()>;

    async fn mark_order_paid(&mut self, order_id: OrderId) -> CoreResult<()>;

    /// Row-lock the payment attached to an order.
    async fn lock_payment(&mut self, order_id: OrderId) -> CoreResult<Option<Payment>>;

    /// Remove every payment row of the order, returning how many were removed.
    async fn delete_payments(&mut self, order_id: OrderId) -> CoreResult<u64>;

    async fn insert_payment(&mut self, payment: &NewPayment) -> CoreResult<Payment>;

    /// Persist `status` and `payment_method` of an existing payment.
    async fn update_payment(&mut self, payment: &Payment) -> CoreResult<()>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;
}
