//! In-process [`OrderStore`] used by tests and local runs without Postgres.
//!
//! Transactions are serialized on a single mutex and work on a private copy of
//! the tables; `commit` swaps the copy in, dropping the transaction discards it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercato_catalog::{Product, ProductDiscount, StockTx};
use mercato_core::{
    AddressId, CoreError, CoreResult, OrderId, OrderItemId, PaymentId, ProductId, UserId,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{CartItem, Customer, NewOrder, NewPayment, Order, OrderItem, Payment};
use crate::store::{OrderStore, OrderTx};
use mercato_core::payment::PaymentStatus;

#[derive(Debug, Clone, Default)]
struct Tables {
    customers: HashMap<UserId, Customer>,
    products: BTreeMap<ProductId, Product>,
    carts: HashMap<UserId, Vec<CartItem>>,
    orders: BTreeMap<OrderId, Order>,
    items: BTreeMap<OrderItemId, OrderItem>,
    payments: BTreeMap<PaymentId, Payment>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn order_with_items(&self, order_id: OrderId) -> Option<Order> {
        let mut order = self.orders.get(&order_id)?.clone();
        order.items = self
            .items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        Some(order)
    }

    fn payment_for(&self, order_id: OrderId) -> Option<&Payment> {
        self.payments.values().find(|p| p.order_id == order_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_customer(&self, email: &str, shipping_address_id: Option<AddressId>) -> UserId {
        let mut tables = self.tables.lock().await;
        let id = UserId(tables.next_id());
        tables.customers.insert(
            id,
            Customer {
                id,
                email: email.to_string(),
                shipping_address_id,
            },
        );
        id
    }

    pub async fn set_shipping_address(&self, user_id: UserId, address: Option<AddressId>) {
        let mut tables = self.tables.lock().await;
        if let Some(customer) = tables.customers.get_mut(&user_id) {
            customer.shipping_address_id = address;
        }
    }

    pub async fn add_product(&self, name: &str, price: Decimal, qty_in_stock: i32) -> ProductId {
        let mut tables = self.tables.lock().await;
        let id = ProductId(tables.next_id());
        tables.products.insert(
            id,
            Product {
                id,
                name: name.to_string(),
                price,
                qty_in_stock,
                discount: None,
            },
        );
        id
    }

    pub async fn set_discount(&self, product_id: ProductId, discount: Option<ProductDiscount>) {
        let mut tables = self.tables.lock().await;
        if let Some(product) = tables.products.get_mut(&product_id) {
            product.discount = discount;
        }
    }

    /// Put `quantity` of a product in the user's cart, replacing an existing row.
    pub async fn add_to_cart(&self, user_id: UserId, product_id: ProductId, quantity: i32) {
        let mut tables = self.tables.lock().await;
        let cart = tables.carts.entry(user_id).or_default();
        match cart.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity = quantity,
            None => cart.push(CartItem {
                product_id,
                quantity,
            }),
        }
    }

    pub async fn stock(&self, product_id: ProductId) -> Option<i32> {
        let tables = self.tables.lock().await;
        tables.products.get(&product_id).map(|p| p.qty_in_stock)
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    pub async fn order_item_count(&self) -> usize {
        self.tables.lock().await.items.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.lock().await.payments.len()
    }

    /// Rewrite an order's creation time, for exercising the expiry window.
    pub async fn backdate_order(&self, order_id: OrderId, created_at: DateTime<Utc>) {
        let mut tables = self.tables.lock().await;
        if let Some(order) = tables.orders.get_mut(&order_id) {
            order.created_at = created_at;
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn begin(&self) -> CoreResult<Box<dyn OrderTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn find_customer(&self, user_id: UserId) -> CoreResult<Option<Customer>> {
        Ok(self.tables.lock().await.customers.get(&user_id).cloned())
    }

    async fn cart_items(&self, user_id: UserId) -> CoreResult<Vec<CartItem>> {
        Ok(self.tables.lock().await.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn get_order(&self, order_id: OrderId) -> CoreResult<Option<Order>> {
        Ok(self.tables.lock().await.order_with_items(order_id))
    }

    async fn list_orders(&self, user_id: UserId, is_paid: Option<bool>) -> CoreResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .filter(|o| is_paid.map_or(true, |paid| o.is_paid == paid))
            .filter_map(|o| tables.order_with_items(o.id))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn find_unpaid_before(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<OrderId>> {
        let tables = self.tables.lock().await;
        let mut stale: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| !o.is_paid && o.created_at < cutoff)
            .collect();
        stale.sort_by_key(|o| (o.created_at, o.id));
        Ok(stale.into_iter().map(|o| o.id).collect())
    }

    async fn get_payment(&self, order_id: OrderId) -> CoreResult<Option<Payment>> {
        Ok(self.tables.lock().await.payment_for(order_id).cloned())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl StockTx for MemoryTx {
    async fn lock_stock(&mut self, product_id: ProductId) -> CoreResult<Option<i32>> {
        Ok(self.work.products.get(&product_id).map(|p| p.qty_in_stock))
    }

    async fn write_stock(&mut self, product_id: ProductId, qty_in_stock: i32) -> CoreResult<()> {
        if qty_in_stock < 0 {
            return Err(CoreError::Storage(format!(
                "qty_in_stock of product {} would become {}",
                product_id, qty_in_stock
            )));
        }
        let product = self
            .work
            .products
            .get_mut(&product_id)
            .ok_or_else(|| CoreError::NotFound(format!("product {}", product_id)))?;
        product.qty_in_stock = qty_in_stock;
        Ok(())
    }
}

#[async_trait]
impl OrderTx for MemoryTx {
    async fn find_customer(&mut self, user_id: UserId) -> CoreResult<Option<Customer>> {
        Ok(self.work.customers.get(&user_id).cloned())
    }

    async fn cart_items(&mut self, user_id: UserId) -> CoreResult<Vec<CartItem>> {
        Ok(self.work.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn lock_products(&mut self, product_ids: &[ProductId]) -> CoreResult<Vec<Product>> {
        let mut ids = product_ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.work.products.get(&id).cloned())
            .collect())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> CoreResult<Order> {
        let now = Utc::now();
        let created = Order {
            id: OrderId(self.work.next_id()),
            user_id: order.user_id,
            shipping_address_id: order.shipping_address_id,
            total: order.total,
            is_paid: false,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        };
        self.work.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn insert_order_item(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> CoreResult<OrderItem> {
        if !self.work.orders.contains_key(&order_id) {
            return Err(CoreError::NotFound(format!("order {}", order_id)));
        }
        let duplicate = self
            .work
            .items
            .values()
            .any(|i| i.order_id == order_id && i.product_id == product_id);
        if duplicate {
            return Err(CoreError::Storage(format!(
                "product {} is already part of order {}",
                product_id, order_id
            )));
        }
        let item = OrderItem {
            id: OrderItemId(self.work.next_id()),
            order_id,
            product_id,
            quantity,
            created_at: Utc::now(),
        };
        self.work.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn lock_order(&mut self, order_id: OrderId) -> CoreResult<Option<Order>> {
        Ok(self.work.order_with_items(order_id))
    }

    async fn delete_order_item(&mut self, item_id: OrderItemId) -> CoreResult<()> {
        self.work.items.remove(&item_id);
        Ok(())
    }

    async fn delete_order(&mut self, order_id: OrderId) -> CoreResult<()> {
        self.work.orders.remove(&order_id);
        self.work.items.retain(|_, item| item.order_id != order_id);
        self.work.payments.retain(|_, payment| payment.order_id != order_id);
        Ok(())
    }

    async fn mark_order_paid(&mut self, order_id: OrderId) -> CoreResult<()> {
        let order = self
            .work
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;
        order.is_paid = true;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn lock_payment(&mut self, order_id: OrderId) -> CoreResult<Option<Payment>> {
        Ok(self.work.payment_for(order_id).cloned())
    }

    async fn delete_payments(&mut self, order_id: OrderId) -> CoreResult<u64> {
        let before = self.work.payments.len();
        self.work.payments.retain(|_, payment| payment.order_id != order_id);
        Ok((before - self.work.payments.len()) as u64)
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> CoreResult<Payment> {
        if self.work.payment_for(payment.order_id).is_some() {
            return Err(CoreError::Storage(format!(
                "order {} already has a payment",
                payment.order_id
            )));
        }
        let now = Utc::now();
        let created = Payment {
            id: PaymentId(self.work.next_id()),
            order_id: payment.order_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            status: PaymentStatus::Pending,
            payment_method: None,
            created_at: now,
            updated_at: now,
        };
        self.work.payments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_payment(&mut self, payment: &Payment) -> CoreResult<()> {
        let row = self
            .work
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", payment.id)))?;
        row.status = payment.status;
        row.payment_method = payment.payment_method.clone();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
