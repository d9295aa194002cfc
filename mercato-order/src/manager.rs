use chrono::{DateTime, Utc};
use mercato_catalog::{InventoryError, InventoryLedger};
use mercato_core::{CoreError, CoreResult, OrderId, StockShortfall, UserId};
use mercato_shared::models::events::{OrderCancelledEvent, OrderPlacedEvent};
use mercato_shared::{Masked, ShopEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::events::{timestamp, EventPublisher};
use crate::models::{NewOrder, Order};
use crate::snapshot::CartSnapshot;
use crate::store::{OrderStore, OrderTx};

/// Creation and teardown of orders.
///
/// Every operation runs in one store transaction: stock reservations, order
/// rows and payment rows are committed together or not at all.
pub struct OrderManager {
    store: Arc<dyn OrderStore>,
    ledger: InventoryLedger,
    events: EventPublisher,
}

impl OrderManager {
    pub fn new(store: Arc<dyn OrderStore>, events: EventPublisher) -> Self {
        Self {
            store,
            ledger: InventoryLedger::new(),
            events,
        }
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Turn the user's cart into an order, reserving stock for every line.
    ///
    /// If any line exceeds stock the whole attempt is rolled back and the
    /// error lists every short line. The cart itself is left as is.
    pub async fn create_order(&self, user_id: UserId) -> CoreResult<Order> {
        let mut tx = self.store.begin().await?;

        let customer = tx
            .find_customer(user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {}", user_id)))?;
        let cart = tx.cart_items(user_id).await?;
        let product_ids: Vec<_> = cart.iter().map(|item| item.product_id).collect();
        let products = tx.lock_products(&product_ids).await?;

        let snapshot = CartSnapshot::materialize(&cart, &products, Utc::now().date_naive())?;
        let mut shortfalls = snapshot.shortfalls.clone();

        let mut order = tx
            .insert_order(&NewOrder {
                user_id,
                shipping_address_id: customer.shipping_address_id,
                total: snapshot.total,
            })
            .await?;

        for line in &snapshot.lines {
            if shortfalls.contains_key(&line.name) {
                continue;
            }
            match self.ledger.reserve(&mut *tx, line.product_id, line.quantity).await {
                Ok(_) => {
                    let item = tx
                        .insert_order_item(order.id, line.product_id, line.quantity)
                        .await?;
                    order.items.push(item);
                }
                Err(InventoryError::OutOfStock {
                    requested, available, ..
                }) => {
                    shortfalls.insert(
                        line.name.clone(),
                        StockShortfall::line_message(requested, available),
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        if !shortfalls.is_empty() {
            warn!(
                "Order for user {} rejected, {} line(s) out of stock",
                user_id,
                shortfalls.len()
            );
            return Err(CoreError::OutOfStock(StockShortfall::new(shortfalls)));
        }

        tx.commit().await?;
        info!(
            "Order {} placed by {} for {}",
            order.id,
            Masked(customer.email.as_str()),
            order.total
        );

        self.events.publish(ShopEvent::OrderPlaced(OrderPlacedEvent {
            order_id: order.id.get(),
            user_id: user_id.get(),
            total: order.total,
            line_count: order.items.len(),
            timestamp: timestamp(),
        }));
        Ok(order)
    }

    /// Owner-initiated cancellation of an unpaid order.
    pub async fn cancel_order(&self, user_id: UserId, order_id: OrderId) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .filter(|order| order.is_owned_by(user_id))
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;

        if order.is_paid {
            return Err(CoreError::AlreadyPaid(format!("order {}", order_id)));
        }

        let released = self.teardown(&mut *tx, &order).await?;
        tx.commit().await?;
        info!("Order {} cancelled by its owner", order_id);
        self.publish_cancelled(&order, released);
        Ok(())
    }

    /// Administrative removal in any state. Stock of a paid order stays allocated.
    pub async fn delete_order(&self, order_id: OrderId) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;

        let released = self.teardown(&mut *tx, &order).await?;
        tx.commit().await?;
        info!("Order {} deleted (stock released: {})", order_id, released);
        self.publish_cancelled(&order, released);
        Ok(())
    }

    /// Remove an order the sweeper selected, if it is still unpaid and older than `cutoff`.
    ///
    /// Returns `false` when the order is gone or no longer qualifies, e.g. it
    /// was paid between selection and this call.
    pub async fn expire_order(&self, order_id: OrderId, cutoff: DateTime<Utc>) -> CoreResult<bool> {
        let mut tx = self.store.begin().await?;
        let order = match tx.lock_order(order_id).await? {
            Some(order) if !order.is_paid && order.created_at < cutoff => order,
            _ => {
                debug!("Order {} no longer eligible for expiry", order_id);
                return Ok(false);
            }
        };

        let released = self.teardown(&mut *tx, &order).await?;
        tx.commit().await?;
        self.publish_cancelled(&order, released);
        Ok(true)
    }

    pub async fn get_order(&self, user_id: UserId, order_id: OrderId) -> CoreResult<Order> {
        self.store
            .get_order(order_id)
            .await?
            .filter(|order| order.is_owned_by(user_id))
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))
    }

    pub async fn list_orders(&self, user_id: UserId, is_paid: Option<bool>) -> CoreResult<Vec<Order>> {
        self.store.list_orders(user_id, is_paid).await
    }

    /// Delete items, payments and the order itself. Stock goes back only for unpaid orders.
    async fn teardown(&self, tx: &mut dyn OrderTx, order: &Order) -> CoreResult<bool> {
        let release = !order.is_paid;
        for item in &order.items {
            tx.delete_order_item(item.id).await?;
            if release {
                self.ledger.release(&mut *tx, item.product_id, item.quantity).await?;
            }
        }
        tx.delete_payments(order.id).await?;
        tx.delete_order(order.id).await?;
        Ok(release)
    }

    fn publish_cancelled(&self, order: &Order, stock_released: bool) {
        self.events.publish(ShopEvent::OrderCancelled(OrderCancelledEvent {
            order_id: order.id.get(),
            user_id: order.user_id.get(),
            stock_released,
            timestamp: timestamp(),
        }));
    }
}
