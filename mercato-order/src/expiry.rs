use chrono::{DateTime, Duration, Utc};
use mercato_core::{CoreError, CoreResult, OrderId};
use mercato_shared::models::events::UnpaidOrdersSweptEvent;
use mercato_shared::ShopEvent;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::events::timestamp;
use crate::manager::OrderManager;
use crate::models::default_unpaid_ttl;
use crate::store::OrderStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Removes orders left unpaid past the expiry window, returning their stock.
pub struct ExpirySweeper {
    store: Arc<dyn OrderStore>,
    manager: Arc<OrderManager>,
    ttl: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn OrderStore>, manager: Arc<OrderManager>) -> Self {
        Self {
            store,
            manager,
            ttl: default_unpaid_ttl(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// One pass over orders created before `now - ttl`. Each order is removed
    /// in its own transaction; a failure is counted and the pass goes on.
    /// A non-positive TTL is refused before anything is selected.
    pub async fn sweep(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        if self.ttl <= Duration::zero() {
            return Err(CoreError::ValidationError(format!(
                "unpaid order TTL must be positive, got {}s",
                self.ttl.num_seconds()
            )));
        }
        let cutoff = now - self.ttl;
        let candidates: Vec<OrderId> = self.store.find_unpaid_before(cutoff).await?;
        let mut report = SweepReport::default();

        for order_id in candidates {
            match self.manager.expire_order(order_id, cutoff).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => debug!("Skipped order {} during sweep", order_id),
                Err(e) => {
                    error!("Failed to delete unpaid order {}: {}", order_id, e);
                    report.failed += 1;
                }
            }
        }

        info!("Deleted {} unpaid orders.", report.deleted);
        self.manager.events().publish(ShopEvent::UnpaidOrdersSwept(UnpaidOrdersSweptEvent {
            deleted: report.deleted,
            failed: report.failed,
            cutoff: cutoff.timestamp(),
            timestamp: timestamp(),
        }));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPublisher;
    use crate::memory::MemoryStore;
    use mercato_core::AddressId;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_sweep_removes_stale_unpaid_orders_and_restores_stock() {
        let store = MemoryStore::new();
        let user = store.add_customer("late@example.com", Some(AddressId(1))).await;
        let lamp = store.add_product("Lamp", Decimal::new(1999, 2), 5).await;
        let shared: Arc<dyn OrderStore> = Arc::new(store.clone());
        let manager = Arc::new(OrderManager::new(shared.clone(), EventPublisher::default()));
        let sweeper = ExpirySweeper::new(shared, manager.clone());

        store.add_to_cart(user, lamp, 3).await;
        let stale = manager.create_order(user).await.unwrap();
        store.add_to_cart(user, lamp, 1).await;
        let fresh = manager.create_order(user).await.unwrap();
        assert_eq!(store.stock(lamp).await, Some(1));

        let now = Utc::now();
        store.backdate_order(stale.id, now - Duration::hours(4)).await;

        let report = sweeper.sweep(now).await.unwrap();

        assert_eq!(report, SweepReport { deleted: 1, failed: 0 });
        assert!(store.get_order(stale.id).await.unwrap().is_none());
        assert!(store.get_order(fresh.id).await.unwrap().is_some());
        assert_eq!(store.stock(lamp).await, Some(4));
    }

    #[tokio::test]
    async fn test_sweep_keeps_paid_orders() {
        let store = MemoryStore::new();
        let user = store.add_customer("paid@example.com", Some(AddressId(1))).await;
        let lamp = store.add_product("Lamp", Decimal::new(1999, 2), 5).await;
        let shared: Arc<dyn OrderStore> = Arc::new(store.clone());
        let manager = Arc::new(OrderManager::new(shared.clone(), EventPublisher::default()));
        let sweeper = ExpirySweeper::new(shared, manager.clone()).with_ttl(Duration::minutes(30));

        store.add_to_cart(user, lamp, 2).await;
        let order = manager.create_order(user).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.mark_order_paid(order.id).await.unwrap();
        tx.commit().await.unwrap();
        store.backdate_order(order.id, Utc::now() - Duration::hours(5)).await;

        let report = sweeper.sweep(Utc::now()).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert_eq!(store.stock(lamp).await, Some(3));
    }

    #[tokio::test]
    async fn test_non_positive_ttl_never_sweeps_fresh_orders() {
        let store = MemoryStore::new();
        let user = store.add_customer("fresh@example.com", Some(AddressId(1))).await;
        let lamp = store.add_product("Lamp", Decimal::new(1999, 2), 5).await;
        let shared: Arc<dyn OrderStore> = Arc::new(store.clone());
        let manager = Arc::new(OrderManager::new(shared.clone(), EventPublisher::default()));

        store.add_to_cart(user, lamp, 3).await;
        let order = manager.create_order(user).await.unwrap();

        for ttl in [Duration::seconds(-60), Duration::zero()] {
            let sweeper = ExpirySweeper::new(shared.clone(), manager.clone()).with_ttl(ttl);
            assert!(matches!(
                sweeper.sweep(Utc::now()).await,
                Err(CoreError::ValidationError(_))
            ));
        }

        assert!(store.get_order(order.id).await.unwrap().is_some());
        assert_eq!(store.stock(lamp).await, Some(2));
    }
}
