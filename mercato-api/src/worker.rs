use chrono::Utc;
use mercato_order::{EventPublisher, ExpirySweeper, SweepReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::metrics::Metrics;

/// One expiry pass, recorded in metrics.
pub async fn run_sweep(sweeper: &ExpirySweeper, metrics: &Metrics) -> Option<SweepReport> {
    match sweeper.sweep(Utc::now()).await {
        Ok(report) => {
            metrics.orders_expired.inc_by(report.deleted as u64);
            if report.failed > 0 {
                warn!("{} unpaid orders could not be deleted", report.failed);
            }
            Some(report)
        }
        Err(e) => {
            error!("Expiry sweep failed: {}", e);
            None
        }
    }
}

/// Runs until the process exits. Returns immediately on a zero interval.
pub async fn start_expiry_worker(sweeper: Arc<ExpirySweeper>, metrics: Arc<Metrics>, every: Duration) {
    if every.is_zero() {
        error!("Expiry worker not started: sweep interval must be greater than zero");
        return;
    }
    info!(
        "Expiry worker started: unpaid orders older than {}s are swept every {:?}",
        sweeper.ttl().num_seconds(),
        every
    );
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        run_sweep(&sweeper, &metrics).await;
    }
}

/// Log every committed workflow event as JSON under the `mercato_events` target.
pub fn spawn_event_logger(events: &EventPublisher) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(payload) => info!(target: "mercato_events", "{} {}", event.name(), payload),
                    Err(e) => error!("Failed to serialize {}: {}", event.name(), e),
                },
                Err(RecvError::Lagged(skipped)) => warn!("Event logger skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_order::{MemoryStore, OrderManager, OrderStore};

    fn sweeper() -> Arc<ExpirySweeper> {
        let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());
        let manager = Arc::new(OrderManager::new(store.clone(), EventPublisher::default()));
        Arc::new(ExpirySweeper::new(store, manager))
    }

    #[tokio::test]
    async fn test_zero_interval_worker_returns_without_panicking() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let worker = tokio::spawn(start_expiry_worker(sweeper(), metrics, Duration::ZERO));

        let joined = tokio::time::timeout(Duration::from_secs(1), worker).await;

        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_run_sweep_counts_expired_orders() {
        let metrics = Metrics::new().unwrap();
        let report = run_sweep(&sweeper(), &metrics).await.unwrap();

        assert_eq!(report.deleted, 0);
        assert_eq!(metrics.orders_expired.get(), 0);
    }
}
