use mercato_shared::ShopEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out of committed workflow events to in-process subscribers.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<ShopEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShopEvent> {
        self.tx.subscribe()
    }

    /// Publishing never fails the caller; with no subscriber the event is dropped.
    pub fn publish(&self, event: ShopEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            debug!("No subscriber for {}", name);
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(100)
    }
}

pub(crate) fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
