pub mod events;
pub mod expiry;
pub mod gate;
pub mod manager;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod origin;
pub mod reconciliation;
pub mod snapshot;
pub mod store;

pub use events::EventPublisher;
pub use expiry::{ExpirySweeper, SweepReport};
pub use gate::CheckoutGate;
pub use manager::OrderManager;
pub use memory::MemoryStore;
pub use models::{CartItem, Customer, NewOrder, NewPayment, Order, OrderItem, Payment};
pub use orchestrator::PaymentOrchestrator;
pub use origin::{IpAllowList, IpNetwork};
pub use reconciliation::{PaymentEvent, PaymentReconciler, ReconcileOutcome, WebhookNotification};
pub use snapshot::CartSnapshot;
pub use store::{OrderStore, OrderTx};
