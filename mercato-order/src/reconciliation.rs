use mercato_core::payment::PaymentStatus;
use mercato_core::{CoreError, CoreResult, OrderId};
use mercato_shared::models::events::{OrderPaidEvent, PaymentCanceledEvent};
use mercato_shared::ShopEvent;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::events::{timestamp, EventPublisher};
use crate::store::OrderStore;

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment.succeeded";
pub const EVENT_PAYMENT_CANCELED: &str = "payment.canceled";

/// Notification body posted by the payment provider.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
    pub event: String,
    pub object: WebhookObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookObject {
    pub metadata: WebhookMetadata,
    #[serde(default)]
    pub payment_method: Option<PaymentMethodInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMetadata {
    /// The provider echoes metadata back as strings; numbers are accepted too.
    #[serde(deserialize_with = "order_id_from_number_or_string")]
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethodInfo {
    #[serde(rename = "type")]
    pub method_type: String,
}

fn order_id_from_number_or_string<'de, D>(deserializer: D) -> Result<OrderId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(OrderId(n)),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded { payment_method: Option<String> },
    Canceled,
    Other(String),
}

impl WebhookNotification {
    pub fn order_id(&self) -> OrderId {
        self.object.metadata.order_id
    }

    pub fn payment_event(&self) -> PaymentEvent {
        match self.event.as_str() {
            EVENT_PAYMENT_SUCCEEDED => PaymentEvent::Succeeded {
                payment_method: self
                    .object
                    .payment_method
                    .as_ref()
                    .map(|method| method.method_type.clone()),
            },
            EVENT_PAYMENT_CANCELED => PaymentEvent::Canceled,
            other => PaymentEvent::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment succeeded and the order is now paid.
    Settled,
    Canceled,
    /// The payment already was in the state this event leads to.
    AlreadyApplied,
    /// Unknown event, or an event that would leave a terminal state.
    Ignored,
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReconcileOutcome::Settled => "settled",
            ReconcileOutcome::Canceled => "canceled",
            ReconcileOutcome::AlreadyApplied => "already_applied",
            ReconcileOutcome::Ignored => "ignored",
        };
        f.write_str(label)
    }
}

/// Applies provider notifications to local payments and orders.
///
/// `Pending` moves to `Succeeded` or `Canceled`; both are terminal, so
/// redelivered or out-of-order notifications never change a settled payment.
pub struct PaymentReconciler {
    store: Arc<dyn OrderStore>,
    events: EventPublisher,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn OrderStore>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    pub async fn apply(&self, order_id: OrderId, event: &PaymentEvent) -> CoreResult<ReconcileOutcome> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;
        let mut payment = tx
            .lock_payment(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment for order {}", order_id)))?;

        let outcome = match event {
            PaymentEvent::Other(name) => {
                debug!("Ignoring provider event {} for order {}", name, order_id);
                ReconcileOutcome::Ignored
            }
            _ if payment.status.is_terminal() => match (event, payment.status) {
                (PaymentEvent::Succeeded { .. }, PaymentStatus::Succeeded) => {
                    if !order.is_paid {
                        tx.mark_order_paid(order_id).await?;
                    }
                    ReconcileOutcome::AlreadyApplied
                }
                (PaymentEvent::Canceled, PaymentStatus::Canceled) => ReconcileOutcome::AlreadyApplied,
                (_, status) => {
                    warn!(
                        "Ignoring {:?} for order {}: payment is already {}",
                        event, order_id, status
                    );
                    ReconcileOutcome::Ignored
                }
            },
            PaymentEvent::Succeeded { payment_method } => {
                payment.status = PaymentStatus::Succeeded;
                payment.payment_method = payment_method.clone();
                tx.update_payment(&payment).await?;
                tx.mark_order_paid(order_id).await?;
                ReconcileOutcome::Settled
            }
            PaymentEvent::Canceled => {
                payment.status = PaymentStatus::Canceled;
                tx.update_payment(&payment).await?;
                ReconcileOutcome::Canceled
            }
        };

        tx.commit().await?;

        match outcome {
            ReconcileOutcome::Settled => {
                info!("Order {} paid ({} {})", order_id, payment.amount, payment.currency);
                self.events.publish(ShopEvent::OrderPaid(OrderPaidEvent {
                    order_id: order_id.get(),
                    user_id: order.user_id.get(),
                    amount: payment.amount,
                    currency: payment.currency.clone(),
                    payment_method: payment.payment_method.clone(),
                    timestamp: timestamp(),
                }));
            }
            ReconcileOutcome::Canceled => {
                info!("Payment for order {} canceled", order_id);
                self.events.publish(ShopEvent::PaymentCanceled(PaymentCanceledEvent {
                    order_id: order_id.get(),
                    timestamp: timestamp(),
                }));
            }
            ReconcileOutcome::AlreadyApplied | ReconcileOutcome::Ignored => {}
        }
        Ok(outcome)
    }
}
