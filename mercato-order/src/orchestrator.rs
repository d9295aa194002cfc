use mercato_core::payment::{GatewayError, PaymentConfirmation, PaymentGateway, RemotePaymentRequest};
use mercato_core::{CoreError, CoreResult, OrderId, UserId};
use mercato_shared::Masked;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::NewPayment;
use crate::store::OrderStore;

pub const DEFAULT_CURRENCY: &str = "RUB";
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts payment attempts for unpaid orders.
///
/// The remote payment is created first; the local `Pending` payment row only
/// replaces the previous attempt once the provider has answered.
pub struct PaymentOrchestrator {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    timeout: Duration,
}

impl PaymentOrchestrator {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            store,
            gateway,
            currency: DEFAULT_CURRENCY.to_string(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn create_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
        return_url: &str,
    ) -> CoreResult<PaymentConfirmation> {
        validate_return_url(return_url)?;

        let order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|order| order.is_owned_by(user_id))
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;
        if order.is_paid {
            return Err(CoreError::AlreadyPaid(format!("order {}", order_id)));
        }
        let customer = self
            .store
            .find_customer(user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {}", user_id)))?;

        let request = RemotePaymentRequest {
            idempotency_key: Uuid::new_v4(),
            order_id,
            amount: order.total,
            currency: self.currency.clone(),
            return_url: return_url.to_string(),
            description: format!("Payment for order #{} for {}", order.id, customer.email),
        };

        let confirmation =
            match tokio::time::timeout(self.timeout, self.gateway.create_remote_payment(&request)).await {
                Ok(Ok(confirmation)) => confirmation,
                Ok(Err(e)) => {
                    error!("Payment creation for order {} failed: {}", order_id, e);
                    return Err(e.into());
                }
                Err(_) => {
                    error!("Payment provider did not answer within {:?} for order {}", self.timeout, order_id);
                    return Err(GatewayError::Timeout(self.timeout).into());
                }
            };

        let mut tx = self.store.begin().await?;
        let locked = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;
        if locked.is_paid {
            return Err(CoreError::AlreadyPaid(format!("order {}", order_id)));
        }
        let replaced = tx.delete_payments(order_id).await?;
        let payment = tx
            .insert_payment(&NewPayment {
                order_id,
                amount: locked.total,
                currency: self.currency.clone(),
            })
            .await?;
        tx.commit().await?;

        info!(
            "Payment {} pending for order {} of {} ({} {}, replaced {})",
            payment.id,
            order_id,
            Masked(customer.email.as_str()),
            payment.amount,
            payment.currency,
            replaced
        );
        Ok(confirmation)
    }
}

/// Accepts absolute `http`/`https` URLs whose authority is `host[:port]`.
/// Userinfo, an empty host and a non-numeric port are refused.
fn validate_return_url(url: &str) -> CoreResult<()> {
    let invalid = || {
        CoreError::ValidationError(format!(
            "return_url must be an absolute http(s) URL, got {:?}",
            url
        ))
    };

    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid());
    }
    let authority = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .and_then(|rest| rest.split(['/', '?', '#']).next())
        .ok_or_else(invalid)?;
    if authority.contains('@') {
        return Err(invalid());
    }

    let port = match authority.strip_prefix('[') {
        Some(bracketed) => {
            let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
            host.parse::<std::net::Ipv6Addr>().map_err(|_| invalid())?;
            match after {
                "" => None,
                _ => Some(after.strip_prefix(':').ok_or_else(invalid)?),
            }
        }
        None => {
            let (host, port) = match authority.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            };
            let host_ok = !host.is_empty()
                && host.split('.').all(|label| {
                    !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                });
            if !host_ok {
                return Err(invalid());
            }
            port
        }
    };

    if let Some(port) = port {
        port.parse::<u16>().map_err(|_| invalid())?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::Order;
    use async_trait::async_trait;
    use mercato_core::payment::PaymentStatus;
    use mercato_core::AddressId;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    /// Gateway double recording every request it receives.
    #[derive(Default)]
    pub(crate) struct RecordingGateway {
        pub requests: Mutex<Vec<RemotePaymentRequest>>,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn create_remote_payment(
            &self,
            request: &RemotePaymentRequest,
        ) -> Result<PaymentConfirmation, GatewayError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(GatewayError::Rejected {
                    status: 401,
                    body: "invalid credentials".to_string(),
                });
            }
            Ok(PaymentConfirmation {
                confirmation_url: format!("https://pay.example/{}", request.idempotency_key),
            })
        }
    }

    pub(crate) async fn seed_order(store: &MemoryStore, total: i64) -> (UserId, Order) {
        let user = store.add_customer("buyer@example.com", Some(AddressId(1))).await;
        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(&crate::models::NewOrder {
                user_id: user,
                shipping_address_id: Some(AddressId(1)),
                total: Decimal::new(total, 2),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (user, order)
    }

    #[tokio::test]
    async fn test_create_payment_records_pending_payment() {
        let store = MemoryStore::new();
        let (user, order) = seed_order(&store, 10000).await;
        let gateway = Arc::new(RecordingGateway::default());
        let orchestrator = PaymentOrchestrator::new(Arc::new(store.clone()), gateway.clone());

        let confirmation = orchestrator
            .create_payment(user, order.id, "https://shop.example/done")
            .await
            .unwrap();

        let requests = gateway.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount, Decimal::new(10000, 2));
        assert_eq!(requests[0].currency, "RUB");
        assert_eq!(
            requests[0].description,
            format!("Payment for order #{} for buyer@example.com", order.id)
        );
        assert!(confirmation.confirmation_url.starts_with("https://pay.example/"));

        let payment = store.get_payment(order.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, order.total);
    }

    #[tokio::test]
    async fn test_retry_replaces_previous_payment_with_fresh_key() {
        let store = MemoryStore::new();
        let (user, order) = seed_order(&store, 500).await;
        let gateway = Arc::new(RecordingGateway::default());
        let orchestrator = PaymentOrchestrator::new(Arc::new(store.clone()), gateway.clone());

        orchestrator.create_payment(user, order.id, "https://shop.example/").await.unwrap();
        orchestrator.create_payment(user, order.id, "https://shop.example/").await.unwrap();

        let requests = gateway.requests.lock().unwrap().clone();
        assert_ne!(requests[0].idempotency_key, requests[1].idempotency_key);
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_no_payment() {
        let store = MemoryStore::new();
        let (user, order) = seed_order(&store, 500).await;
        let gateway = Arc::new(RecordingGateway {
            fail: true,
            ..Default::default()
        });
        let orchestrator = PaymentOrchestrator::new(Arc::new(store.clone()), gateway);

        let err = orchestrator
            .create_payment(user, order.id, "https://shop.example/")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Gateway(_)));
        assert_eq!(store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_gateway_timeout_surfaces_as_gateway_error() {
        let store = MemoryStore::new();
        let (user, order) = seed_order(&store, 500).await;
        let gateway = Arc::new(RecordingGateway {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let orchestrator = PaymentOrchestrator::new(Arc::new(store.clone()), gateway)
            .with_timeout(Duration::from_millis(20));

        let err = orchestrator
            .create_payment(user, order.id, "https://shop.example/")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Gateway(_)));
        assert_eq!(store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_paid_and_foreign_orders_are_refused() {
        let store = MemoryStore::new();
        let (user, order) = seed_order(&store, 500).await;
        let stranger = store.add_customer("other@example.com", None).await;
        let orchestrator =
            PaymentOrchestrator::new(Arc::new(store.clone()), Arc::new(RecordingGateway::default()));

        assert!(matches!(
            orchestrator.create_payment(stranger, order.id, "https://shop.example/").await,
            Err(CoreError::NotFound(_))
        ));

        let mut tx = store.begin().await.unwrap();
        tx.mark_order_paid(order.id).await.unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(
            orchestrator.create_payment(user, order.id, "https://shop.example/").await,
            Err(CoreError::AlreadyPaid(_))
        ));
    }

    #[test]
    fn test_return_url_must_be_absolute_http() {
        assert!(validate_return_url("https://shop.example/thanks?o=1").is_ok());
        assert!(validate_return_url("http://localhost:8000").is_ok());
        assert!(validate_return_url("/relative/path").is_err());
        assert!(validate_return_url("ftp://shop.example").is_err());
        assert!(validate_return_url("https://").is_err());
        assert!(validate_return_url("https://shop example").is_err());
    }

    #[test]
    fn test_return_url_authority_needs_a_host() {
        assert!(validate_return_url("https://[::1]:8443/back").is_ok());
        assert!(validate_return_url("https://shop.example:443").is_ok());
        assert!(validate_return_url("http://:80").is_err());
        assert!(validate_return_url("https://@/").is_err());
        assert!(validate_return_url("https://user@shop.example/").is_err());
        assert!(validate_return_url("https://shop.example:").is_err());
        assert!(validate_return_url("https://shop.example:http").is_err());
        assert!(validate_return_url("https://shop..example/").is_err());
        assert!(validate_return_url("https://[::1]x/").is_err());
    }
}
