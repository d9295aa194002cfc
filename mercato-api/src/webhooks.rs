use axum::{body::Bytes, extract::State, http::StatusCode};
use mercato_order::{ReconcileOutcome, WebhookNotification};
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

/// POST /v1/yookassa-webhooks
/// Payment provider notifications. Origin is checked by middleware before this runs.
pub async fn yookassa_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let notification: WebhookNotification = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(format!("malformed notification: {}", e)))?;

    let order_id = notification.order_id();
    let outcome = state
        .reconciler
        .apply(order_id, &notification.payment_event())
        .await?;

    if outcome == ReconcileOutcome::Settled {
        state.metrics.payments_settled.inc();
    }
    info!("Notification {} for order {}: {}", notification.event, order_id, outcome);
    Ok(StatusCode::OK)
}
