use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use mercato_core::payment::PaymentConfirmation;
use mercato_core::OrderId;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub return_url: String,
}

/// POST /v1/orders/{id}/create-payment
/// Start a payment attempt; the client is redirected to `confirmation_url`
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(order_id): Path<OrderId>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentConfirmation>), AppError> {
    let confirmation = state
        .payments
        .create_payment(user_id, order_id, &req.return_url)
        .await?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}
