use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use mercato_core::{AddressId, OrderId, OrderItemId, ProductId, UserId};
use mercato_order::{Order, OrderItem};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user: UserId,
    pub shipping_address: Option<AddressId>,
    pub total: Decimal,
    pub is_paid: bool,
    pub order_items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: OrderItemId,
    pub product: ProductId,
    pub quantity: i32,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id,
            product: item.product_id,
            quantity: item.quantity,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user: order.user_id,
            shipping_address: order.shipping_address_id,
            total: order.total,
            is_paid: order.is_paid,
            order_items: order.items.into_iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub is_paid: Option<bool>,
}

/// POST /v1/orders
/// Place an order from the caller's cart
pub async fn create_order(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    state.gate.check(user_id).await?;
    let order = state.orders.create_order(user_id).await?;
    state.metrics.orders_created.inc();
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /v1/orders?is_paid=
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.orders.list_orders(user_id, query.is_paid).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.get_order(user_id, order_id).await?;
    Ok(Json(order.into()))
}

/// DELETE /v1/orders/{id}
/// Cancel an unpaid order and return its stock
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(order_id): Path<OrderId>,
) -> Result<StatusCode, AppError> {
    state.orders.cancel_order(user_id, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
