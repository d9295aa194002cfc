use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use mercato_order::origin::FORBIDDEN_ORIGIN_MESSAGE;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::state::AppState;

/// Lets provider notifications through only from allow-listed addresses.
pub async fn webhook_origin_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let forwarded_for = match req.headers().get("X-Forwarded-For").map(|value| value.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            warn!("Webhook rejected (peer {}, unreadable X-Forwarded-For)", peer);
            state.metrics.webhooks_rejected.inc();
            return AppError::AuthorizationError(FORBIDDEN_ORIGIN_MESSAGE.to_string()).into_response();
        }
    };

    match state.allow_list.check(forwarded_for, peer) {
        Ok(ip) => {
            debug!("Webhook accepted from {}", ip);
            next.run(req).await
        }
        Err(err) => {
            warn!("Webhook rejected (peer {}, forwarded {:?})", peer, forwarded_for);
            state.metrics.webhooks_rejected.inc();
            AppError::from(err).into_response()
        }
    }
}
