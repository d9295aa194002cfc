use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mercato_core::{CoreError, StockShortfall};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    OutOfStock(StockShortfall),
    BadGateway(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::OutOfStock(shortfall) => {
                return (StatusCode::BAD_REQUEST, Json(shortfall)).into_response();
            }
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => {
                tracing::error!("Payment provider failure: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment provider is unavailable".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::OutOfStock(shortfall) => AppError::OutOfStock(shortfall),
            CoreError::AlreadyPaid(what) => {
                AppError::AuthorizationError(format!("{} has already been paid", what))
            }
            CoreError::Forbidden(msg) => AppError::AuthorizationError(msg),
            CoreError::NotFound(what) => AppError::NotFoundError(format!("{} not found", what)),
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::Gateway(msg) => AppError::BadGateway(msg),
            CoreError::Storage(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_statuses() {
        let cases = [
            (CoreError::AlreadyPaid("order 1".into()), StatusCode::FORBIDDEN),
            (CoreError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (CoreError::NotFound("order 1".into()), StatusCode::NOT_FOUND),
            (CoreError::ValidationError("bad".into()), StatusCode::BAD_REQUEST),
            (CoreError::Gateway("timeout".into()), StatusCode::BAD_GATEWAY),
            (CoreError::Storage("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                CoreError::OutOfStock(StockShortfall::new(Default::default())),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
