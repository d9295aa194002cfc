pub mod auth;
pub mod origin;

pub use auth::{customer_auth_middleware, AuthUser, CustomerClaims};
pub use origin::webhook_origin_middleware;
