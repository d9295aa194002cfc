pub mod models;
pub mod pii;

pub use models::events::ShopEvent;
pub use pii::Masked;
