pub mod product;
pub mod pricing;
pub mod inventory;

pub use product::{Product, ProductDiscount};
pub use pricing::{discounted_price, line_cost, round_money};
pub use inventory::{InventoryError, InventoryLedger, StockTx};
