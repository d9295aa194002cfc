use async_trait::async_trait;
use mercato_core::{CoreError, ProductId, StockShortfall};
use std::collections::BTreeMap;
use tracing::debug;

/// Stock access inside an open transaction.
///
/// `lock_stock` must hold the product row until the transaction ends
/// (`SELECT ... FOR UPDATE` in Postgres), so a check followed by a write
/// cannot interleave with another transaction doing the same.
#[async_trait]
pub trait StockTx: Send {
    /// Current stock of the product, row-locked. `None` if the product does not exist.
    async fn lock_stock(&mut self, product_id: ProductId) -> Result<Option<i32>, CoreError>;

    async fn write_stock(&mut self, product_id: ProductId, qty_in_stock: i32) -> Result<(), CoreError>;
}

/// Owner of product stock mutations: reservation for order lines and release on teardown.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Take `quantity` units out of stock. Returns the stock left afterwards.
    ///
    /// Fails with [`InventoryError::OutOfStock`] without touching the row when
    /// the request exceeds what is available.
    pub async fn reserve<T>(&self, tx: &mut T, product_id: ProductId, quantity: i32) -> Result<i32, InventoryError>
    where
        T: StockTx + ?Sized,
    {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let available = tx
            .lock_stock(product_id)
            .await?
            .ok_or(InventoryError::NotFound(product_id))?;

        if quantity > available {
            return Err(InventoryError::OutOfStock {
                product_id,
                requested: quantity,
                available,
            });
        }

        let remaining = available - quantity;
        tx.write_stock(product_id, remaining).await?;
        debug!("Reserved {} of product {} ({} -> {})", quantity, product_id, available, remaining);
        Ok(remaining)
    }

    /// Put `quantity` units back. Only called with quantities an order line reserved.
    pub async fn release<T>(&self, tx: &mut T, product_id: ProductId, quantity: i32) -> Result<i32, InventoryError>
    where
        T: StockTx + ?Sized,
    {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let current = tx
            .lock_stock(product_id)
            .await?
            .ok_or(InventoryError::NotFound(product_id))?;

        let restored = current
            .checked_add(quantity)
            .ok_or(InventoryError::InvalidQuantity(quantity))?;
        tx.write_stock(product_id, restored).await?;
        debug!("Released {} of product {} ({} -> {})", quantity, product_id, current, restored);
        Ok(restored)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    OutOfStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error(transparent)]
    Store(#[from] CoreError),
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(id) => CoreError::NotFound(format!("product {}", id)),
            InventoryError::OutOfStock {
                product_id,
                requested,
                available,
            } => {
                let mut products = BTreeMap::new();
                products.insert(
                    product_id.to_string(),
                    StockShortfall::line_message(requested, available),
                );
                CoreError::OutOfStock(StockShortfall::new(products))
            }
            InventoryError::InvalidQuantity(q) => {
                CoreError::ValidationError(format!("quantity must be positive, got {}", q))
            }
            InventoryError::Store(inner) => inner,
        }
    }
}
