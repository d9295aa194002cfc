use chrono::NaiveDate;
use mercato_catalog::{discounted_price, line_cost, Product};
use mercato_core::{CoreError, CoreResult, ProductId, StockShortfall};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::models::CartItem;

/// A cart line priced at the moment of checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_cost: Decimal,
}

/// Read-only view of a user's cart used to build an order.
///
/// The total covers every line, including those that stock cannot satisfy;
/// such lines are also listed in `shortfalls`, keyed by product name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartSnapshot {
    pub lines: Vec<SnapshotLine>,
    pub shortfalls: BTreeMap<String, String>,
    pub total: Decimal,
}

impl CartSnapshot {
    pub fn materialize(cart: &[CartItem], products: &[Product], today: NaiveDate) -> CoreResult<Self> {
        let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();
        let mut snapshot = CartSnapshot::default();

        for item in cart {
            let product = by_id
                .get(&item.product_id)
                .ok_or_else(|| CoreError::NotFound(format!("product {}", item.product_id)))?;

            if !product.has_stock_for(item.quantity) {
                snapshot.shortfalls.insert(
                    product.name.clone(),
                    StockShortfall::line_message(item.quantity, product.qty_in_stock),
                );
            }

            let cost = line_cost(product, item.quantity, today);
            snapshot.total += cost;
            snapshot.lines.push(SnapshotLine {
                product_id: product.id,
                name: product.name.clone(),
                quantity: item.quantity,
                unit_price: discounted_price(product, today),
                line_cost: cost,
            });
        }

        Ok(snapshot)
    }

    pub fn is_fulfillable(&self) -> bool {
        self.shortfalls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_catalog::ProductDiscount;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn product(id: i64, name: &str, price: Decimal, qty: i32) -> Product {
        Product {
            id: ProductId(id),
            name: name.to_string(),
            price,
            qty_in_stock: qty,
            discount: None,
        }
    }

    #[test]
    fn test_snapshot_prices_lines_with_discount() {
        let mut kettle = product(1, "Kettle", Decimal::new(10000, 2), 5);
        kettle.discount = Some(ProductDiscount {
            name: "Summer".to_string(),
            discount_percent: Decimal::from(10),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            is_active: true,
        });
        let cup = product(2, "Cup", Decimal::new(333, 2), 10);
        let cart = [
            CartItem { product_id: ProductId(1), quantity: 2 },
            CartItem { product_id: ProductId(2), quantity: 3 },
        ];

        let snapshot = CartSnapshot::materialize(&cart, &[kettle, cup], today()).unwrap();

        assert!(snapshot.is_fulfillable());
        assert_eq!(snapshot.lines[0].unit_price, Decimal::new(9000, 2));
        assert_eq!(snapshot.lines[0].line_cost, Decimal::new(18000, 2));
        assert_eq!(snapshot.lines[1].line_cost, Decimal::new(999, 2));
        assert_eq!(snapshot.total, Decimal::new(18999, 2));
    }

    #[test]
    fn test_snapshot_collects_every_shortfall() {
        let products = [
            product(1, "Kettle", Decimal::ONE, 1),
            product(2, "Cup", Decimal::ONE, 0),
            product(3, "Plate", Decimal::ONE, 9),
        ];
        let cart = [
            CartItem { product_id: ProductId(1), quantity: 3 },
            CartItem { product_id: ProductId(2), quantity: 1 },
            CartItem { product_id: ProductId(3), quantity: 9 },
        ];

        let snapshot = CartSnapshot::materialize(&cart, &products, today()).unwrap();

        assert!(!snapshot.is_fulfillable());
        assert_eq!(snapshot.shortfalls.len(), 2);
        assert_eq!(snapshot.shortfalls["Kettle"], "3 > 1");
        assert_eq!(snapshot.shortfalls["Cup"], "1 > 0");
    }

    #[test]
    fn test_snapshot_rejects_unknown_product() {
        let cart = [CartItem { product_id: ProductId(7), quantity: 1 }];
        assert!(matches!(
            CartSnapshot::materialize(&cart, &[], today()),
            Err(CoreError::NotFound(_))
        ));
    }
}
