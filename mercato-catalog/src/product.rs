use chrono::NaiveDate;
use mercato_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Percentage discount attached to a product for a date window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDiscount {
    pub name: String,
    /// 1.0 ..= 100.0, one decimal place.
    pub discount_percent: Decimal,
    pub start_date: NaiveDate,
    /// Exclusive.
    pub end_date: NaiveDate,
    pub is_active: bool,
}

impl ProductDiscount {
    /// A discount applies while it is switched on and `start_date <= today < end_date`.
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.is_active && self.start_date <= today && today < self.end_date
    }
}

/// The slice of a catalog product the order workflow reads.
///
/// Price and discount are owned by the catalog; the order side only ever
/// touches `qty_in_stock`, and only through the inventory ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub qty_in_stock: i32,
    pub discount: Option<ProductDiscount>,
}

impl Product {
    pub fn active_discount(&self, today: NaiveDate) -> Option<&ProductDiscount> {
        self.discount.as_ref().filter(|d| d.is_current(today))
    }

    pub fn has_stock_for(&self, quantity: i32) -> bool {
        quantity <= self.qty_in_stock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn discount(is_active: bool) -> ProductDiscount {
        ProductDiscount {
            name: "Spring sale".to_string(),
            discount_percent: Decimal::new(150, 1),
            start_date: date(2024, 3, 1),
            end_date: date(2024, 4, 1),
            is_active,
        }
    }

    #[test]
    fn test_discount_window_is_half_open() {
        let d = discount(true);
        assert!(!d.is_current(date(2024, 2, 29)));
        assert!(d.is_current(date(2024, 3, 1)));
        assert!(d.is_current(date(2024, 3, 31)));
        assert!(!d.is_current(date(2024, 4, 1)));
    }

    #[test]
    fn test_inactive_discount_never_applies() {
        assert!(!discount(false).is_current(date(2024, 3, 15)));
    }

    #[test]
    fn test_stock_check() {
        let product = Product {
            id: ProductId(1),
            name: "Kettle".to_string(),
            price: Decimal::new(1999, 2),
            qty_in_stock: 5,
            discount: Some(discount(true)),
        };
        assert!(product.has_stock_for(5));
        assert!(!product.has_stock_for(6));
        assert!(product.active_discount(date(2024, 3, 10)).is_some());
        assert!(product.active_discount(date(2024, 5, 10)).is_none());
    }
}
