use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::product::Product;

/// Round a money amount to cents, ties to even.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Unit price after the product's current discount, if any.
///
/// `price - price / 100 * percent`, rounded to cents. Without a current
/// discount the catalog price is returned unchanged.
pub fn discounted_price(product: &Product, today: NaiveDate) -> Decimal {
    match product.active_discount(today) {
        Some(discount) => {
            let discount_amount = product.price / Decimal::ONE_HUNDRED * discount.discount_percent;
            round_money(product.price - discount_amount)
        }
        None => product.price,
    }
}

/// Cost of one order line: discounted unit price times quantity, rounded to cents.
pub fn line_cost(product: &Product, quantity: i32, today: NaiveDate) -> Decimal {
    round_money(discounted_price(product, today) * Decimal::from(quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductDiscount;
    use mercato_core::ProductId;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn product(price: Decimal, percent: Option<Decimal>) -> Product {
        Product {
            id: ProductId(1),
            name: "Lamp".to_string(),
            price,
            qty_in_stock: 10,
            discount: percent.map(|p| ProductDiscount {
                name: "Summer".to_string(),
                discount_percent: p,
                start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
                is_active: true,
            }),
        }
    }

    #[test]
    fn test_price_without_discount_is_unchanged() {
        let p = product(Decimal::new(4999, 2), None);
        assert_eq!(discounted_price(&p, today()), Decimal::new(4999, 2));
    }

    #[test]
    fn test_discount_is_rounded_to_cents() {
        // 33.33 - 33.33 / 100 * 12.5 = 29.16375 -> 29.16
        let p = product(Decimal::new(3333, 2), Some(Decimal::new(125, 1)));
        assert_eq!(discounted_price(&p, today()), Decimal::new(2916, 2));
    }

    #[test]
    fn test_line_cost_uses_discounted_price() {
        // 10.00 at 15% off = 8.50, three of them = 25.50
        let p = product(Decimal::new(1000, 2), Some(Decimal::new(150, 1)));
        assert_eq!(line_cost(&p, 3, today()), Decimal::new(2550, 2));
    }

    #[test]
    fn test_expired_discount_is_ignored() {
        let p = product(Decimal::new(1000, 2), Some(Decimal::new(500, 1)));
        let later = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(line_cost(&p, 2, later), Decimal::new(2000, 2));
    }

    #[test]
    fn test_round_money_ties_to_even() {
        assert_eq!(round_money(Decimal::new(10125, 3)), Decimal::new(1012, 2));
        assert_eq!(round_money(Decimal::new(10135, 3)), Decimal::new(1014, 2));
    }
}
