use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mercato_catalog::{Product, ProductDiscount, StockTx};
use mercato_core::payment::PaymentStatus;
use mercato_core::{
    AddressId, CoreError, CoreResult, OrderId, OrderItemId, PaymentId, ProductId, UserId,
};
use mercato_order::{
    CartItem, Customer, NewOrder, NewPayment, Order, OrderItem, OrderStore, OrderTx, Payment,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::error;

const ORDER_COLUMNS: &str = "id, user_id, shipping_address_id, total, is_paid, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, created_at";
const PAYMENT_COLUMNS: &str =
    "id, order_id, amount, currency, status, payment_method, created_at, updated_at";

fn db_err(err: sqlx::Error) -> CoreError {
    error!("Database error: {}", err);
    CoreError::Storage(err.to_string())
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    email: String,
    shipping_address_id: Option<i64>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: UserId(row.id),
            email: row.email,
            shipping_address_id: row.shipping_address_id.map(AddressId),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: i64,
    quantity: i32,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: Decimal,
    qty_in_stock: i32,
    discount_name: Option<String>,
    discount_percent: Option<Decimal>,
    discount_start_date: Option<NaiveDate>,
    discount_end_date: Option<NaiveDate>,
    discount_is_active: Option<bool>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let discount = match (
            row.discount_name,
            row.discount_percent,
            row.discount_start_date,
            row.discount_end_date,
            row.discount_is_active,
        ) {
            (Some(name), Some(discount_percent), Some(start_date), Some(end_date), Some(is_active)) => {
                Some(ProductDiscount {
                    name,
                    discount_percent,
                    start_date,
                    end_date,
                    is_active,
                })
            }
            _ => None,
        };
        Product {
            id: ProductId(row.id),
            name: row.name,
            price: row.price,
            qty_in_stock: row.qty_in_stock,
            discount,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    shipping_address_id: Option<i64>,
    total: Decimal,
    is_paid: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: OrderId(row.id),
            user_id: UserId(row.user_id),
            shipping_address_id: row.shipping_address_id.map(AddressId),
            total: row.total,
            is_paid: row.is_paid,
            created_at: row.created_at,
            updated_at: row.updated_at,
            items: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    quantity: i32,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: OrderItemId(row.id),
            order_id: OrderId(row.order_id),
            product_id: ProductId(row.product_id),
            quantity: row.quantity,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    order_id: i64,
    amount: Decimal,
    currency: String,
    status: String,
    payment_method: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status: PaymentStatus = row.status.trim().parse().map_err(CoreError::Storage)?;
        Ok(Payment {
            id: PaymentId(row.id),
            order_id: OrderId(row.order_id),
            amount: row.amount,
            currency: row.currency,
            status,
            payment_method: Some(row.payment_method).filter(|m| !m.is_empty()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed [`OrderStore`]. Row locks are `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> CoreResult<Box<dyn OrderTx>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgOrderTx { tx }))
    }

    async fn find_customer(&self, user_id: UserId) -> CoreResult<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT u.id, u.email, a.id AS shipping_address_id
            FROM users u
            LEFT JOIN shipping_addresses a ON a.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Customer::from))
        .map_err(db_err)
    }

    async fn cart_items(&self, user_id: UserId) -> CoreResult<Vec<CartItem>> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            "SELECT product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| CartItem {
                product_id: ProductId(row.product_id),
                quantity: row.quantity,
            })
            .collect())
    }

    async fn get_order(&self, order_id: OrderId) -> CoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = Order::from(row);
        order.items = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(order_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(OrderItem::from)
        .collect();
        Ok(Some(order))
    }

    async fn list_orders(&self, user_id: UserId, is_paid: Option<bool>) -> CoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {} FROM orders
            WHERE user_id = $1 AND ($2::BOOLEAN IS NULL OR is_paid = $2)
            ORDER BY created_at DESC, id DESC
            "#,
            ORDER_COLUMNS
        ))
        .bind(user_id.get())
        .bind(is_paid)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {} FROM order_items WHERE order_id = ANY($1) ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let item = OrderItem::from(row);
            items.entry(item.order_id).or_default().push(item);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut order = Order::from(row);
                order.items = items.remove(&order.id).unwrap_or_default();
                order
            })
            .collect())
    }

    async fn find_unpaid_before(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<OrderId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM orders WHERE NOT is_paid AND created_at < $1 ORDER BY created_at, id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(ids.into_iter().map(OrderId).collect())
    }

    async fn get_payment(&self, order_id: OrderId) -> CoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(order_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Payment::try_from)
        .transpose()
    }
}

pub struct PgOrderTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTx for PgOrderTx {
    async fn lock_stock(&mut self, product_id: ProductId) -> CoreResult<Option<i32>> {
        sqlx::query_scalar::<_, i32>("SELECT qty_in_stock FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn write_stock(&mut self, product_id: ProductId, qty_in_stock: i32) -> CoreResult<()> {
        sqlx::query("UPDATE products SET qty_in_stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id.get())
            .bind(qty_in_stock)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl OrderTx for PgOrderTx {
    async fn find_customer(&mut self, user_id: UserId) -> CoreResult<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT u.id, u.email, a.id AS shipping_address_id
            FROM users u
            LEFT JOIN shipping_addresses a ON a.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map(|row| row.map(Customer::from))
        .map_err(db_err)
    }

    async fn cart_items(&mut self, user_id: UserId) -> CoreResult<Vec<CartItem>> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            "SELECT product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| CartItem {
                product_id: ProductId(row.product_id),
                quantity: row.quantity,
            })
            .collect())
    }

    async fn lock_products(&mut self, product_ids: &[ProductId]) -> CoreResult<Vec<Product>> {
        let ids: Vec<i64> = product_ids.iter().map(|id| id.get()).collect();
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT p.id, p.name, p.price, p.qty_in_stock,
                   d.name AS discount_name,
                   d.discount_percent,
                   d.start_date AS discount_start_date,
                   d.end_date AS discount_end_date,
                   d.is_active AS discount_is_active
            FROM products p
            LEFT JOIN product_discounts d ON d.id = p.discount_id
            WHERE p.id = ANY($1)
            ORDER BY p.id
            FOR UPDATE OF p
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> CoreResult<Order> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (user_id, shipping_address_id, total) VALUES ($1, $2, $3) RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order.user_id.get())
        .bind(order.shipping_address_id.map(AddressId::get))
        .bind(order.total)
        .fetch_one(&mut *self.tx)
        .await
        .map(Order::from)
        .map_err(db_err)
    }

    async fn insert_order_item(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> CoreResult<OrderItem> {
        sqlx::query_as::<_, OrderItemRow>(&format!(
            "INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3) RETURNING {}",
            ITEM_COLUMNS
        ))
        .bind(order_id.get())
        .bind(product_id.get())
        .bind(quantity)
        .fetch_one(&mut *self.tx)
        .await
        .map(OrderItem::from)
        .map_err(db_err)
    }

    async fn lock_order(&mut self, order_id: OrderId) -> CoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = Order::from(row);
        order.items = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY id FOR UPDATE",
            ITEM_COLUMNS
        ))
        .bind(order_id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(OrderItem::from)
        .collect();
        Ok(Some(order))
    }

    async fn delete_order_item(&mut self, item_id: OrderItemId) -> CoreResult<()> {
        sqlx::query("DELETE FROM order_items WHERE id = $1")
            .bind(item_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_order(&mut self, order_id: OrderId) -> CoreResult<()> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn mark_order_paid(&mut self, order_id: OrderId) -> CoreResult<()> {
        let result = sqlx::query("UPDATE orders SET is_paid = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(order_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("order {}", order_id)));
        }
        Ok(())
    }

    async fn lock_payment(&mut self, order_id: OrderId) -> CoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(order_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?
        .map(Payment::try_from)
        .transpose()
    }

    async fn delete_payments(&mut self, order_id: OrderId) -> CoreResult<u64> {
        sqlx::query("DELETE FROM payments WHERE order_id = $1")
            .bind(order_id.get())
            .execute(&mut *self.tx)
            .await
            .map(|result| result.rows_affected())
            .map_err(db_err)
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> CoreResult<Payment> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments (order_id, amount, currency, status) VALUES ($1, $2, $3, $4) RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment.order_id.get())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(PaymentStatus::Pending.code())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Payment::try_from(row)
    }

    async fn update_payment(&mut self, payment: &Payment) -> CoreResult<()> {
        sqlx::query(
            "UPDATE payments SET status = $2, payment_method = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(payment.id.get())
        .bind(payment.status.code())
        .bind(payment.payment_method.as_deref().unwrap_or_default())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await.map_err(db_err)
    }
}
