//! Order repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{NewOrder, NewOrderItem, Order};
use domain::store::{OrderStore, StoreResult};

use crate::entities::{OrderEntity, OrderItemEntity};
use crate::error::store_error;
use crate::metrics::QueryTimer;

/// Repository for order database operations.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an order and its lines in a single transaction.
    pub async fn insert_with_items(
        &self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<OrderEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_order");
        let mut tx = self.pool.begin().await?;

        let entity = sqlx::query_as::<_, OrderEntity>(
            r#"
            INSERT INTO orders (
                remote_order_id, remote_payment_id, email, user_id, session_id,
                subtotal, total, currency, shipping_address, billing_address, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&order.remote_order_id)
        .bind(&order.remote_payment_id)
        .bind(&order.email)
        .bind(order.user_id)
        .bind(&order.session_id)
        .bind(order.subtotal)
        .bind(order.total)
        .bind(&order.currency)
        .bind(&order.shipping_address)
        .bind(&order.billing_address)
        .bind(&order.status)
        .fetch_one(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, name, sku, unit_price, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(entity.id)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(&item.sku)
            .bind(item.unit_price)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        timer.record();
        Ok(entity)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_order_by_id");
        let result = sqlx::query_as::<_, OrderEntity>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    pub async fn list_items(&self, order_id: Uuid) -> Result<Vec<OrderItemEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_order_items");
        let result = sqlx::query_as::<_, OrderItemEntity>(
            r#"
            SELECT * FROM order_items WHERE order_id = $1 ORDER BY name, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn create_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> StoreResult<Order> {
        Ok(self
            .insert_with_items(&order, &items)
            .await
            .map_err(store_error)?
            .into())
    }
}
