//! Cart repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{Cart, CartItem, CartLine, NewCart};
use domain::store::{CartStore, StoreResult};

use crate::entities::{CartEntity, CartItemEntity, CartLineEntity};
use crate::error::store_error;
use crate::metrics::QueryTimer;

/// Repository for cart and cart item database operations.
#[derive(Clone)]
pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    /// Creates a new CartRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The user's cart; at most one exists per user.
    pub async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<CartEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_cart_by_user");
        let result = sqlx::query_as::<_, CartEntity>(
            r#"
            SELECT * FROM carts
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<CartEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_cart_by_session");
        let result = sqlx::query_as::<_, CartEntity>(
            r#"
            SELECT * FROM carts WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn create(&self, cart: &NewCart) -> Result<CartEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_cart");
        let result = sqlx::query_as::<_, CartEntity>(
            r#"
            INSERT INTO carts (session_id, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&cart.session_id)
        .bind(cart.user_id)
        .bind(cart.expires_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn touch(&self, cart_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("touch_cart");
        let result = sqlx::query(
            r#"
            UPDATE carts SET expires_at = $2, updated_at = NOW() WHERE id = $1
            "#,
        )
        .bind(cart_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn set_user(&self, cart_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("attach_cart_user");
        let result = sqlx::query(
            r#"
            UPDATE carts SET user_id = $2, updated_at = NOW() WHERE id = $1
            "#,
        )
        .bind(cart_id)
        .bind(user_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Deletes a cart; its items go with it through the foreign key cascade.
    pub async fn delete(&self, cart_id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("delete_cart");
        let result = sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn list_lines(&self, cart_id: Uuid) -> Result<Vec<CartLineEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_cart_lines");
        let result = sqlx::query_as::<_, CartLineEntity>(
            r#"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.unit_price, ci.created_at,
                   p.name AS product_name, p.image_url AS product_image_url
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.created_at, ci.id
            "#,
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_item_by_id(
        &self,
        item_id: Uuid,
    ) -> Result<Option<CartItemEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_cart_item");
        let result = sqlx::query_as::<_, CartItemEntity>(
            r#"
            SELECT * FROM cart_items WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Adds to a line in one statement so concurrent adds converge on the
    /// (cart_id, product_id) unique key.
    pub async fn add_item_quantity(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<CartItemEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_cart_item");
        let result = sqlx::query_as::<_, CartItemEntity>(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cart_id, product_id) DO UPDATE SET
                quantity = cart_items.quantity + EXCLUDED.quantity,
                unit_price = EXCLUDED.unit_price
            RETURNING *
            "#,
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn update_item_quantity(
        &self,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("update_cart_item_quantity");
        let result = sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
            .bind(item_id)
            .bind(quantity)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn delete_item_by_id(&self, item_id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("delete_cart_item");
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn delete_items(&self, cart_id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("clear_cart_items");
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }
}

#[async_trait]
impl CartStore for CartRepository {
    async fn find_cart_by_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        Ok(self
            .find_by_user_id(user_id)
            .await
            .map_err(store_error)?
            .map(Into::into))
    }

    async fn find_cart_by_session(&self, session_id: &str) -> StoreResult<Option<Cart>> {
        Ok(self
            .find_by_session_id(session_id)
            .await
            .map_err(store_error)?
            .map(Into::into))
    }

    async fn create_cart(&self, cart: NewCart) -> StoreResult<Cart> {
        Ok(self.create(&cart).await.map_err(store_error)?.into())
    }

    async fn touch_cart(&self, cart_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.touch(cart_id, expires_at).await.map_err(store_error)
    }

    async fn attach_user(&self, cart_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.set_user(cart_id, user_id).await.map_err(store_error)
    }

    async fn delete_cart(&self, cart_id: Uuid) -> StoreResult<()> {
        self.delete(cart_id).await.map_err(store_error)
    }

    async fn list_items(&self, cart_id: Uuid) -> StoreResult<Vec<CartLine>> {
        Ok(self
            .list_lines(cart_id)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn find_item(&self, item_id: Uuid) -> StoreResult<Option<CartItem>> {
        Ok(self
            .find_item_by_id(item_id)
            .await
            .map_err(store_error)?
            .map(Into::into))
    }

    async fn upsert_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> StoreResult<CartItem> {
        Ok(self
            .add_item_quantity(cart_id, product_id, quantity, unit_price)
            .await
            .map_err(store_error)?
            .into())
    }

    async fn set_item_quantity(&self, item_id: Uuid, quantity: i32) -> StoreResult<()> {
        self.update_item_quantity(item_id, quantity)
            .await
            .map_err(store_error)
    }

    async fn delete_item(&self, item_id: Uuid) -> StoreResult<()> {
        self.delete_item_by_id(item_id).await.map_err(store_error)
    }

    async fn clear_items(&self, cart_id: Uuid) -> StoreResult<()> {
        self.delete_items(cart_id).await.map_err(store_error)
    }
}
