//! Storage boundary for the commerce services.
//!
//! Services depend on these traits only; the persistence crate implements
//! them over PostgreSQL; the in-memory store behind the `test-util`
//! feature implements them for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Booking, Cart, CartItem, CartLine, NewBooking, NewCart, NewOrder, NewOrderItem, Order,
    Product, Service, StoredToken, SyncedProductUpdate,
};

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The schema lacks a column the statement referenced.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_cart_by_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>>;

    async fn find_cart_by_session(&self, session_id: &str) -> StoreResult<Option<Cart>>;

    async fn create_cart(&self, cart: NewCart) -> StoreResult<Cart>;

    /// Slides the cart's expiry and bumps `updated_at`.
    async fn touch_cart(&self, cart_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()>;

    async fn attach_user(&self, cart_id: Uuid, user_id: Uuid) -> StoreResult<()>;

    async fn delete_cart(&self, cart_id: Uuid) -> StoreResult<()>;

    /// Lines of a cart joined with product display fields, oldest first.
    async fn list_items(&self, cart_id: Uuid) -> StoreResult<Vec<CartLine>>;

    async fn find_item(&self, item_id: Uuid) -> StoreResult<Option<CartItem>>;

    /// Adds `quantity` to the line for `product_id`, creating it if absent,
    /// and refreshes its price snapshot. Must be a single atomic statement
    /// so concurrent adds converge on one line.
    async fn upsert_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> StoreResult<CartItem>;

    async fn set_item_quantity(&self, item_id: Uuid, quantity: i32) -> StoreResult<()>;

    async fn delete_item(&self, item_id: Uuid) -> StoreResult<()>;

    async fn clear_items(&self, cart_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_product(&self, product_id: Uuid) -> StoreResult<Option<Product>>;

    /// Applies catalog values to the product with `update.sku`. Returns
    /// `false` when no such product exists. With `with_remote_ids` unset the
    /// remote id columns are left untouched.
    async fn update_synced_product(
        &self,
        update: &SyncedProductUpdate,
        with_remote_ids: bool,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order and its lines together.
    async fn create_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> StoreResult<Order>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_service(&self, service_id: Uuid) -> StoreResult<Option<Service>>;

    async fn create_booking(&self, booking: NewBooking) -> StoreResult<Booking>;

    /// Returns `false` when no booking has `remote_booking_id`.
    async fn update_booking_status(
        &self,
        remote_booking_id: &str,
        status: &str,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_token(&self, provider: &str) -> StoreResult<Option<StoredToken>>;

    /// Inserts or replaces the record keyed by `token.provider`.
    async fn upsert_token(&self, token: StoredToken) -> StoreResult<()>;

    /// Returns `false` when nothing was stored.
    async fn delete_token(&self, provider: &str) -> StoreResult<bool>;
}
