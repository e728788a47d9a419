//! Cart entities (database row mappings).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::{Cart, CartItem, CartLine};

/// Database row mapping for the carts table.
#[derive(Debug, Clone, FromRow)]
pub struct CartEntity {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<CartEntity> for Cart {
    fn from(entity: CartEntity) -> Self {
        Self {
            id: entity.id,
            session_id: entity.session_id,
            user_id: entity.user_id,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            expires_at: entity.expires_at,
        }
    }
}

/// Database row mapping for the cart_items table.
#[derive(Debug, Clone, FromRow)]
pub struct CartItemEntity {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<CartItemEntity> for CartItem {
    fn from(entity: CartItemEntity) -> Self {
        Self {
            id: entity.id,
            cart_id: entity.cart_id,
            product_id: entity.product_id,
            quantity: entity.quantity,
            unit_price: entity.unit_price,
            created_at: entity.created_at,
        }
    }
}

/// Cart item joined with its product's display fields.
#[derive(Debug, Clone, FromRow)]
pub struct CartLineEntity {
    #[sqlx(flatten)]
    pub item: CartItemEntity,
    pub product_name: String,
    pub product_image_url: Option<String>,
}

impl From<CartLineEntity> for CartLine {
    fn from(entity: CartLineEntity) -> Self {
        CartLine::new(
            entity.item.into(),
            entity.product_name,
            entity.product_image_url,
        )
    }
}
