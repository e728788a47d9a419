//! Order entities (database row mappings).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::{Order, OrderItem};

/// Database row mapping for the orders table.
#[derive(Debug, Clone, FromRow)]
pub struct OrderEntity {
    pub id: Uuid,
    pub remote_order_id: String,
    pub remote_payment_id: String,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<OrderEntity> for Order {
    fn from(entity: OrderEntity) -> Self {
        Self {
            id: entity.id,
            remote_order_id: entity.remote_order_id,
            remote_payment_id: entity.remote_payment_id,
            email: entity.email,
            user_id: entity.user_id,
            session_id: entity.session_id,
            subtotal: entity.subtotal,
            total: entity.total,
            currency: entity.currency,
            shipping_address: entity.shipping_address,
            billing_address: entity.billing_address,
            status: entity.status,
            created_at: entity.created_at,
        }
    }
}

/// Database row mapping for the order_items table.
#[derive(Debug, Clone, FromRow)]
pub struct OrderItemEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl From<OrderItemEntity> for OrderItem {
    fn from(entity: OrderItemEntity) -> Self {
        Self {
            id: entity.id,
            order_id: entity.order_id,
            product_id: entity.product_id,
            name: entity.name,
            sku: entity.sku,
            unit_price: entity.unit_price,
            quantity: entity.quantity,
        }
    }
}
