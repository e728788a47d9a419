//! Product entity (database row mapping).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::Product;

/// Database row mapping for the products table.
#[derive(Debug, Clone, FromRow)]
pub struct ProductEntity {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub visible: bool,
    pub remote_catalog_id: Option<String>,
    pub remote_variation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductEntity> for Product {
    fn from(entity: ProductEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            description: entity.description,
            price: entity.price,
            image_url: entity.image_url,
            sku: entity.sku,
            visible: entity.visible,
            remote_catalog_id: entity.remote_catalog_id,
            remote_variation_id: entity.remote_variation_id,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
