//! Product domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A storefront product. Products are authored by the admin site and
/// refreshed from the provider catalog by SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub visible: bool,
    /// Provider catalog item id
    pub remote_catalog_id: Option<String>,
    /// Provider catalog variation id used on order lines
    pub remote_variation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// A product can be added to a cart only when it is visible and linked
    /// to the provider catalog.
    pub fn is_purchasable(&self) -> bool {
        self.visible && self.remote_catalog_id.is_some()
    }
}

/// Catalog values applied to the local product matching `sku`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedProductUpdate {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub remote_catalog_id: String,
    pub remote_variation_id: String,
}

/// Outcome of a catalog synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub total: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
}
