//! Provider catalog synchronization.
//!
//! Local products are matched to provider catalog items by SKU. The first
//! variation carrying both a SKU and a price supplies the values; items
//! without one are skipped. Older schemas without the remote id columns are
//! handled by falling back to an update that leaves them out.

use std::collections::HashMap;
use std::sync::Arc;

use shared::money::from_minor_units;

use crate::error::CommerceError;
use crate::models::remote::CatalogObject;
use crate::models::{SyncReport, SyncedProductUpdate};
use crate::services::oauth::OAuthManager;
use crate::services::provider::CommerceProvider;
use crate::store::{ProductStore, StoreError};

pub struct CatalogSyncJob {
    products: Arc<dyn ProductStore>,
    provider: Arc<dyn CommerceProvider>,
    oauth: Arc<OAuthManager>,
}

impl CatalogSyncJob {
    pub fn new(
        products: Arc<dyn ProductStore>,
        provider: Arc<dyn CommerceProvider>,
        oauth: Arc<OAuthManager>,
    ) -> Self {
        Self {
            products,
            provider,
            oauth,
        }
    }

    /// Fetches every catalog page.
    async fn fetch_catalog(&self, access_token: &str) -> Result<Vec<CatalogObject>, CommerceError> {
        let mut objects = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .provider
                .list_catalog(access_token, cursor.as_deref())
                .await?;
            objects.extend(page.objects);
            match page.cursor.filter(|c| !c.is_empty()) {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(objects)
    }

    pub async fn run(&self) -> Result<SyncReport, CommerceError> {
        let access_token = self.oauth.resolve_access_token().await?;
        let objects = self.fetch_catalog(&access_token).await?;

        let images: HashMap<&str, &str> = objects
            .iter()
            .filter(|o| o.object_type == "IMAGE")
            .filter_map(|o| {
                let url = o.image_data.as_ref()?.url.as_deref()?;
                Some((o.id.as_str(), url))
            })
            .collect();

        let mut report = SyncReport::default();
        let mut with_remote_ids = true;

        for object in objects.iter().filter(|o| o.object_type == "ITEM") {
            report.total += 1;
            let Some(update) = extract_update(object, &images) else {
                report.skipped += 1;
                continue;
            };

            let mut result = self
                .products
                .update_synced_product(&update, with_remote_ids)
                .await;
            if with_remote_ids && matches!(result, Err(StoreError::UnknownColumn(_))) {
                tracing::warn!("Product remote id columns missing; continuing without them");
                with_remote_ids = false;
                result = self.products.update_synced_product(&update, false).await;
            }

            match result {
                Ok(true) => report.updated += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(sku = %update.sku, error = %e, "Failed to update product");
                    report.errors += 1;
                }
            }
        }

        tracing::info!(
            total = report.total,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors,
            "Catalog sync finished"
        );
        Ok(report)
    }
}

/// Builds the product update for a catalog item, or `None` when no
/// variation has both a SKU and a price.
fn extract_update(item: &CatalogObject, images: &HashMap<&str, &str>) -> Option<SyncedProductUpdate> {
    let data = item.item_data.as_ref()?;
    let (variation_id, sku, amount) = data.variations.iter().find_map(|v| {
        let vd = v.item_variation_data.as_ref()?;
        let sku = vd.sku.as_deref().filter(|s| !s.is_empty())?;
        let price = vd.price_money.as_ref()?;
        Some((v.id.clone(), sku.to_string(), price.amount))
    })?;

    let image_url = data
        .image_ids
        .iter()
        .find_map(|id| images.get(id.as_str()))
        .map(|url| url.to_string());

    Some(SyncedProductUpdate {
        sku,
        name: data.name.clone().unwrap_or_default(),
        description: data.description.clone(),
        price: from_minor_units(amount),
        image_url,
        remote_catalog_id: item.id.clone(),
        remote_variation_id: variation_id,
    })
}
