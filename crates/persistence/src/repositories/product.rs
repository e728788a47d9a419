//! Product repository for database operations.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{Product, SyncedProductUpdate};
use domain::store::{ProductStore, StoreResult};

use crate::entities::ProductEntity;
use crate::error::store_error;
use crate::metrics::QueryTimer;

/// Repository for product database operations.
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ProductEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_product_by_id");
        let result = sqlx::query_as::<_, ProductEntity>(
            r#"
            SELECT * FROM products WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Updates the product matching `update.sku`, including the remote
    /// catalog and variation ids. Returns whether a row matched.
    pub async fn update_from_catalog(
        &self,
        update: &SyncedProductUpdate,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("update_product_from_catalog");
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = $2,
                description = $3,
                price = $4,
                image_url = COALESCE($5, image_url),
                remote_catalog_id = $6,
                remote_variation_id = $7,
                updated_at = NOW()
            WHERE sku = $1
            "#,
        )
        .bind(&update.sku)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price)
        .bind(&update.image_url)
        .bind(&update.remote_catalog_id)
        .bind(&update.remote_variation_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    /// Same as [`Self::update_from_catalog`] for schemas without the remote
    /// id columns.
    pub async fn update_from_catalog_basic(
        &self,
        update: &SyncedProductUpdate,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("update_product_from_catalog_basic");
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = $2,
                description = $3,
                price = $4,
                image_url = COALESCE($5, image_url),
                updated_at = NOW()
            WHERE sku = $1
            "#,
        )
        .bind(&update.sku)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price)
        .bind(&update.image_url)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}

#[async_trait]
impl ProductStore for ProductRepository {
    async fn find_product(&self, product_id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self
            .find_by_id(product_id)
            .await
            .map_err(store_error)?
            .map(Into::into))
    }

    async fn update_synced_product(
        &self,
        update: &SyncedProductUpdate,
        with_remote_ids: bool,
    ) -> StoreResult<bool> {
        let result = if with_remote_ids {
            self.update_from_catalog(update).await
        } else {
            self.update_from_catalog_basic(update).await
        };
        result.map_err(store_error)
    }
}
