//! Provider credential repository.

use async_trait::async_trait;
use sqlx::PgPool;

use domain::models::StoredToken;
use domain::store::{StoreResult, TokenStore};

use crate::entities::OAuthTokenEntity;
use crate::error::store_error;
use crate::metrics::QueryTimer;

/// Repository for encrypted OAuth credentials, one row per provider.
#[derive(Clone)]
pub struct OAuthTokenRepository {
    pool: PgPool,
}

impl OAuthTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_provider(
        &self,
        provider: &str,
    ) -> Result<Option<OAuthTokenEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_oauth_token");
        let result = sqlx::query_as::<_, OAuthTokenEntity>(
            r#"
            SELECT * FROM oauth_tokens WHERE provider = $1
            "#,
        )
        .bind(provider)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn upsert(&self, token: &StoredToken) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_oauth_token");
        let result = sqlx::query(
            r#"
            INSERT INTO oauth_tokens (
                provider, access_token_encrypted, refresh_token_encrypted, expires_at,
                merchant_id, location_id, environment, metadata, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (provider) DO UPDATE SET
                access_token_encrypted = EXCLUDED.access_token_encrypted,
                refresh_token_encrypted = EXCLUDED.refresh_token_encrypted,
                expires_at = EXCLUDED.expires_at,
                merchant_id = EXCLUDED.merchant_id,
                location_id = EXCLUDED.location_id,
                environment = EXCLUDED.environment,
                metadata = EXCLUDED.metadata,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&token.provider)
        .bind(&token.access_token_encrypted)
        .bind(&token.refresh_token_encrypted)
        .bind(token.expires_at)
        .bind(&token.merchant_id)
        .bind(&token.location_id)
        .bind(&token.environment)
        .bind(&token.metadata)
        .bind(token.updated_at)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn delete(&self, provider: &str) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_oauth_token");
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE provider = $1")
            .bind(provider)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}

#[async_trait]
impl TokenStore for OAuthTokenRepository {
    async fn find_token(&self, provider: &str) -> StoreResult<Option<StoredToken>> {
        Ok(self
            .find_by_provider(provider)
            .await
            .map_err(store_error)?
            .map(Into::into))
    }

    async fn upsert_token(&self, token: StoredToken) -> StoreResult<()> {
        self.upsert(&token).await.map_err(store_error)
    }

    async fn delete_token(&self, provider: &str) -> StoreResult<bool> {
        self.delete(provider).await.map_err(store_error)
    }
}
