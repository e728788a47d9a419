//! OAuth token entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::StoredToken;

/// Database row mapping for the oauth_tokens table.
#[derive(Clone, FromRow)]
pub struct OAuthTokenEntity {
    pub provider: String,
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub merchant_id: Option<String>,
    pub location_id: Option<String>,
    pub environment: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for OAuthTokenEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenEntity")
            .field("provider", &self.provider)
            .field("expires_at", &self.expires_at)
            .field("merchant_id", &self.merchant_id)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl From<OAuthTokenEntity> for StoredToken {
    fn from(entity: OAuthTokenEntity) -> Self {
        Self {
            provider: entity.provider,
            access_token_encrypted: entity.access_token_encrypted,
            refresh_token_encrypted: entity.refresh_token_encrypted,
            expires_at: entity.expires_at,
            merchant_id: entity.merchant_id,
            location_id: entity.location_id,
            environment: entity.environment,
            metadata: entity.metadata,
            updated_at: entity.updated_at,
        }
    }
}
