//! Provider OAuth connection lifecycle.
//!
//! Operators connect the shop's provider account through the authorization
//! code flow. Tokens are stored encrypted under a single provider key and
//! resolved for every outbound provider call. A static operator token, when
//! configured, takes precedence over the stored one.

use std::sync::Arc;

use chrono::{Duration, Utc};
use shared::crypto::{CredentialVault, OAuthStateSigner};
use url::Url;

use crate::error::CommerceError;
use crate::models::remote::{TokenGrant, TokenRequest, TokenResponse};
use crate::models::{ConnectionStatus, StoredToken, TokenSource};
use crate::services::provider::CommerceProvider;
use crate::store::TokenStore;

/// Access token lifetime assumed when the provider omits `expires_at`.
const DEFAULT_TOKEN_TTL_MINUTES: i64 = 55;

/// Resolved OAuth settings for the provider integration.
#[derive(Clone, Default)]
pub struct OAuthSettings {
    pub enabled: bool,
    /// Key the stored token is filed under.
    pub provider_key: String,
    pub application_id: String,
    pub application_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    /// Operator-supplied access token that bypasses the OAuth flow.
    pub static_access_token: Option<String>,
    pub location_id: Option<String>,
    /// `sandbox` or `production`
    pub environment: String,
    /// Base URL hosting `/oauth2/authorize`.
    pub authorize_base_url: String,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("enabled", &self.enabled)
            .field("provider_key", &self.provider_key)
            .field("application_id", &self.application_id)
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("location_id", &self.location_id)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl OAuthSettings {
    fn static_token(&self) -> Option<&str> {
        self.static_access_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }

    fn configured_location(&self) -> Option<&str> {
        self.location_id.as_deref().filter(|id| !id.is_empty())
    }

    fn has_app_credentials(&self) -> bool {
        !self.application_id.is_empty()
            && !self.application_secret.is_empty()
            && !self.redirect_url.is_empty()
    }
}

/// Manages the provider OAuth connection.
pub struct OAuthManager {
    settings: OAuthSettings,
    vault: Arc<CredentialVault>,
    signer: OAuthStateSigner,
    tokens: Arc<dyn TokenStore>,
    provider: Arc<dyn CommerceProvider>,
}

impl OAuthManager {
    pub fn new(
        settings: OAuthSettings,
        vault: Arc<CredentialVault>,
        tokens: Arc<dyn TokenStore>,
        provider: Arc<dyn CommerceProvider>,
    ) -> Self {
        let signer = OAuthStateSigner::from_vault(&vault);
        Self {
            settings,
            vault,
            signer,
            tokens,
            provider,
        }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    fn ensure_enabled(&self) -> Result<(), CommerceError> {
        if self.settings.enabled {
            Ok(())
        } else {
            Err(CommerceError::NotConfigured(
                "provider integration is disabled".to_string(),
            ))
        }
    }

    fn ensure_app_credentials(&self) -> Result<(), CommerceError> {
        if self.settings.has_app_credentials() {
            Ok(())
        } else {
            Err(CommerceError::NotConfigured(
                "OAuth application credentials are incomplete".to_string(),
            ))
        }
    }

    /// Builds the URL operators visit to grant access, embedding a freshly
    /// signed state token.
    pub fn build_authorization_url(&self) -> Result<String, CommerceError> {
        self.ensure_enabled()?;
        self.ensure_app_credentials()?;
        if self.settings.scopes.is_empty() {
            return Err(CommerceError::NotConfigured(
                "no OAuth scopes configured".to_string(),
            ));
        }

        let base = format!(
            "{}/oauth2/authorize",
            self.settings.authorize_base_url.trim_end_matches('/')
        );
        let state = self.signer.issue();
        let scope = self.settings.scopes.join(" ");
        let url = Url::parse_with_params(
            &base,
            &[
                ("client_id", self.settings.application_id.as_str()),
                ("scope", scope.as_str()),
                ("session", "false"),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| CommerceError::NotConfigured(format!("invalid authorize URL: {}", e)))?;

        Ok(url.into())
    }

    /// Completes the authorization code flow. The state is checked before
    /// anything is sent to the provider.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
    ) -> Result<ConnectionStatus, CommerceError> {
        self.ensure_enabled()?;
        if !self.signer.validate(state) {
            tracing::warn!("OAuth callback rejected: invalid state");
            return Err(CommerceError::InvalidState);
        }
        if code.is_empty() {
            return Err(CommerceError::Validation(
                "authorization code is required".to_string(),
            ));
        }
        self.ensure_app_credentials()?;

        let response = self
            .request_token(TokenGrant::AuthorizationCode {
                code: code.to_string(),
            })
            .await?;
        let previous = self.tokens.find_token(&self.settings.provider_key).await?;
        self.persist_token(response, None, previous.as_ref()).await?;

        tracing::info!(
            provider = %self.settings.provider_key,
            environment = %self.settings.environment,
            "Provider account connected"
        );

        self.status().await
    }

    /// Exchanges the stored refresh token for a new access token.
    pub async fn refresh(&self) -> Result<ConnectionStatus, CommerceError> {
        self.ensure_enabled()?;
        let stored = self
            .tokens
            .find_token(&self.settings.provider_key)
            .await?
            .ok_or(CommerceError::NotConnected)?;
        let encrypted_refresh = stored
            .refresh_token_encrypted
            .as_deref()
            .ok_or(CommerceError::NotConnected)?;
        let refresh_token = self.vault.decrypt(encrypted_refresh)?;
        self.ensure_app_credentials()?;

        let response = self
            .request_token(TokenGrant::RefreshToken {
                refresh_token: refresh_token.clone(),
            })
            .await?;
        self.persist_token(response, Some(refresh_token), Some(&stored))
            .await?;

        tracing::info!(provider = %self.settings.provider_key, "Provider token refreshed");

        self.status().await
    }

    async fn request_token(&self, grant: TokenGrant) -> Result<TokenResponse, CommerceError> {
        let grant_type = grant.grant_type();
        let request = TokenRequest {
            client_id: self.settings.application_id.clone(),
            client_secret: self.settings.application_secret.clone(),
            redirect_uri: Some(self.settings.redirect_url.clone()),
            grant,
        };
        self.provider.request_token(request).await.map_err(|e| {
            tracing::error!(grant_type, error = %e, "Provider token request failed");
            CommerceError::from(e)
        })
    }

    /// Encrypts and stores a token response. `fallback_refresh` is kept when
    /// the provider does not rotate the refresh token.
    async fn persist_token(
        &self,
        response: TokenResponse,
        fallback_refresh: Option<String>,
        previous: Option<&StoredToken>,
    ) -> Result<(), CommerceError> {
        let now = Utc::now();
        let refresh_token = response.refresh_token.or(fallback_refresh);
        let record = StoredToken {
            provider: self.settings.provider_key.clone(),
            access_token_encrypted: self.vault.encrypt(&response.access_token),
            refresh_token_encrypted: refresh_token.as_deref().map(|t| self.vault.encrypt(t)),
            expires_at: Some(
                response
                    .expires_at
                    .unwrap_or_else(|| now + Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES)),
            ),
            merchant_id: response
                .merchant_id
                .or_else(|| previous.and_then(|p| p.merchant_id.clone())),
            location_id: self
                .settings
                .configured_location()
                .map(str::to_string)
                .or_else(|| previous.and_then(|p| p.location_id.clone())),
            environment: self.settings.environment.clone(),
            metadata: serde_json::json!({
                "scopes": self.settings.scopes,
                "token_type": response.token_type,
            }),
            updated_at: now,
        };
        self.tokens.upsert_token(record).await?;
        Ok(())
    }

    /// Returns the access token for provider calls.
    pub async fn resolve_access_token(&self) -> Result<String, CommerceError> {
        self.ensure_enabled()?;
        if let Some(token) = self.settings.static_token() {
            return Ok(token.to_string());
        }
        let stored = self
            .tokens
            .find_token(&self.settings.provider_key)
            .await?
            .ok_or(CommerceError::NotConnected)?;
        if stored.expires_at.is_some_and(|at| at <= Utc::now()) {
            tracing::warn!(
                provider = %self.settings.provider_key,
                "Stored provider token has expired; refresh required"
            );
        }
        Ok(self.vault.decrypt(&stored.access_token_encrypted)?)
    }

    /// Returns the location used for orders, payments and bookings.
    pub async fn resolve_location_id(&self) -> Result<String, CommerceError> {
        self.ensure_enabled()?;
        if let Some(location) = self.settings.configured_location() {
            return Ok(location.to_string());
        }
        self.tokens
            .find_token(&self.settings.provider_key)
            .await?
            .and_then(|t| t.location_id)
            .ok_or_else(|| CommerceError::NotConfigured("no provider location id".to_string()))
    }

    pub async fn status(&self) -> Result<ConnectionStatus, CommerceError> {
        let environment = self.settings.environment.clone();
        if !self.settings.enabled {
            return Ok(ConnectionStatus {
                connected: false,
                source: TokenSource::None,
                merchant_id: None,
                location_id: None,
                expires_at: None,
                expired: false,
                environment,
            });
        }
        if self.settings.static_token().is_some() {
            return Ok(ConnectionStatus {
                connected: true,
                source: TokenSource::Static,
                merchant_id: None,
                location_id: self.settings.configured_location().map(str::to_string),
                expires_at: None,
                expired: false,
                environment,
            });
        }

        let status = match self.tokens.find_token(&self.settings.provider_key).await? {
            Some(stored) => ConnectionStatus {
                connected: true,
                source: TokenSource::Oauth,
                merchant_id: stored.merchant_id,
                location_id: self
                    .settings
                    .configured_location()
                    .map(str::to_string)
                    .or(stored.location_id),
                expires_at: stored.expires_at,
                expired: stored.expires_at.is_some_and(|at| at <= Utc::now()),
                environment: stored.environment,
            },
            None => ConnectionStatus {
                connected: false,
                source: TokenSource::None,
                merchant_id: None,
                location_id: self.settings.configured_location().map(str::to_string),
                expires_at: None,
                expired: false,
                environment,
            },
        };
        Ok(status)
    }

    /// Removes the stored connection. Disconnecting twice is not an error.
    pub async fn disconnect(&self) -> Result<(), CommerceError> {
        let removed = self.tokens.delete_token(&self.settings.provider_key).await?;
        tracing::info!(
            provider = %self.settings.provider_key,
            removed,
            "Provider account disconnected"
        );
        Ok(())
    }

    #[cfg(test)]
    fn signer(&self) -> &OAuthStateSigner {
        &self.signer
    }
}
