//! Cart identity extractor.
//!
//! A cart request is identified by the guest session id, taken from the
//! `x-cart-session` header or the `session_id` query parameter, and by an
//! optional shopper access token in `Authorization: Bearer`.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Uri},
};
use domain::models::CartOwner;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

pub const CART_SESSION_HEADER: &str = "x-cart-session";

/// Longest session id accepted from a client.
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Clone, Default)]
pub struct CartSession {
    pub session_id: Option<String>,
    pub user_id: Option<Uuid>,
}

impl CartSession {
    pub fn owner(&self) -> CartOwner {
        CartOwner {
            session_id: self.session_id.clone(),
            user_id: self.user_id,
        }
    }

    /// The signed-in user, for routes that require one.
    pub fn require_user(&self) -> Result<Uuid, ApiError> {
        self.user_id
            .ok_or_else(|| ApiError::Unauthorized("Sign-in required".to_string()))
    }
}

fn session_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CART_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(clean_session_id)
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: Option<String>,
}

fn session_from_query(uri: &Uri) -> Option<String> {
    let Query(query) = Query::<SessionQuery>::try_from_uri(uri).ok()?;
    query.session_id.as_deref().and_then(clean_session_id)
}

fn clean_session_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| id.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for CartSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = session_from_header(&parts.headers)
            .or_else(|| session_from_query(&parts.uri));

        let user_id = match bearer_token(&parts.headers)? {
            None => None,
            Some(token) => {
                let verifier = state.user_tokens.as_ref().ok_or_else(|| {
                    ApiError::Unauthorized("Shopper sign-in is not enabled".to_string())
                })?;
                let user_id = verifier.verify(token).map_err(|e| {
                    tracing::debug!(error = %e, "Rejected shopper token");
                    ApiError::Unauthorized("Invalid or expired token".to_string())
                })?;
                Some(user_id)
            }
        };

        Ok(CartSession {
            session_id,
            user_id,
        })
    }
}
