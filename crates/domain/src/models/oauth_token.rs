//! Stored provider OAuth credentials.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Provider credentials at rest. Token fields hold vault ciphertext, never
/// plaintext.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub provider: String,
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub merchant_id: Option<String>,
    pub location_id: Option<String>,
    pub environment: String,
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Where the active access token comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Static,
    Oauth,
    None,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static => write!(f, "static"),
            TokenSource::Oauth => write!(f, "oauth"),
            TokenSource::None => write!(f, "none"),
        }
    }
}

/// Connection status reported to operators. Carries no token material.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub source: TokenSource,
    pub merchant_id: Option<String>,
    pub location_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub environment: String,
}
