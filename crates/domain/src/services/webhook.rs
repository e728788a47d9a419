//! Inbound provider webhook verification.
//!
//! The provider signs each notification with
//! `base64(HMAC-SHA256(signature_key, notification_url + raw_body))`.
//! Verification needs the exact URL the provider posted to, so it is
//! rebuilt from forwarding headers when the service runs behind a proxy.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use shared::crypto::verify_hmac_sha256;

/// Header carrying the notification signature.
pub const SIGNATURE_HEADER: &str = "x-square-hmacsha256-signature";

/// Request facts needed to verify a notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookRequest<'a> {
    pub signature: Option<&'a str>,
    pub url: &'a str,
    pub body: &'a [u8],
}

/// Parts used to reconstruct the notification URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlParts<'a> {
    pub forwarded_proto: Option<&'a str>,
    pub forwarded_host: Option<&'a str>,
    pub scheme: Option<&'a str>,
    pub host: Option<&'a str>,
    pub path_and_query: &'a str,
}

/// Rebuilds `{proto}://{host}{path_and_query}`, preferring the first value
/// of each forwarding header over the request's own scheme and host.
pub fn notification_url(parts: UrlParts<'_>) -> String {
    fn first(value: Option<&str>) -> Option<&str> {
        value
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    let proto = first(parts.forwarded_proto)
        .or(parts.scheme)
        .unwrap_or("https");
    let host = first(parts.forwarded_host)
        .or(parts.host)
        .unwrap_or_default();
    format!("{}://{}{}", proto, host, parts.path_and_query)
}

#[derive(Clone)]
pub struct WebhookVerifier {
    signature_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("configured", &self.signature_key.is_some())
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(signature_key: Option<&str>) -> Self {
        Self {
            signature_key: signature_key
                .filter(|k| !k.is_empty())
                .map(|k| k.as_bytes().to_vec()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.signature_key.is_some()
    }

    /// Returns whether the notification carries a valid signature. Missing
    /// key, header or body are all invalid.
    pub fn is_valid(&self, request: &WebhookRequest<'_>) -> bool {
        let Some(key) = self.signature_key.as_deref() else {
            return false;
        };
        let Some(signature) = request.signature.map(str::trim).filter(|s| !s.is_empty()) else {
            return false;
        };
        if request.body.is_empty() {
            return false;
        }
        let Ok(tag) = STANDARD.decode(signature) else {
            return false;
        };
        verify_hmac_sha256(key, &[request.url.as_bytes(), request.body], &tag)
    }
}

/// Envelope of a provider notification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub data: Option<WebhookEventData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<serde_json::Value>,
}

impl WebhookEvent {
    /// For `booking.created` / `booking.updated`, the booking id and status.
    pub fn booking_update(&self) -> Option<(String, String)> {
        if !matches!(
            self.event_type.as_str(),
            "booking.created" | "booking.updated"
        ) {
            return None;
        }
        let booking = self.data.as_ref()?.object.as_ref()?.get("booking")?;
        let id = booking.get("id")?.as_str()?;
        let status = booking.get("status")?.as_str()?;
        Some((id.to_string(), status.to_string()))
    }
}
