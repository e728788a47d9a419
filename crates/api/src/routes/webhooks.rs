//! Inbound Square notifications.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::HOST, HeaderMap, Uri},
    Json,
};
use domain::services::webhook::SIGNATURE_HEADER;
use domain::services::{notification_url, UrlParts, WebhookEvent, WebhookRequest};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_webhook;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// URL the notification was signed against: the configured subscription
/// URL, else rebuilt from the request.
fn signed_url(state: &AppState, headers: &HeaderMap, uri: &Uri) -> String {
    let configured = state.config.square.webhook_url.trim();
    if !configured.is_empty() {
        return configured.to_string();
    }

    notification_url(UrlParts {
        forwarded_proto: header(headers, "x-forwarded-proto"),
        forwarded_host: header(headers, "x-forwarded-host"),
        scheme: uri.scheme_str(),
        host: uri.host().or_else(|| header(headers, HOST.as_str())),
        path_and_query: uri.path_and_query().map_or("/", |pq| pq.as_str()),
    })
}

/// Verifies the signature over the raw body, then applies booking status
/// changes. Unknown event types are acknowledged and ignored.
///
/// POST /api/v1/webhooks/square
pub async fn receive(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let url = signed_url(&state, &headers, &uri);
    let request = WebhookRequest {
        signature: header(&headers, SIGNATURE_HEADER),
        url: &url,
        body: &body,
    };

    if !state.services.webhooks.is_valid(&request) {
        record_webhook("rejected");
        tracing::warn!(url = %url, "Rejected webhook with invalid signature");
        return Err(ApiError::Unauthorized("Invalid signature".to_string()));
    }
    record_webhook("accepted");

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Signed webhook body is not a recognizable event");
            return Ok(Json(json!({ "received": true })));
        }
    };
    tracing::info!(
        event_type = %event.event_type,
        event_id = event.event_id.as_deref().unwrap_or(""),
        "Webhook received"
    );

    if let Some((booking_id, status)) = event.booking_update() {
        // Acknowledge regardless; the provider retries only on non-2xx.
        if let Err(e) = state
            .services
            .bookings
            .apply_remote_update(&booking_id, &status)
            .await
        {
            tracing::error!(remote_booking_id = %booking_id, error = %e, "Failed to apply booking update");
        }
    }

    Ok(Json(json!({ "received": true })))
}
