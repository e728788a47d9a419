//! Admin authentication middleware.
//!
//! Admin routes require an `X-Admin-Key` header whose SHA-256 matches the
//! configured `security.admin_key_hash`.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared::crypto::sha256_hex;

use crate::app::AppState;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected = state.config.security.admin_key_hash.trim();
    if expected.is_empty() {
        tracing::warn!(path = %req.uri().path(), "Admin request rejected: no admin key configured");
        return forbidden_response("Admin access is not configured");
    }

    let api_key = match req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(key) if !key.is_empty() => key,
        _ => return unauthorized_response("Invalid or missing admin key"),
    };

    if !admin_key_matches(api_key, expected) {
        tracing::warn!(path = %req.uri().path(), "Admin request rejected: key mismatch");
        return unauthorized_response("Invalid or missing admin key");
    }

    next.run(req).await
}

/// Compares the key's digest with the configured hex digest without
/// short-circuiting on the first differing byte.
fn admin_key_matches(key: &str, expected_hash: &str) -> bool {
    let actual = sha256_hex(key);
    let expected = expected_hash.to_ascii_lowercase();
    if actual.len() != expected.len() {
        return false;
    }
    actual
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "message": message
        })),
    )
        .into_response()
}

fn forbidden_response(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "forbidden",
            "message": message
        })),
    )
        .into_response()
}
