//! Checkout endpoint handler.

use axum::{extract::State, http::StatusCode, Json};
use domain::models::{CheckoutReceipt, CheckoutRequest};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CartSession;
use crate::middleware::metrics::record_checkout;

/// Charge the caller's cart and record the order.
///
/// POST /api/v1/checkout
pub async fn checkout(
    State(state): State<AppState>,
    session: CartSession,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), ApiError> {
    match state
        .services
        .checkout
        .checkout(&session.owner(), request)
        .await
    {
        Ok(receipt) => {
            record_checkout("success");
            Ok((StatusCode::CREATED, Json(receipt)))
        }
        Err(e) => {
            record_checkout("failure");
            Err(e.into())
        }
    }
}
