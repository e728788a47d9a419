//! Booking endpoint handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{AvailabilityQuery, AvailabilitySlot, Booking, CreateBookingRequest};
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_booking;

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub slots: Vec<AvailabilitySlot>,
}

/// Search open slots for a synced service.
///
/// GET /api/v1/bookings/availability?service_id=..&start_at=..&end_at=..
pub async fn get_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let slots = state.services.bookings.get_availability(query).await?;
    Ok(Json(AvailabilityResponse { slots }))
}

/// POST /api/v1/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    match state.services.bookings.create_booking(request).await {
        Ok(booking) => {
            record_booking("success");
            Ok((StatusCode::CREATED, Json(booking)))
        }
        Err(e) => {
            record_booking("failure");
            Err(e.into())
        }
    }
}
