//! Operator endpoints for the Square connection and catalog sync.
//!
//! All routes sit behind `require_admin`.

use axum::{extract::State, http::StatusCode, Json};
use domain::models::{ConnectionStatus, SyncReport};
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_catalog_sync;

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub authorization_url: String,
}

/// Start the authorization flow.
///
/// GET /api/v1/admin/square/connect
pub async fn connect(State(state): State<AppState>) -> Result<Json<ConnectResponse>, ApiError> {
    let authorization_url = state.services.oauth.build_authorization_url()?;
    Ok(Json(ConnectResponse { authorization_url }))
}

/// GET /api/v1/admin/square/status
pub async fn status(State(state): State<AppState>) -> Result<Json<ConnectionStatus>, ApiError> {
    Ok(Json(state.services.oauth.status().await?))
}

/// POST /api/v1/admin/square/refresh
pub async fn refresh(State(state): State<AppState>) -> Result<Json<ConnectionStatus>, ApiError> {
    let status = state.services.oauth.refresh().await?;
    tracing::info!("Square access token refreshed");
    Ok(Json(status))
}

/// DELETE /api/v1/admin/square/connection
pub async fn disconnect(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.services.oauth.disconnect().await?;
    tracing::info!("Square connection removed");
    Ok(StatusCode::NO_CONTENT)
}

/// Pull the provider catalog into local products.
///
/// POST /api/v1/admin/catalog/sync
pub async fn sync_catalog(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    let report = state.services.catalog_sync.run().await?;
    record_catalog_sync(&report);
    Ok(Json(report))
}
