//! OAuth redirect target for the Square authorization flow.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Exchanges the authorization code and stores the connection.
///
/// Redirects to the admin console when `server.public_url` is set,
/// otherwise answers with the connection status.
///
/// GET /api/v1/oauth/square/callback
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    if let Some(error) = query.error.as_deref() {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "Square authorization was declined"
        );
        return Err(ApiError::Validation(format!(
            "Authorization was not granted: {}",
            error
        )));
    }

    let (Some(code), Some(oauth_state)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Err(ApiError::Validation(
            "code and state are required".to_string(),
        ));
    };

    let status = state
        .services
        .oauth
        .exchange_code(code, oauth_state)
        .await?;
    tracing::info!(
        merchant_id = status.merchant_id.as_deref().unwrap_or(""),
        "Square account connected"
    );

    let public_url = state.config.server.public_url.trim_end_matches('/');
    if public_url.is_empty() {
        Ok(Json(status).into_response())
    } else {
        let target = format!("{}/admin/integrations/square?connected=1", public_url);
        Ok(Redirect::to(&target).into_response())
    }
}
