//! Shopping cart endpoint handlers.
//!
//! Every response echoes the cart's session id in `x-cart-session` so guest
//! clients can keep using the cart that was created for them.

use axum::{
    extract::{Path, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
    Json,
};
use domain::models::{AddCartItemRequest, CartView, UpdateCartItemRequest};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{CartSession, CART_SESSION_HEADER};

fn cart_response(view: CartView, session: &CartSession) -> Response {
    let session_id = view.session_id.clone().or_else(|| session.session_id.clone());
    let mut response = Json(view).into_response();
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        response.headers_mut().insert(CART_SESSION_HEADER, value);
    }
    response
}

/// Get the caller's cart, creating an empty one on first use.
///
/// GET /api/v1/cart
pub async fn get_cart(
    State(state): State<AppState>,
    session: CartSession,
) -> Result<Response, ApiError> {
    let view = state.services.carts.view(&session.owner()).await?;
    Ok(cart_response(view, &session))
}

/// POST /api/v1/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    session: CartSession,
    Json(request): Json<AddCartItemRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;

    let view = state
        .services
        .carts
        .add_item(&session.owner(), request.product_id, request.quantity)
        .await?;
    Ok(cart_response(view, &session))
}

/// Set a line's quantity. Zero removes the line.
///
/// PUT /api/v1/cart/items/:item_id
pub async fn update_item(
    State(state): State<AppState>,
    session: CartSession,
    Path(item_id): Path<Uuid>,
    Json(request): Json<UpdateCartItemRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;

    let view = state
        .services
        .carts
        .update_item(&session.owner(), item_id, request.quantity)
        .await?;
    Ok(cart_response(view, &session))
}

/// DELETE /api/v1/cart/items/:item_id
pub async fn remove_item(
    State(state): State<AppState>,
    session: CartSession,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let view = state
        .services
        .carts
        .remove_item(&session.owner(), item_id)
        .await?;
    Ok(cart_response(view, &session))
}

/// DELETE /api/v1/cart
pub async fn clear_cart(
    State(state): State<AppState>,
    session: CartSession,
) -> Result<Response, ApiError> {
    let view = state.services.carts.clear(&session.owner()).await?;
    Ok(cart_response(view, &session))
}

/// Fold the guest cart identified by the session into the signed-in
/// user's cart.
///
/// POST /api/v1/cart/merge
pub async fn merge(
    State(state): State<AppState>,
    session: CartSession,
) -> Result<Response, ApiError> {
    let user_id = session.require_user()?;
    let session_id = session.session_id.as_deref().ok_or_else(|| {
        ApiError::Validation(format!("{} header is required", CART_SESSION_HEADER))
    })?;

    tracing::info!(user_id = %user_id, "Merging guest cart on login");
    let view = state
        .services
        .carts
        .merge_on_login(session_id, user_id)
        .await?;
    Ok(cart_response(view, &session))
}
