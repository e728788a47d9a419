use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::CommerceError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Rate limited; retry after {retry_after}s")]
    RateLimited { limit: u32, retry_after: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::PaymentFailed(msg) => {
                tracing::error!("Payment failed: {}", msg);
                (
                    StatusCode::PAYMENT_REQUIRED,
                    "payment_failed",
                    "Payment could not be completed".into(),
                )
            }
            ApiError::BadGateway(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "bad_gateway",
                    "The payment provider could not complete the request".into(),
                )
            }
            ApiError::RateLimited { limit, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("Rate limit of {} requests/minute exceeded", limit),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

impl From<CommerceError> for ApiError {
    fn from(err: CommerceError) -> Self {
        match err {
            CommerceError::Validation(msg) => ApiError::Validation(msg),
            CommerceError::EmptyCart => ApiError::Validation("Cart is empty".into()),
            CommerceError::InvalidState => {
                ApiError::Validation("Authorization request is invalid or has expired".into())
            }
            CommerceError::InvalidSignature => ApiError::Unauthorized("Invalid signature".into()),
            CommerceError::AccessDenied => ApiError::Forbidden("Access denied".into()),
            CommerceError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            err @ (CommerceError::ProductNotFound(_) | CommerceError::ServiceNotSynced(_)) => {
                ApiError::NotFound(err.to_string())
            }
            CommerceError::NotConnected => {
                ApiError::Conflict("Square account is not connected".into())
            }
            CommerceError::NotConfigured(msg) => {
                tracing::warn!(reason = %msg, "Square integration not configured");
                ApiError::ServiceUnavailable("Square integration is not configured".into())
            }
            CommerceError::PaymentFailed(msg) => ApiError::PaymentFailed(msg),
            CommerceError::BookingFailed(msg) => ApiError::BadGateway(msg),
            CommerceError::ProviderError { status, message } => {
                ApiError::BadGateway(format!("provider returned {}: {}", status, message))
            }
            err @ (CommerceError::Store(_) | CommerceError::Crypto(_)) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    e.message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .collect();

        let message = if messages.len() == 1 {
            messages[0].clone()
        } else {
            format!("{} validation errors", messages.len())
        };

        ApiError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::store::StoreError;
    use uuid::Uuid;

    fn status_of(err: CommerceError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_commerce_error_status_mapping() {
        assert_eq!(
            status_of(CommerceError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(CommerceError::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CommerceError::InvalidState), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(CommerceError::InvalidSignature),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(CommerceError::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(CommerceError::ProductNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CommerceError::ServiceNotSynced(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(CommerceError::NotConnected), StatusCode::CONFLICT);
        assert_eq!(
            status_of(CommerceError::NotConfigured("off".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(CommerceError::PaymentFailed("declined".into())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(CommerceError::BookingFailed("slot taken".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(CommerceError::ProviderError {
                status: 500,
                message: "boom".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(CommerceError::Store(StoreError::Database("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_payment_failure_message_is_generic() {
        let err: ApiError = CommerceError::PaymentFailed("card declined: CVV_FAILURE".into()).into();
        match &err {
            ApiError::PaymentFailed(detail) => assert!(detail.contains("CVV_FAILURE")),
            other => panic!("unexpected {:?}", other),
        }
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_rate_limited() {
        let response = ApiError::RateLimited {
            limit: 30,
            retry_after: 2,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            format!("{}", ApiError::Unauthorized("test".to_string())),
            "Unauthorized: test"
        );
        assert_eq!(
            format!("{}", ApiError::BadGateway("test".to_string())),
            "Bad gateway: test"
        );
        assert_eq!(
            format!(
                "{}",
                ApiError::RateLimited {
                    limit: 30,
                    retry_after: 5
                }
            ),
            "Rate limited; retry after 5s"
        );
    }
}
