//! Domain error types.

use shared::crypto::CryptoError;
use thiserror::Error;
use uuid::Uuid;

use crate::services::provider::ProviderError;
use crate::store::StoreError;

/// Errors produced by the commerce services.
#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Provider account is not connected")]
    NotConnected,

    #[error("Provider returned {status}: {message}")]
    ProviderError { status: u16, message: String },

    #[error("Access denied")]
    AccessDenied,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Product {0} not found or not purchasable")]
    ProductNotFound(Uuid),

    #[error("Service {0} is not synced with the provider")]
    ServiceNotSynced(Uuid),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Booking failed: {0}")]
    BookingFailed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<ProviderError> for CommerceError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { status, message } => {
                CommerceError::ProviderError { status, message }
            }
            ProviderError::Timeout => CommerceError::ProviderError {
                status: 504,
                message: "provider request timed out".to_string(),
            },
            ProviderError::Transport(message) | ProviderError::Decode(message) => {
                CommerceError::ProviderError {
                    status: 502,
                    message,
                }
            }
        }
    }
}

impl From<validator::ValidationErrors> for CommerceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map(|m| format!("{}: {}", field, m))
                        .unwrap_or_else(|| format!("{}: invalid value", field))
                })
            })
            .collect();
        CommerceError::Validation(messages.join(", "))
    }
}
