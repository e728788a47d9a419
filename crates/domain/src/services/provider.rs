//! Contract with the remote commerce provider.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::remote::{
    AvailabilitySearch, CatalogPage, CreateCustomer, CreateOrder, CreatePayment,
    CreateRemoteBooking, RemoteAvailability, RemoteBooking, RemoteCustomer, RemoteOrder,
    RemotePayment, TokenRequest, TokenResponse,
};

/// Errors returned by provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider request timed out")]
    Timeout,

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Remote payments-and-scheduling API.
///
/// Every call except `request_token` is authorized with a bearer access
/// token resolved by the caller.
#[async_trait]
pub trait CommerceProvider: Send + Sync {
    async fn request_token(&self, request: TokenRequest) -> ProviderResult<TokenResponse>;

    /// Lists ITEM and IMAGE catalog objects, one page per call.
    async fn list_catalog(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> ProviderResult<CatalogPage>;

    async fn create_order(
        &self,
        access_token: &str,
        order: CreateOrder,
    ) -> ProviderResult<RemoteOrder>;

    async fn create_payment(
        &self,
        access_token: &str,
        payment: CreatePayment,
    ) -> ProviderResult<RemotePayment>;

    async fn create_customer(
        &self,
        access_token: &str,
        customer: CreateCustomer,
    ) -> ProviderResult<RemoteCustomer>;

    async fn create_booking(
        &self,
        access_token: &str,
        booking: CreateRemoteBooking,
    ) -> ProviderResult<RemoteBooking>;

    async fn search_availability(
        &self,
        access_token: &str,
        search: AvailabilitySearch,
    ) -> ProviderResult<Vec<RemoteAvailability>>;
}
