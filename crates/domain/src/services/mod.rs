//! Domain services for the storefront commerce core.
//!
//! Services contain business logic that operates on domain models through
//! the store traits and the provider contract.

pub mod booking;
pub mod cart;
pub mod catalog_sync;
pub mod checkout;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod oauth;
pub mod provider;
pub mod webhook;

pub use booking::BookingService;
pub use cart::{CartService, DEFAULT_CART_TTL_HOURS};
pub use catalog_sync::CatalogSyncJob;
pub use checkout::CheckoutService;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{InMemoryStore, MockProvider, ProviderCall, ProviderOp};
pub use oauth::{OAuthManager, OAuthSettings};
pub use provider::{CommerceProvider, ProviderError, ProviderResult};
pub use webhook::{notification_url, UrlParts, WebhookEvent, WebhookRequest, WebhookVerifier};
