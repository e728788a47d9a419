//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod booking;
pub mod cart;
pub mod oauth_token;
pub mod order;
pub mod product;

pub use booking::{BookingEntity, ServiceEntity};
pub use cart::{CartEntity, CartItemEntity, CartLineEntity};
pub use oauth_token::OAuthTokenEntity;
pub use order::{OrderEntity, OrderItemEntity};
pub use product::ProductEntity;
