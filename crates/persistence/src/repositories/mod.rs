//! Repository implementations for database operations.
//!
//! Each repository wraps the connection pool and implements the matching
//! domain store trait.

pub mod booking;
pub mod cart;
pub mod oauth_token;
pub mod order;
pub mod product;

pub use booking::BookingRepository;
pub use cart::CartRepository;
pub use oauth_token::OAuthTokenRepository;
pub use order::OrderRepository;
pub use product::ProductRepository;
