//! Domain layer for the storefront commerce core.
//!
//! This crate contains:
//! - Domain models (Cart, Product, Order, Booking, OAuth tokens, provider payloads)
//! - Store traits implemented by the persistence layer
//! - Business logic services (cart, checkout, bookings, catalog sync, OAuth, webhooks)
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::CommerceError;
