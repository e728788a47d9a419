//! HTTP route handlers.

pub mod admin;
pub mod bookings;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod oauth;
pub mod webhooks;
