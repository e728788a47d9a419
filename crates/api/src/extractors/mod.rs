//! Custom request extractors.

pub mod cart_session;

pub use cart_session::{CartSession, CART_SESSION_HEADER};
