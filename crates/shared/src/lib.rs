//! Shared utilities and common types for the storefront backend.
//!
//! This crate provides functionality used across all other crates:
//! - Credential encryption and OAuth state signing
//! - HMAC helpers used by webhook verification
//! - Bearer token (JWT) verification for signed-in shoppers
//! - Money conversion between decimal prices and minor currency units
//! - Common validation logic

pub mod crypto;
pub mod jwt;
pub mod money;
pub mod validation;
