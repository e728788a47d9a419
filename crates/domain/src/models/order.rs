//! Order domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A completed checkout, mirrored from the provider order and payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub remote_order_id: String,
    pub remote_payment_id: String,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// One order line, denormalized from the cart line and product at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub remote_order_id: String,
    pub remote_payment_id: String,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Request payload for checking out the current cart.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutRequest {
    /// Payment source token produced by the provider's web payments SDK.
    #[validate(length(min = 1, max = 512, message = "Payment source is required"))]
    pub source_id: String,

    /// Buyer verification token (SCA), when the SDK produced one.
    #[validate(length(max = 512, message = "Verification token is too long"))]
    pub verification_token: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    /// Cart the client believes it is paying for.
    pub cart_id: Option<Uuid>,

    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
}

/// Response payload for a successful checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    pub remote_order_id: String,
    pub remote_payment_id: String,
    pub total: Decimal,
    pub currency: String,
    pub status: String,
}

impl From<&Order> for CheckoutReceipt {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            remote_order_id: order.remote_order_id.clone(),
            remote_payment_id: order.remote_payment_id.clone(),
            total: order.total,
            currency: order.currency.clone(),
            status: order.status.clone(),
        }
    }
}
