//! Cart domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A shopping cart owned by a guest session, a signed-in user, or both after
/// a merge on login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Cart {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Fields needed to create a cart.
#[derive(Debug, Clone)]
pub struct NewCart {
    pub session_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

/// A stored cart line. `unit_price` is the product price captured when the
/// line was last added to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A cart line joined with the display fields of its product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub name: String,
    pub image_url: Option<String>,
    pub line_total: Decimal,
}

impl CartLine {
    pub fn new(item: CartItem, name: String, image_url: Option<String>) -> Self {
        let line_total = item.line_total();
        Self {
            item,
            name,
            image_url,
            line_total,
        }
    }
}

/// Who is asking for a cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartOwner {
    pub session_id: Option<String>,
    pub user_id: Option<Uuid>,
}

impl CartOwner {
    pub fn guest(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            user_id: None,
        }
    }

    pub fn user(user_id: Uuid) -> Self {
        Self {
            session_id: None,
            user_id: Some(user_id),
        }
    }
}

/// Cart as returned to clients; totals are derived from the current lines.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart_id: Uuid,
    pub session_id: Option<String>,
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
    pub item_count: i64,
    pub expires_at: DateTime<Utc>,
}

impl CartView {
    pub fn new(cart: &Cart, items: Vec<CartLine>) -> Self {
        let subtotal = items.iter().map(|line| line.item.line_total()).sum();
        let item_count = items.iter().map(|line| i64::from(line.item.quantity)).sum();
        Self {
            cart_id: cart.id,
            session_id: cart.session_id.clone(),
            items,
            subtotal,
            item_count,
            expires_at: cart.expires_at,
        }
    }
}

/// Request payload for adding a product to the cart.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,

    #[validate(range(min = 1, max = 999, message = "Quantity must be between 1 and 999"))]
    pub quantity: i32,
}

/// Request payload for changing a line's quantity. Zero or less removes it.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(max = 999, message = "Quantity must be at most 999"))]
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(quantity: i32, price: Decimal) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity,
            unit_price: price,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_view_totals() {
        let now = Utc::now();
        let cart = Cart {
            id: Uuid::new_v4(),
            session_id: Some("abc".to_string()),
            user_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(7),
        };
        let lines = vec![
            CartLine::new(item(2, Decimal::new(1000, 2)), "Mug".into(), None),
            CartLine::new(item(3, Decimal::new(250, 2)), "Card".into(), None),
        ];

        let view = CartView::new(&cart, lines);
        assert_eq!(view.subtotal, Decimal::new(2750, 2));
        assert_eq!(view.item_count, 5);
        assert_eq!(view.items[0].line_total, Decimal::new(2000, 2));
    }

    #[test]
    fn test_is_expired_at() {
        let now = Utc::now();
        let cart = Cart {
            id: Uuid::new_v4(),
            session_id: None,
            user_id: Some(Uuid::new_v4()),
            created_at: now,
            updated_at: now,
            expires_at: now,
        };
        assert!(cart.is_expired_at(now));
        assert!(!cart.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_add_item_request_validation() {
        let ok = AddCartItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 2,
        };
        assert!(ok.validate().is_ok());

        let zero = AddCartItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(zero.validate().is_err());
    }
}
