//! Checkout payment orchestration.
//!
//! A checkout creates a provider order from the cart lines, pays for it,
//! then records the order locally and empties the cart. Provider calls are
//! not rolled back: a failed payment leaves an open remote order behind,
//! which is logged with its id. Each attempt uses fresh idempotency keys.

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::money::{from_minor_units, to_minor_units};
use uuid::Uuid;
use validator::Validate;

use crate::error::CommerceError;
use crate::models::remote::{CreateOrder, CreatePayment, Money, RemoteLineItem};
use crate::models::{CartOwner, CheckoutReceipt, CheckoutRequest, NewOrder, NewOrderItem, Product};
use crate::services::cart::CartService;
use crate::services::oauth::OAuthManager;
use crate::services::provider::CommerceProvider;
use crate::store::{OrderStore, ProductStore};

pub struct CheckoutService {
    carts: Arc<CartService>,
    products: Arc<dyn ProductStore>,
    orders: Arc<dyn OrderStore>,
    provider: Arc<dyn CommerceProvider>,
    oauth: Arc<OAuthManager>,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        carts: Arc<CartService>,
        products: Arc<dyn ProductStore>,
        orders: Arc<dyn OrderStore>,
        provider: Arc<dyn CommerceProvider>,
        oauth: Arc<OAuthManager>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            carts,
            products,
            orders,
            provider,
            oauth,
            currency: currency.into(),
        }
    }

    fn money(&self, amount: Decimal) -> Result<Money, CommerceError> {
        let amount = to_minor_units(amount)
            .ok_or_else(|| CommerceError::Validation("Amount out of range".to_string()))?;
        Ok(Money {
            amount,
            currency: self.currency.clone(),
        })
    }

    pub async fn checkout(
        &self,
        owner: &CartOwner,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, CommerceError> {
        request.validate()?;
        if request.source_id.trim().is_empty() {
            return Err(CommerceError::Validation(
                "Payment source is required".to_string(),
            ));
        }

        let cart = self
            .carts
            .find_owned(owner)
            .await?
            .ok_or(CommerceError::EmptyCart)?;
        if request.cart_id.is_some_and(|id| id != cart.id) {
            tracing::warn!(cart_id = %cart.id, "Checkout cart id does not match owner");
            return Err(CommerceError::AccessDenied);
        }

        let lines = self.carts.lines(cart.id).await?;
        if lines.is_empty() {
            return Err(CommerceError::EmptyCart);
        }

        let mut priced: Vec<(Product, i32, Decimal)> = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = self
                .products
                .find_product(line.item.product_id)
                .await?
                .ok_or(CommerceError::ProductNotFound(line.item.product_id))?;
            priced.push((product, line.item.quantity, line.item.unit_price));
        }

        // The charge is the sum of the order's line prices in minor units,
        // so it always equals the remote order total.
        let mut line_items = Vec::with_capacity(priced.len());
        let mut amount_minor: i64 = 0;
        for (product, quantity, unit_price) in &priced {
            let base_price_money = self.money(*unit_price)?;
            amount_minor = base_price_money
                .amount
                .checked_mul(i64::from(*quantity))
                .and_then(|line| amount_minor.checked_add(line))
                .ok_or_else(|| CommerceError::Validation("Amount out of range".to_string()))?;
            line_items.push(RemoteLineItem {
                name: product.name.clone(),
                quantity: quantity.to_string(),
                base_price_money,
                catalog_object_id: product.remote_variation_id.clone(),
            });
        }
        let subtotal = from_minor_units(amount_minor);
        let total = subtotal;
        let amount_money = Money {
            amount: amount_minor,
            currency: self.currency.clone(),
        };

        let access_token = self.oauth.resolve_access_token().await?;
        let location_id = self.oauth.resolve_location_id().await?;

        let remote_order = self
            .provider
            .create_order(
                &access_token,
                CreateOrder {
                    idempotency_key: Uuid::new_v4().to_string(),
                    location_id: location_id.clone(),
                    line_items,
                },
            )
            .await
            .map_err(|e| {
                tracing::error!(cart_id = %cart.id, error = %e, "Provider order creation failed");
                CommerceError::PaymentFailed(e.to_string())
            })?;

        let payment = self
            .provider
            .create_payment(
                &access_token,
                CreatePayment {
                    idempotency_key: Uuid::new_v4().to_string(),
                    source_id: request.source_id.clone(),
                    amount_money,
                    order_id: remote_order.id.clone(),
                    location_id,
                    verification_token: request
                        .verification_token
                        .clone()
                        .filter(|t| !t.is_empty()),
                    buyer_email_address: request.email.clone(),
                },
            )
            .await
            .map_err(|e| {
                tracing::warn!(
                    remote_order_id = %remote_order.id,
                    error = %e,
                    "Payment failed; remote order left open"
                );
                CommerceError::PaymentFailed(e.to_string())
            })?;

        if !payment.is_successful() {
            tracing::warn!(
                remote_order_id = %remote_order.id,
                remote_payment_id = %payment.id,
                status = %payment.status,
                "Payment not completed; remote order left open"
            );
            return Err(CommerceError::PaymentFailed(format!(
                "payment status {}",
                payment.status
            )));
        }

        let status = if payment.status == "APPROVED" {
            "authorized"
        } else {
            "paid"
        };
        let items = priced
            .into_iter()
            .map(|(product, quantity, unit_price)| NewOrderItem {
                product_id: product.id,
                name: product.name,
                sku: product.sku,
                unit_price,
                quantity,
            })
            .collect();
        let order = self
            .orders
            .create_order(
                NewOrder {
                    remote_order_id: remote_order.id.clone(),
                    remote_payment_id: payment.id.clone(),
                    email: request.email,
                    user_id: owner.user_id,
                    session_id: cart.session_id.clone(),
                    subtotal,
                    total,
                    currency: self.currency.clone(),
                    shipping_address: request.shipping_address,
                    billing_address: request.billing_address,
                    status: status.to_string(),
                },
                items,
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    remote_order_id = %remote_order.id,
                    remote_payment_id = %payment.id,
                    error = %e,
                    "Payment captured but order could not be recorded"
                );
                CommerceError::from(e)
            })?;

        if let Err(e) = self.carts.empty(cart.id).await {
            tracing::warn!(cart_id = %cart.id, error = %e, "Failed to clear cart after checkout");
        }

        tracing::info!(
            order_id = %order.id,
            remote_order_id = %order.remote_order_id,
            total = %order.total,
            "Checkout completed"
        );

        Ok(CheckoutReceipt::from(&order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{InMemoryStore, MockProvider, ProviderCall, ProviderOp};
    use crate::services::oauth::OAuthSettings;
    use chrono::Duration;
    use shared::crypto::CredentialVault;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    struct Fixture {
        store: Arc<InMemoryStore>,
        provider: Arc<MockProvider>,
        carts: Arc<CartService>,
        checkout: CheckoutService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(MockProvider::new());
        let vault = Arc::new(CredentialVault::from_hex(KEY_HEX).unwrap());
        let oauth = Arc::new(OAuthManager::new(
            OAuthSettings {
                enabled: true,
                provider_key: "square".to_string(),
                static_access_token: Some("EAAA-static".to_string()),
                location_id: Some("LOC-1".to_string()),
                environment: "sandbox".to_string(),
                ..Default::default()
            },
            vault,
            store.clone(),
            provider.clone(),
        ));
        let carts = Arc::new(CartService::new(
            store.clone(),
            store.clone(),
            Duration::days(7),
        ));
        let checkout = CheckoutService::new(
            carts.clone(),
            store.clone(),
            store.clone(),
            provider.clone(),
            oauth,
            "USD",
        );
        Fixture {
            store,
            provider,
            carts,
            checkout,
        }
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            source_id: "cnon:card-nonce-ok".to_string(),
            verification_token: None,
            email: Some("buyer@example.com".to_string()),
            cart_id: None,
            shipping_address: None,
            billing_address: None,
        }
    }

    #[tokio::test]
    async fn test_checkout_charges_snapshot_price() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 2).await.unwrap();
        f.store.set_product_price(mug.id, Decimal::new(1500, 2));

        let receipt = f.checkout.checkout(&owner, request()).await.unwrap();
        assert_eq!(receipt.total, Decimal::new(2000, 2));
        assert_eq!(receipt.status, "paid");

        let payment = f
            .provider
            .calls()
            .into_iter()
            .find_map(|c| match c {
                ProviderCall::CreatePayment(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(payment.amount_money.amount, 2000);
        assert_eq!(payment.amount_money.currency, "USD");
        assert_eq!(payment.order_id, receipt.remote_order_id);
        assert_eq!(payment.buyer_email_address.as_deref(), Some("buyer@example.com"));
    }

    #[tokio::test]
    async fn test_checkout_builds_order_lines() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 3).await.unwrap();

        f.checkout.checkout(&owner, request()).await.unwrap();

        let order = f
            .provider
            .calls()
            .into_iter()
            .find_map(|c| match c {
                ProviderCall::CreateOrder(o) => Some(o),
                _ => None,
            })
            .unwrap();
        assert_eq!(order.location_id, "LOC-1");
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(order.line_items[0].quantity, "3");
        assert_eq!(order.line_items[0].base_price_money.amount, 1000);
        assert_eq!(
            order.line_items[0].catalog_object_id.as_deref(),
            Some("VAR-MUG-1")
        );
    }

    #[tokio::test]
    async fn test_charge_matches_order_lines_for_sub_cent_prices() {
        let f = fixture();
        let tea = f.store.add_product("Tea", "TEA-1", Decimal::new(10005, 3));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, tea.id, 3).await.unwrap();

        let receipt = f.checkout.checkout(&owner, request()).await.unwrap();

        let calls = f.provider.calls();
        let order = calls
            .iter()
            .find_map(|c| match c {
                ProviderCall::CreateOrder(o) => Some(o),
                _ => None,
            })
            .unwrap();
        let payment = calls
            .iter()
            .find_map(|c| match c {
                ProviderCall::CreatePayment(p) => Some(p),
                _ => None,
            })
            .unwrap();

        let line = &order.line_items[0];
        assert_eq!(line.base_price_money.amount, 1001);
        assert_eq!(payment.amount_money.amount, 3003);
        assert_eq!(receipt.total, Decimal::new(3003, 2));
    }

    #[tokio::test]
    async fn test_checkout_persists_order_and_clears_cart() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 1).await.unwrap();

        f.checkout.checkout(&owner, request()).await.unwrap();

        let orders = f.store.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].1.len(), 1);
        assert_eq!(orders[0].1[0].sku.as_deref(), Some("MUG-1"));
        assert_eq!(f.carts.view(&owner).await.unwrap().item_count, 0);
    }

    #[tokio::test]
    async fn test_idempotency_keys_are_fresh() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 1).await.unwrap();
        f.provider.fail(ProviderOp::CreatePayment);

        let _ = f.checkout.checkout(&owner, request()).await;
        let _ = f.checkout.checkout(&owner, request()).await;

        let keys: Vec<String> = f
            .provider
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::CreateOrder(o) => Some(o.idempotency_key),
                ProviderCall::CreatePayment(p) => Some(p.idempotency_key),
                _ => None,
            })
            .collect();
        assert_eq!(keys.len(), 4);
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let f = fixture();
        let owner = CartOwner::user(Uuid::new_v4());
        assert!(matches!(
            f.checkout.checkout(&owner, request()).await,
            Err(CommerceError::EmptyCart)
        ));

        f.carts.view(&owner).await.unwrap();
        assert!(matches!(
            f.checkout.checkout(&owner, request()).await,
            Err(CommerceError::EmptyCart)
        ));
        assert!(f.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_rejected() {
        let f = fixture();
        let mut req = request();
        req.source_id = String::new();
        assert!(matches!(
            f.checkout.checkout(&CartOwner::default(), req).await,
            Err(CommerceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_cart_id_denied() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 1).await.unwrap();

        let mut req = request();
        req.cart_id = Some(Uuid::new_v4());
        assert!(matches!(
            f.checkout.checkout(&owner, req).await,
            Err(CommerceError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn test_payment_failure_keeps_cart() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 2).await.unwrap();
        f.provider.time_out(ProviderOp::CreatePayment);

        assert!(matches!(
            f.checkout.checkout(&owner, request()).await,
            Err(CommerceError::PaymentFailed(_))
        ));
        assert_eq!(f.provider.call_count(ProviderOp::CreateOrder), 1);
        assert!(f.store.orders().is_empty());
        assert_eq!(f.carts.view(&owner).await.unwrap().item_count, 2);
    }

    #[tokio::test]
    async fn test_order_failure_is_payment_failure() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 1).await.unwrap();
        f.provider.fail(ProviderOp::CreateOrder);

        assert!(matches!(
            f.checkout.checkout(&owner, request()).await,
            Err(CommerceError::PaymentFailed(_))
        ));
        assert_eq!(f.provider.call_count(ProviderOp::CreatePayment), 0);
    }

    #[tokio::test]
    async fn test_pending_payment_is_failure() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 1).await.unwrap();
        f.provider.set_payment_status("PENDING");

        assert!(matches!(
            f.checkout.checkout(&owner, request()).await,
            Err(CommerceError::PaymentFailed(_))
        ));
        assert!(f.store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_approved_payment_is_authorized() {
        let f = fixture();
        let mug = f.store.add_product("Mug", "MUG-1", Decimal::new(1000, 2));
        let owner = CartOwner::user(Uuid::new_v4());
        f.carts.add_item(&owner, mug.id, 1).await.unwrap();
        f.provider.set_payment_status("APPROVED");

        let receipt = f.checkout.checkout(&owner, request()).await.unwrap();
        assert_eq!(receipt.status, "authorized");
    }
}
