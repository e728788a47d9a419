//! Cart session management.
//!
//! Carts are resolved per request from the signed-in user or the guest
//! session id, created lazily, and expire a fixed time after their last
//! mutation. An expired cart is purged when a lookup finds it, so the caller
//! receives a fresh empty cart.

use std::sync::Arc;

use chrono::{Duration, Utc};
use shared::crypto::random_hex;
use uuid::Uuid;

use crate::error::CommerceError;
use crate::models::{Cart, CartLine, CartOwner, CartView, NewCart};
use crate::store::{CartStore, ProductStore, StoreError};

/// Default cart lifetime after the last mutation.
pub const DEFAULT_CART_TTL_HOURS: i64 = 24 * 7;

/// Length in bytes of generated guest session ids.
const SESSION_ID_BYTES: usize = 16;

pub struct CartService {
    carts: Arc<dyn CartStore>,
    products: Arc<dyn ProductStore>,
    ttl: Duration,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartStore>, products: Arc<dyn ProductStore>, ttl: Duration) -> Self {
        Self {
            carts,
            products,
            ttl,
        }
    }

    /// Returns the owner's live cart, creating one if none exists.
    pub async fn resolve(&self, owner: &CartOwner) -> Result<Cart, CommerceError> {
        if let Some(cart) = self.find_owned(owner).await? {
            return Ok(cart);
        }

        let session_id = if owner.user_id.is_some() {
            None
        } else {
            Some(random_hex(SESSION_ID_BYTES))
        };
        let created = self
            .carts
            .create_cart(NewCart {
                session_id,
                user_id: owner.user_id,
                expires_at: Utc::now() + self.ttl,
            })
            .await;

        match created {
            Ok(cart) => {
                tracing::debug!(cart_id = %cart.id, user_id = ?owner.user_id, "Created cart");
                Ok(cart)
            }
            // A concurrent request created the user's cart first
            Err(StoreError::Conflict(reason)) if owner.user_id.is_some() => {
                tracing::debug!(user_id = ?owner.user_id, "User cart created concurrently");
                self.find_owned(owner)
                    .await?
                    .ok_or(CommerceError::Store(StoreError::Conflict(reason)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the owner's live cart without creating one.
    pub async fn find_owned(&self, owner: &CartOwner) -> Result<Option<Cart>, CommerceError> {
        if let Some(user_id) = owner.user_id {
            if let Some(cart) = self.carts.find_cart_by_user(user_id).await? {
                if let Some(live) = self.live(cart).await? {
                    return Ok(Some(live));
                }
            }
        }

        if let Some(session_id) = owner.session_id.as_deref().filter(|s| !s.is_empty()) {
            if let Some(cart) = self.carts.find_cart_by_session(session_id).await? {
                // A session cart adopted by another account is not reachable
                // through the session id alone.
                if cart.user_id.is_none() || cart.user_id == owner.user_id {
                    return self.live(cart).await;
                }
            }
        }

        Ok(None)
    }

    /// Purges `cart` when it has expired.
    async fn live(&self, cart: Cart) -> Result<Option<Cart>, CommerceError> {
        if !cart.is_expired_at(Utc::now()) {
            return Ok(Some(cart));
        }
        self.carts.clear_items(cart.id).await?;
        self.carts.delete_cart(cart.id).await?;
        tracing::debug!(cart_id = %cart.id, "Purged expired cart");
        Ok(None)
    }

    async fn touch(&self, cart: &mut Cart) -> Result<(), CommerceError> {
        let expires_at = Utc::now() + self.ttl;
        self.carts.touch_cart(cart.id, expires_at).await?;
        cart.expires_at = expires_at;
        Ok(())
    }

    async fn view_of(&self, cart: &Cart) -> Result<CartView, CommerceError> {
        let items = self.carts.list_items(cart.id).await?;
        Ok(CartView::new(cart, items))
    }

    pub async fn view(&self, owner: &CartOwner) -> Result<CartView, CommerceError> {
        let cart = self.resolve(owner).await?;
        self.view_of(&cart).await
    }

    /// Adds `quantity` of a product, merging into an existing line.
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, CommerceError> {
        if quantity <= 0 {
            return Err(CommerceError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        let product = self
            .products
            .find_product(product_id)
            .await?
            .filter(|p| p.is_purchasable())
            .ok_or(CommerceError::ProductNotFound(product_id))?;

        let mut cart = self.resolve(owner).await?;
        let item = self
            .carts
            .upsert_item(cart.id, product.id, quantity, product.price)
            .await?;
        self.touch(&mut cart).await?;

        tracing::debug!(
            cart_id = %cart.id,
            product_id = %product.id,
            quantity = item.quantity,
            "Added item to cart"
        );
        self.view_of(&cart).await
    }

    /// Sets a line's quantity; zero or less removes the line.
    pub async fn update_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, CommerceError> {
        let mut cart = self.owned_cart_for_item(owner, item_id).await?;
        if quantity <= 0 {
            self.carts.delete_item(item_id).await?;
        } else {
            self.carts.set_item_quantity(item_id, quantity).await?;
        }
        self.touch(&mut cart).await?;
        self.view_of(&cart).await
    }

    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<CartView, CommerceError> {
        let mut cart = self.owned_cart_for_item(owner, item_id).await?;
        self.carts.delete_item(item_id).await?;
        self.touch(&mut cart).await?;
        self.view_of(&cart).await
    }

    pub async fn clear(&self, owner: &CartOwner) -> Result<CartView, CommerceError> {
        let mut cart = self.resolve(owner).await?;
        self.carts.clear_items(cart.id).await?;
        self.touch(&mut cart).await?;
        self.view_of(&cart).await
    }

    /// Returns the owner's cart if it holds `item_id`.
    async fn owned_cart_for_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<Cart, CommerceError> {
        let item = self
            .carts
            .find_item(item_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("Cart item".to_string()))?;
        match self.find_owned(owner).await? {
            Some(cart) if cart.id == item.cart_id => Ok(cart),
            _ => {
                tracing::warn!(item_id = %item_id, "Cart item access denied");
                Err(CommerceError::AccessDenied)
            }
        }
    }

    /// Folds a guest session cart into the user's cart after sign-in.
    ///
    /// Without a user cart the guest cart is adopted; otherwise guest lines
    /// are merged by product and the guest cart is deleted.
    pub async fn merge_on_login(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<CartView, CommerceError> {
        let user_owner = CartOwner::user(user_id);
        let guest = match self.carts.find_cart_by_session(session_id).await? {
            Some(cart) if cart.user_id.is_none() => self.live(cart).await?,
            _ => None,
        };
        let Some(mut guest) = guest else {
            return self.view(&user_owner).await;
        };

        let user_cart = match self.carts.find_cart_by_user(user_id).await? {
            Some(cart) => self.live(cart).await?,
            None => None,
        };

        let mut user_cart = match user_cart {
            Some(cart) => cart,
            None => match self.carts.attach_user(guest.id, user_id).await {
                Ok(()) => {
                    guest.user_id = Some(user_id);
                    self.touch(&mut guest).await?;
                    tracing::info!(cart_id = %guest.id, user_id = %user_id, "Adopted guest cart");
                    return self.view_of(&guest).await;
                }
                // The user's cart appeared since the lookup; merge into it
                Err(StoreError::Conflict(reason)) => self
                    .carts
                    .find_cart_by_user(user_id)
                    .await?
                    .ok_or(CommerceError::Store(StoreError::Conflict(reason)))?,
                Err(e) => return Err(e.into()),
            },
        };

        let lines: Vec<CartLine> = self.carts.list_items(guest.id).await?;
        for line in &lines {
            self.carts
                .upsert_item(
                    user_cart.id,
                    line.item.product_id,
                    line.item.quantity,
                    line.item.unit_price,
                )
                .await?;
        }
        self.carts.clear_items(guest.id).await?;
        self.carts.delete_cart(guest.id).await?;
        self.touch(&mut user_cart).await?;

        tracing::info!(
            cart_id = %user_cart.id,
            guest_cart_id = %guest.id,
            merged_lines = lines.len(),
            "Merged guest cart into user cart"
        );
        self.view_of(&user_cart).await
    }

    /// Lines of a cart, for checkout.
    pub async fn lines(&self, cart_id: Uuid) -> Result<Vec<CartLine>, CommerceError> {
        Ok(self.carts.list_items(cart_id).await?)
    }

    /// Empties a cart by id, for checkout.
    pub async fn empty(&self, cart_id: Uuid) -> Result<(), CommerceError> {
        Ok(self.carts.clear_items(cart_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CartItem;
    use crate::services::memory::InMemoryStore;
    use crate::store::StoreResult;
    use async_trait::async_trait;
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service(store: &Arc<InMemoryStore>) -> CartService {
        CartService::new(
            store.clone(),
            store.clone(),
            Duration::hours(DEFAULT_CART_TTL_HOURS),
        )
    }

    fn price(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    #[tokio::test]
    async fn test_guest_cart_gets_fresh_session() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);

        let view = carts.view(&CartOwner::guest("unknown-session")).await.unwrap();
        let session = view.session_id.unwrap();
        assert_eq!(session.len(), 32);
        assert_ne!(session, "unknown-session");
        assert_eq!(view.item_count, 0);
    }

    #[tokio::test]
    async fn test_add_same_product_twice_merges_line() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));

        let first = carts.view(&CartOwner::default()).await.unwrap();
        let owner = CartOwner::guest(first.session_id.unwrap());
        carts.add_item(&owner, mug.id, 2).await.unwrap();
        let view = carts.add_item(&owner, mug.id, 3).await.unwrap();

        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].item.quantity, 5);
        assert_eq!(view.item_count, 5);
        assert_eq!(view.subtotal, price(5000));
    }

    #[tokio::test]
    async fn test_subtotal_across_lines() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let card = store.add_product("Card", "CARD-1", price(350));

        let owner = CartOwner::user(Uuid::new_v4());
        carts.add_item(&owner, mug.id, 2).await.unwrap();
        let view = carts.add_item(&owner, card.id, 3).await.unwrap();

        assert_eq!(view.subtotal, price(3050));
        assert_eq!(view.item_count, 5);
    }

    #[tokio::test]
    async fn test_add_rejects_hidden_or_unsynced_product() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mut hidden = store.add_product("Hidden", "H-1", price(100));
        hidden.visible = false;
        store.insert_product(hidden.clone());
        let mut unsynced = store.add_product("Local", "L-1", price(100));
        unsynced.remote_catalog_id = None;
        store.insert_product(unsynced.clone());

        let owner = CartOwner::user(Uuid::new_v4());
        for id in [hidden.id, unsynced.id, Uuid::new_v4()] {
            assert!(matches!(
                carts.add_item(&owner, id, 1).await,
                Err(CommerceError::ProductNotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_add_rejects_non_positive_quantity() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));

        assert!(matches!(
            carts.add_item(&CartOwner::default(), mug.id, 0).await,
            Err(CommerceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_cart_is_replaced() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let user = Uuid::new_v4();
        let owner = CartOwner::user(user);

        let original = carts.add_item(&owner, mug.id, 1).await.unwrap();
        let mut expired = store.carts()[0].clone();
        expired.expires_at = Utc::now() - Duration::minutes(1);
        store.insert_cart(expired);

        let view = carts.view(&owner).await.unwrap();
        assert_ne!(view.cart_id, original.cart_id);
        assert!(view.items.is_empty());
        assert!(store.cart_items().is_empty());
        assert_eq!(store.carts().len(), 1);
    }

    #[tokio::test]
    async fn test_mutation_slides_expiry() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let owner = CartOwner::user(Uuid::new_v4());

        carts.view(&owner).await.unwrap();
        let mut cart = store.carts()[0].clone();
        cart.expires_at = Utc::now() + Duration::minutes(5);
        store.insert_cart(cart);

        let view = carts.add_item(&owner, mug.id, 1).await.unwrap();
        assert!(view.expires_at > Utc::now() + Duration::days(6));
    }

    #[tokio::test]
    async fn test_update_and_remove_require_ownership() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));

        let alice = CartOwner::user(Uuid::new_v4());
        let bob = CartOwner::user(Uuid::new_v4());
        let view = carts.add_item(&alice, mug.id, 1).await.unwrap();
        let item_id = view.items[0].item.id;

        assert!(matches!(
            carts.update_item(&bob, item_id, 4).await,
            Err(CommerceError::AccessDenied)
        ));
        assert!(matches!(
            carts.remove_item(&bob, item_id).await,
            Err(CommerceError::AccessDenied)
        ));

        let updated = carts.update_item(&alice, item_id, 4).await.unwrap();
        assert_eq!(updated.item_count, 4);
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let owner = CartOwner::user(Uuid::new_v4());
        let view = carts.add_item(&owner, mug.id, 2).await.unwrap();

        let view = carts
            .update_item(&owner, view.items[0].item.id, 0)
            .await
            .unwrap();
        assert!(view.items.is_empty());
        assert_eq!(view.subtotal, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_item_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        assert!(matches!(
            carts.remove_item(&CartOwner::default(), Uuid::new_v4()).await,
            Err(CommerceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_empties_cart() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let owner = CartOwner::user(Uuid::new_v4());
        carts.add_item(&owner, mug.id, 2).await.unwrap();

        let view = carts.clear(&owner).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(view.item_count, 0);
    }

    #[tokio::test]
    async fn test_line_keeps_price_snapshot() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let owner = CartOwner::user(Uuid::new_v4());
        carts.add_item(&owner, mug.id, 2).await.unwrap();

        store.set_product_price(mug.id, price(1500));
        let view = carts.view(&owner).await.unwrap();
        assert_eq!(view.subtotal, price(2000));
    }

    #[tokio::test]
    async fn test_merge_adopts_guest_cart() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));

        let guest_view = carts.add_item(&CartOwner::default(), mug.id, 2).await.unwrap();
        let session = guest_view.session_id.clone().unwrap();
        let user = Uuid::new_v4();

        let merged = carts.merge_on_login(&session, user).await.unwrap();
        assert_eq!(merged.cart_id, guest_view.cart_id);
        assert_eq!(merged.item_count, 2);

        let user_view = carts.view(&CartOwner::user(user)).await.unwrap();
        assert_eq!(user_view.cart_id, guest_view.cart_id);
    }

    #[tokio::test]
    async fn test_merge_folds_guest_lines_into_user_cart() {
        let store = Arc::new(InMemoryStore::new());
        let carts = service(&store);
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let card = store.add_product("Card", "CARD-1", price(300));
        let user = Uuid::new_v4();

        let user_view = carts.add_item(&CartOwner::user(user), mug.id, 1).await.unwrap();
        let guest_view = carts.add_item(&CartOwner::default(), mug.id, 2).await.unwrap();
        let guest = CartOwner::guest(guest_view.session_id.clone().unwrap());
        carts.add_item(&guest, card.id, 1).await.unwrap();

        let merged = carts
            .merge_on_login(guest.session_id.as_deref().unwrap(), user)
            .await
            .unwrap();

        assert_eq!(merged.cart_id, user_view.cart_id);
        assert_eq!(merged.items.len(), 2);
        assert_eq!(merged.item_count, 4);
        assert_eq!(store.carts().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_adds_converge() {
        let store = Arc::new(InMemoryStore::new());
        let carts = Arc::new(service(&store));
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let owner = CartOwner::user(Uuid::new_v4());
        carts.view(&owner).await.unwrap();
        let product_id = mug.id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let carts = carts.clone();
            let owner = owner.clone();
            handles.push(tokio::spawn(async move {
                carts.add_item(&owner, product_id, 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let view = carts.view(&owner).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.item_count, 8);
    }

    /// Cart store whose first user lookup misses, as when another request
    /// creates the user's cart between lookup and insert.
    struct LateUserCart {
        inner: Arc<InMemoryStore>,
        missed: AtomicBool,
    }

    #[async_trait]
    impl CartStore for LateUserCart {
        async fn find_cart_by_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
            if !self.missed.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_cart_by_user(user_id).await
        }
        async fn find_cart_by_session(&self, session_id: &str) -> StoreResult<Option<Cart>> {
            self.inner.find_cart_by_session(session_id).await
        }
        async fn create_cart(&self, cart: NewCart) -> StoreResult<Cart> {
            self.inner.create_cart(cart).await
        }
        async fn touch_cart(&self, cart_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
            self.inner.touch_cart(cart_id, expires_at).await
        }
        async fn attach_user(&self, cart_id: Uuid, user_id: Uuid) -> StoreResult<()> {
            self.inner.attach_user(cart_id, user_id).await
        }
        async fn delete_cart(&self, cart_id: Uuid) -> StoreResult<()> {
            self.inner.delete_cart(cart_id).await
        }
        async fn list_items(&self, cart_id: Uuid) -> StoreResult<Vec<CartLine>> {
            self.inner.list_items(cart_id).await
        }
        async fn find_item(&self, item_id: Uuid) -> StoreResult<Option<CartItem>> {
            self.inner.find_item(item_id).await
        }
        async fn upsert_item(
            &self,
            cart_id: Uuid,
            product_id: Uuid,
            quantity: i32,
            unit_price: Decimal,
        ) -> StoreResult<CartItem> {
            self.inner
                .upsert_item(cart_id, product_id, quantity, unit_price)
                .await
        }
        async fn set_item_quantity(&self, item_id: Uuid, quantity: i32) -> StoreResult<()> {
            self.inner.set_item_quantity(item_id, quantity).await
        }
        async fn delete_item(&self, item_id: Uuid) -> StoreResult<()> {
            self.inner.delete_item(item_id).await
        }
        async fn clear_items(&self, cart_id: Uuid) -> StoreResult<()> {
            self.inner.clear_items(cart_id).await
        }
    }

    #[tokio::test]
    async fn test_user_cart_created_concurrently_is_reused() {
        let store = Arc::new(InMemoryStore::new());
        let mug = store.add_product("Mug", "MUG-1", price(1000));
        let user = Uuid::new_v4();
        let existing = service(&store).view(&CartOwner::user(user)).await.unwrap();

        let carts = CartService::new(
            Arc::new(LateUserCart {
                inner: store.clone(),
                missed: AtomicBool::new(false),
            }),
            store.clone(),
            Duration::hours(DEFAULT_CART_TTL_HOURS),
        );
        let view = carts.add_item(&CartOwner::user(user), mug.id, 1).await.unwrap();

        assert_eq!(view.cart_id, existing.cart_id);
        assert_eq!(view.item_count, 1);
        assert_eq!(store.carts().len(), 1);
    }

    #[tokio::test]
    async fn test_store_keeps_one_cart_per_user() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let new_cart = || NewCart {
            session_id: None,
            user_id: Some(user),
            expires_at: Utc::now() + Duration::hours(1),
        };

        store.create_cart(new_cart()).await.unwrap();
        assert!(matches!(
            store.create_cart(new_cart()).await,
            Err(StoreError::Conflict(_))
        ));
    }
}
