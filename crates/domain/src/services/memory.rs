//! In-memory store and mock provider for tests.
//!
//! Compiled for this crate's own tests and, with the `test-util` feature,
//! for dependents' tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::remote::{
    AvailabilitySearch, CatalogPage, CreateCustomer, CreateOrder, CreatePayment,
    CreateRemoteBooking, Money, RemoteAvailability, RemoteBooking, RemoteCustomer, RemoteOrder,
    RemotePayment, TokenRequest, TokenResponse,
};
use crate::models::{
    Booking, Cart, CartItem, CartLine, NewBooking, NewCart, NewOrder, NewOrderItem, Order,
    OrderItem, Product, Service, StoredToken, SyncedProductUpdate,
};
use crate::services::provider::{CommerceProvider, ProviderError, ProviderResult};
use crate::store::{
    BookingStore, CartStore, OrderStore, ProductStore, StoreError, StoreResult, TokenStore,
};

#[derive(Debug, Default)]
struct StoreState {
    products: HashMap<Uuid, Product>,
    services: HashMap<Uuid, Service>,
    carts: HashMap<Uuid, Cart>,
    items: Vec<CartItem>,
    orders: Vec<(Order, Vec<OrderItem>)>,
    bookings: Vec<Booking>,
    tokens: HashMap<String, StoredToken>,
}

/// Store implementing every store trait over process memory.
///
/// Each operation holds one lock for its duration, which gives the same
/// atomicity the database provides for single statements.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    remote_id_columns: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            remote_id_columns: AtomicBool::new(true),
        }
    }

    /// Simulates a schema without the product remote id columns.
    pub fn without_remote_id_columns(self) -> Self {
        self.remote_id_columns.store(false, Ordering::SeqCst);
        self
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a visible product linked to the provider catalog.
    pub fn add_product(&self, name: &str, sku: &str, price: Decimal) -> Product {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            price,
            image_url: None,
            sku: Some(sku.to_string()),
            visible: true,
            remote_catalog_id: Some(format!("ITEM-{}", sku)),
            remote_variation_id: Some(format!("VAR-{}", sku)),
            created_at: now,
            updated_at: now,
        };
        self.insert_product(product.clone());
        product
    }

    pub fn insert_product(&self, product: Product) {
        self.state().products.insert(product.id, product);
    }

    pub fn product(&self, product_id: Uuid) -> Option<Product> {
        self.state().products.get(&product_id).cloned()
    }

    pub fn set_product_price(&self, product_id: Uuid, price: Decimal) {
        if let Some(product) = self.state().products.get_mut(&product_id) {
            product.price = price;
        }
    }

    /// Adds a bookable service synced with the provider.
    pub fn add_service(&self, name: &str, duration_minutes: i32) -> Service {
        let service = Service {
            id: Uuid::new_v4(),
            name: name.to_string(),
            duration_minutes,
            price: Decimal::new(5000, 2),
            remote_variation_id: Some(format!("SVC-{}", name.to_uppercase())),
            remote_variation_version: Some(1),
        };
        self.insert_service(service.clone());
        service
    }

    pub fn insert_service(&self, service: Service) {
        self.state().services.insert(service.id, service);
    }

    pub fn insert_cart(&self, cart: Cart) {
        self.state().carts.insert(cart.id, cart);
    }

    pub fn carts(&self) -> Vec<Cart> {
        self.state().carts.values().cloned().collect()
    }

    pub fn cart_items(&self) -> Vec<CartItem> {
        self.state().items.clone()
    }

    pub fn orders(&self) -> Vec<(Order, Vec<OrderItem>)> {
        self.state().orders.clone()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.state().bookings.clone()
    }

    pub fn tokens(&self) -> Vec<StoredToken> {
        self.state().tokens.values().cloned().collect()
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn find_cart_by_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        Ok(self
            .state()
            .carts
            .values()
            .filter(|c| c.user_id == Some(user_id))
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn find_cart_by_session(&self, session_id: &str) -> StoreResult<Option<Cart>> {
        Ok(self
            .state()
            .carts
            .values()
            .find(|c| c.session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn create_cart(&self, cart: NewCart) -> StoreResult<Cart> {
        let mut state = self.state();
        if let Some(user_id) = cart.user_id {
            if state.carts.values().any(|c| c.user_id == Some(user_id)) {
                return Err(StoreError::Conflict("user already has a cart".into()));
            }
        }
        if let Some(session_id) = &cart.session_id {
            if state
                .carts
                .values()
                .any(|c| c.session_id.as_ref() == Some(session_id))
            {
                return Err(StoreError::Conflict("cart session already exists".into()));
            }
        }
        let now = Utc::now();
        let created = Cart {
            id: Uuid::new_v4(),
            session_id: cart.session_id,
            user_id: cart.user_id,
            created_at: now,
            updated_at: now,
            expires_at: cart.expires_at,
        };
        state.carts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn touch_cart(&self, cart_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(cart) = self.state().carts.get_mut(&cart_id) {
            cart.expires_at = expires_at;
            cart.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn attach_user(&self, cart_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut state = self.state();
        if state
            .carts
            .values()
            .any(|c| c.id != cart_id && c.user_id == Some(user_id))
        {
            return Err(StoreError::Conflict("user already has a cart".into()));
        }
        if let Some(cart) = state.carts.get_mut(&cart_id) {
            cart.user_id = Some(user_id);
            cart.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_cart(&self, cart_id: Uuid) -> StoreResult<()> {
        let mut state = self.state();
        state.items.retain(|i| i.cart_id != cart_id);
        state.carts.remove(&cart_id);
        Ok(())
    }

    async fn list_items(&self, cart_id: Uuid) -> StoreResult<Vec<CartLine>> {
        let state = self.state();
        Ok(state
            .items
            .iter()
            .filter(|i| i.cart_id == cart_id)
            .map(|i| {
                let product = state.products.get(&i.product_id);
                CartLine::new(
                    i.clone(),
                    product.map(|p| p.name.clone()).unwrap_or_default(),
                    product.and_then(|p| p.image_url.clone()),
                )
            })
            .collect())
    }

    async fn find_item(&self, item_id: Uuid) -> StoreResult<Option<CartItem>> {
        Ok(self.state().items.iter().find(|i| i.id == item_id).cloned())
    }

    async fn upsert_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> StoreResult<CartItem> {
        let mut state = self.state();
        if let Some(existing) = state
            .items
            .iter_mut()
            .find(|i| i.cart_id == cart_id && i.product_id == product_id)
        {
            existing.quantity += quantity;
            existing.unit_price = unit_price;
            return Ok(existing.clone());
        }
        let item = CartItem {
            id: Uuid::new_v4(),
            cart_id,
            product_id,
            quantity,
            unit_price,
            created_at: Utc::now(),
        };
        state.items.push(item.clone());
        Ok(item)
    }

    async fn set_item_quantity(&self, item_id: Uuid, quantity: i32) -> StoreResult<()> {
        if let Some(item) = self.state().items.iter_mut().find(|i| i.id == item_id) {
            item.quantity = quantity;
        }
        Ok(())
    }

    async fn delete_item(&self, item_id: Uuid) -> StoreResult<()> {
        self.state().items.retain(|i| i.id != item_id);
        Ok(())
    }

    async fn clear_items(&self, cart_id: Uuid) -> StoreResult<()> {
        self.state().items.retain(|i| i.cart_id != cart_id);
        Ok(())
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn find_product(&self, product_id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.product(product_id))
    }

    async fn update_synced_product(
        &self,
        update: &SyncedProductUpdate,
        with_remote_ids: bool,
    ) -> StoreResult<bool> {
        if with_remote_ids && !self.remote_id_columns.load(Ordering::SeqCst) {
            return Err(StoreError::UnknownColumn("remote_catalog_id".into()));
        }
        let mut state = self.state();
        let Some(product) = state
            .products
            .values_mut()
            .find(|p| p.sku.as_deref() == Some(update.sku.as_str()))
        else {
            return Ok(false);
        };
        product.name = update.name.clone();
        product.description = update.description.clone();
        product.price = update.price;
        product.image_url = update.image_url.clone();
        if with_remote_ids {
            product.remote_catalog_id = Some(update.remote_catalog_id.clone());
            product.remote_variation_id = Some(update.remote_variation_id.clone());
        }
        product.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> StoreResult<Order> {
        let created = Order {
            id: Uuid::new_v4(),
            remote_order_id: order.remote_order_id,
            remote_payment_id: order.remote_payment_id,
            email: order.email,
            user_id: order.user_id,
            session_id: order.session_id,
            subtotal: order.subtotal,
            total: order.total,
            currency: order.currency,
            shipping_address: order.shipping_address,
            billing_address: order.billing_address,
            status: order.status,
            created_at: Utc::now(),
        };
        let lines = items
            .into_iter()
            .map(|i| OrderItem {
                id: Uuid::new_v4(),
                order_id: created.id,
                product_id: i.product_id,
                name: i.name,
                sku: i.sku,
                unit_price: i.unit_price,
                quantity: i.quantity,
            })
            .collect();
        self.state().orders.push((created.clone(), lines));
        Ok(created)
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn find_service(&self, service_id: Uuid) -> StoreResult<Option<Service>> {
        Ok(self.state().services.get(&service_id).cloned())
    }

    async fn create_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        let now = Utc::now();
        let created = Booking {
            id: Uuid::new_v4(),
            remote_booking_id: booking.remote_booking_id,
            remote_customer_id: booking.remote_customer_id,
            service_id: booking.service_id,
            staff_id: booking.staff_id,
            start_at: booking.start_at,
            end_at: booking.end_at,
            status: booking.status,
            customer_name: booking.customer_name,
            customer_email: booking.customer_email,
            customer_phone: booking.customer_phone,
            notes: booking.notes,
            created_at: now,
            updated_at: now,
        };
        self.state().bookings.push(created.clone());
        Ok(created)
    }

    async fn update_booking_status(
        &self,
        remote_booking_id: &str,
        status: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state();
        match state
            .bookings
            .iter_mut()
            .find(|b| b.remote_booking_id == remote_booking_id)
        {
            Some(booking) => {
                booking.status = status.to_string();
                booking.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn find_token(&self, provider: &str) -> StoreResult<Option<StoredToken>> {
        Ok(self.state().tokens.get(provider).cloned())
    }

    async fn upsert_token(&self, token: StoredToken) -> StoreResult<()> {
        self.state().tokens.insert(token.provider.clone(), token);
        Ok(())
    }

    async fn delete_token(&self, provider: &str) -> StoreResult<bool> {
        Ok(self.state().tokens.remove(provider).is_some())
    }
}

/// Provider operations, used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    RequestToken,
    ListCatalog,
    CreateOrder,
    CreatePayment,
    CreateCustomer,
    CreateBooking,
    SearchAvailability,
}

/// A request received by [`MockProvider`].
#[derive(Debug, Clone)]
pub enum ProviderCall {
    RequestToken(TokenRequest),
    ListCatalog { cursor: Option<String> },
    CreateOrder(CreateOrder),
    CreatePayment(CreatePayment),
    CreateCustomer(CreateCustomer),
    CreateBooking(CreateRemoteBooking),
    SearchAvailability(AvailabilitySearch),
}

impl ProviderCall {
    pub fn op(&self) -> ProviderOp {
        match self {
            ProviderCall::RequestToken(_) => ProviderOp::RequestToken,
            ProviderCall::ListCatalog { .. } => ProviderOp::ListCatalog,
            ProviderCall::CreateOrder(_) => ProviderOp::CreateOrder,
            ProviderCall::CreatePayment(_) => ProviderOp::CreatePayment,
            ProviderCall::CreateCustomer(_) => ProviderOp::CreateCustomer,
            ProviderCall::CreateBooking(_) => ProviderOp::CreateBooking,
            ProviderCall::SearchAvailability(_) => ProviderOp::SearchAvailability,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Status(u16),
    Timeout,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<ProviderCall>,
    failures: HashMap<ProviderOp, Failure>,
    catalog_pages: Vec<CatalogPage>,
    availability: Vec<RemoteAvailability>,
    payment_status: String,
    omit_refresh_token: bool,
    issued: u32,
}

/// Mock provider that records every request and answers with canned data.
#[derive(Debug)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                failures: HashMap::new(),
                catalog_pages: Vec::new(),
                availability: Vec::new(),
                payment_status: "COMPLETED".to_string(),
                omit_refresh_token: false,
                issued: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `op` answer with HTTP 500.
    pub fn fail(&self, op: ProviderOp) {
        self.state().failures.insert(op, Failure::Status(500));
    }

    pub fn fail_with_status(&self, op: ProviderOp, status: u16) {
        self.state().failures.insert(op, Failure::Status(status));
    }

    pub fn time_out(&self, op: ProviderOp) {
        self.state().failures.insert(op, Failure::Timeout);
    }

    pub fn set_catalog_pages(&self, pages: Vec<CatalogPage>) {
        self.state().catalog_pages = pages;
    }

    pub fn set_availability(&self, slots: Vec<RemoteAvailability>) {
        self.state().availability = slots;
    }

    pub fn set_payment_status(&self, status: &str) {
        self.state().payment_status = status.to_string();
    }

    /// Token responses stop carrying a refresh token.
    pub fn omit_refresh_token(&self) {
        self.state().omit_refresh_token = true;
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: ProviderOp) -> usize {
        self.state().calls.iter().filter(|c| c.op() == op).count()
    }

    /// Records `call` and returns the injected failure for it, if any.
    fn record(&self, call: ProviderCall) -> ProviderResult<()> {
        let mut state = self.state();
        let op = call.op();
        state.calls.push(call);
        match state.failures.get(&op) {
            Some(Failure::Status(status)) => Err(ProviderError::Status {
                status: *status,
                message: format!("simulated {:?} failure", op),
            }),
            Some(Failure::Timeout) => Err(ProviderError::Timeout),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.issued += 1;
        format!("{}-{}", prefix, state.issued)
    }
}

#[async_trait]
impl CommerceProvider for MockProvider {
    async fn request_token(&self, request: TokenRequest) -> ProviderResult<TokenResponse> {
        self.record(ProviderCall::RequestToken(request))?;
        let access_token = self.next_id("mock-access");
        let refresh_token = if self.state().omit_refresh_token {
            None
        } else {
            Some(self.next_id("mock-refresh"))
        };
        Ok(TokenResponse {
            access_token,
            refresh_token,
            expires_at: Some(Utc::now() + Duration::days(30)),
            merchant_id: Some("MERCHANT-1".to_string()),
            token_type: Some("bearer".to_string()),
        })
    }

    async fn list_catalog(
        &self,
        _access_token: &str,
        cursor: Option<&str>,
    ) -> ProviderResult<CatalogPage> {
        self.record(ProviderCall::ListCatalog {
            cursor: cursor.map(str::to_string),
        })?;
        let index = cursor
            .and_then(|c| c.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let state = self.state();
        let pages = &state.catalog_pages;
        let Some(page) = pages.get(index) else {
            return Ok(CatalogPage::default());
        };
        let mut page = page.clone();
        page.cursor = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(page)
    }

    async fn create_order(
        &self,
        _access_token: &str,
        order: CreateOrder,
    ) -> ProviderResult<RemoteOrder> {
        let total: i64 = order
            .line_items
            .iter()
            .map(|l| l.base_price_money.amount * l.quantity.parse::<i64>().unwrap_or(0))
            .sum();
        let currency = order
            .line_items
            .first()
            .map(|l| l.base_price_money.currency.clone())
            .unwrap_or_default();
        self.record(ProviderCall::CreateOrder(order))?;
        Ok(RemoteOrder {
            id: self.next_id("ORDER"),
            total_money: Some(Money {
                amount: total,
                currency,
            }),
            state: Some("OPEN".to_string()),
        })
    }

    async fn create_payment(
        &self,
        _access_token: &str,
        payment: CreatePayment,
    ) -> ProviderResult<RemotePayment> {
        self.record(ProviderCall::CreatePayment(payment))?;
        let status = self.state().payment_status.clone();
        Ok(RemotePayment {
            id: self.next_id("PAYMENT"),
            status,
        })
    }

    async fn create_customer(
        &self,
        _access_token: &str,
        customer: CreateCustomer,
    ) -> ProviderResult<RemoteCustomer> {
        self.record(ProviderCall::CreateCustomer(customer))?;
        Ok(RemoteCustomer {
            id: self.next_id("CUSTOMER"),
        })
    }

    async fn create_booking(
        &self,
        _access_token: &str,
        booking: CreateRemoteBooking,
    ) -> ProviderResult<RemoteBooking> {
        self.record(ProviderCall::CreateBooking(booking))?;
        Ok(RemoteBooking {
            id: self.next_id("BOOKING"),
            status: Some("ACCEPTED".to_string()),
        })
    }

    async fn search_availability(
        &self,
        _access_token: &str,
        search: AvailabilitySearch,
    ) -> ProviderResult<Vec<RemoteAvailability>> {
        self.record(ProviderCall::SearchAvailability(search))?;
        Ok(self.state().availability.clone())
    }
}
