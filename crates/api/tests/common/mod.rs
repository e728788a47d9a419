//! Common test utilities for integration tests.
//!
//! The in-memory helpers wire the full router over `InMemoryStore` and
//! `MockProvider`. The Postgres helpers need `TEST_DATABASE_URL`; tests
//! using them return early when it is unset.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header::CONTENT_TYPE, Method, Request},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use domain::services::{CommerceProvider, InMemoryStore, MockProvider};
use rust_decimal::Decimal;
use serde_json::Value;
use shared::crypto::{hmac_sha256, sha256_hex};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storefront_api::{
    app::{create_app, AppState, Stores},
    config::Config,
};
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const WEBHOOK_KEY: &str = "test-webhook-signature-key";
pub const WEBHOOK_URL: &str = "https://shop.example.com/api/v1/webhooks/square";
pub const JWT_SECRET: &str = "test-jwt-secret";

// Tests run in parallel; apply the schema once per binary.
static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// Test configuration with a static access token, admin key and webhook
/// key. Later overrides win.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let admin_hash = sha256_hex(ADMIN_KEY);
    let mut all: Vec<(&str, &str)> = vec![
        ("security.admin_key_hash", admin_hash.as_str()),
        ("security.jwt_secret", JWT_SECRET),
        ("security.rate_limit_per_minute", "0"),
        ("server.public_url", ""),
        ("square.access_token", "static-test-token"),
        ("square.webhook_signature_key", WEBHOOK_KEY),
        ("square.webhook_url", WEBHOOK_URL),
    ];
    all.extend_from_slice(overrides);
    Config::load_for_test(&all).expect("Failed to build test config")
}

pub struct MemoryApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<MockProvider>,
}

/// Every store backed by the same in-memory store.
pub fn memory_stores(store: Arc<InMemoryStore>) -> Stores {
    Stores {
        carts: store.clone(),
        products: store.clone(),
        orders: store.clone(),
        bookings: store.clone(),
        tokens: store,
    }
}

pub fn memory_app(config: Config) -> MemoryApp {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(MockProvider::new());
    let state = AppState::new(config, None, memory_stores(store.clone()), provider.clone())
        .expect("Failed to build app state");
    MemoryApp {
        app: create_app(state.clone()),
        state,
        store,
        provider,
    }
}

pub fn postgres_app(config: Config, pool: &PgPool, provider: Arc<dyn CommerceProvider>) -> Router {
    let state = AppState::new(config, Some(pool.clone()), Stores::postgres(pool), provider)
        .expect("Failed to build app state");
    create_app(state)
}

/// Connects to `TEST_DATABASE_URL` and applies migrations, or returns
/// `None` when the variable is unset.
pub async fn try_test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping Postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    MIGRATED.get_or_init(|| run_migrations(&pool)).await;
    Some(pool)
}

/// Run migrations on the test database.
pub async fn run_migrations(pool: &PgPool) {
    let migration_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("persistence/src/migrations");

    let mut entries: Vec<_> = std::fs::read_dir(&migration_dir)
        .expect("Failed to read migrations directory")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|ext| ext == "sql").unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let sql = std::fs::read_to_string(entry.path()).expect("Failed to read migration file");
        // Migrations are idempotent
        sqlx::raw_sql(&sql)
            .execute(pool)
            .await
            .expect("Failed to apply migration");
    }
}

/// Inserts a visible catalog-linked product with a unique SKU.
pub async fn seed_product(pool: &PgPool, name: &str, price: Decimal) -> Uuid {
    let suffix = Uuid::new_v4().simple().to_string();
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO products (name, price, sku, remote_catalog_id, remote_variation_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(price)
    .bind(format!("SKU-{}", suffix))
    .bind(format!("ITEM-{}", suffix))
    .bind(format!("VAR-{}", suffix))
    .fetch_one(pool)
    .await
    .expect("Failed to seed product")
}

pub fn request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Attaches the connecting peer address the server would record.
pub fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().expect("invalid peer address");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn parse_response_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

pub fn session_header(response: &Response) -> String {
    response
        .headers()
        .get("x-cart-session")
        .expect("missing x-cart-session header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

/// Signature header value for `body` posted to `url`.
pub fn sign_webhook(url: &str, body: &str) -> String {
    STANDARD.encode(hmac_sha256(
        WEBHOOK_KEY.as_bytes(),
        &[url.as_bytes(), body.as_bytes()],
    ))
}
