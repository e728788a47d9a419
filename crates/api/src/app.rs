use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use domain::services::{
    BookingService, CartService, CatalogSyncJob, CheckoutService, CommerceProvider, OAuthManager,
    OAuthSettings, WebhookVerifier,
};
use domain::store::{BookingStore, CartStore, OrderStore, ProductStore, TokenStore};
use persistence::repositories::{
    BookingRepository, CartRepository, OAuthTokenRepository, OrderRepository, ProductRepository,
};
use shared::jwt::JwtVerifier;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Config, ConfigValidationError};
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_admin, trace_id,
    IpRateLimiter,
};
use crate::routes::{admin, bookings, cart, checkout, health, oauth, webhooks};

/// Key the Square connection is stored under.
pub const SQUARE_PROVIDER_KEY: &str = "square";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Absent when the app runs on in-memory stores.
    pub pool: Option<PgPool>,
    pub services: Arc<CommerceServices>,
    pub user_tokens: Option<Arc<JwtVerifier>>,
    pub rate_limiter: Option<Arc<IpRateLimiter>>,
}

pub struct CommerceServices {
    pub carts: Arc<CartService>,
    pub checkout: CheckoutService,
    pub bookings: BookingService,
    pub catalog_sync: CatalogSyncJob,
    pub oauth: Arc<OAuthManager>,
    pub webhooks: WebhookVerifier,
}

/// Store implementations behind the services.
#[derive(Clone)]
pub struct Stores {
    pub carts: Arc<dyn CartStore>,
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl Stores {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            carts: Arc::new(CartRepository::new(pool.clone())),
            products: Arc::new(ProductRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool.clone())),
            bookings: Arc::new(BookingRepository::new(pool.clone())),
            tokens: Arc::new(OAuthTokenRepository::new(pool.clone())),
        }
    }
}

fn oauth_settings(config: &Config) -> OAuthSettings {
    let square = &config.square;
    let non_empty = |value: &str| Some(value.to_string()).filter(|v| !v.is_empty());
    OAuthSettings {
        enabled: square.enabled,
        provider_key: SQUARE_PROVIDER_KEY.to_string(),
        application_id: square.application_id.clone(),
        application_secret: square.application_secret.clone(),
        redirect_url: square.redirect_url.clone(),
        scopes: square.scopes.clone(),
        static_access_token: non_empty(&square.access_token),
        location_id: non_empty(&square.location_id),
        environment: square.environment.clone(),
        authorize_base_url: square.base_url().to_string(),
    }
}

impl CommerceServices {
    pub fn build(
        config: &Config,
        stores: Stores,
        provider: Arc<dyn CommerceProvider>,
    ) -> Result<Self, ConfigValidationError> {
        let vault = config.encryption.vault().map_err(|e| {
            ConfigValidationError::InvalidValue(format!("encryption.key: {}", e))
        })?;

        let oauth = Arc::new(OAuthManager::new(
            oauth_settings(config),
            Arc::new(vault),
            stores.tokens.clone(),
            provider.clone(),
        ));
        let carts = Arc::new(CartService::new(
            stores.carts.clone(),
            stores.products.clone(),
            chrono::Duration::hours(config.cart.ttl_hours),
        ));
        let checkout = CheckoutService::new(
            carts.clone(),
            stores.products.clone(),
            stores.orders.clone(),
            provider.clone(),
            oauth.clone(),
            config.square.currency.clone(),
        );
        let bookings = BookingService::new(stores.bookings.clone(), provider.clone(), oauth.clone());
        let catalog_sync = CatalogSyncJob::new(stores.products.clone(), provider, oauth.clone());
        let webhooks = WebhookVerifier::new(Some(config.square.webhook_signature_key.as_str()));

        Ok(Self {
            carts,
            checkout,
            bookings,
            catalog_sync,
            oauth,
            webhooks,
        })
    }
}

/// Shopper token verifier: RS256 public key when set, else HS256 secret.
fn user_token_verifier(config: &Config) -> Result<Option<Arc<JwtVerifier>>, ConfigValidationError> {
    let security = &config.security;
    let verifier = if !security.jwt_public_key.is_empty() {
        Some(JwtVerifier::from_rsa_pem(
            &security.jwt_public_key,
            security.jwt_leeway_secs,
        ))
    } else if !security.jwt_secret.is_empty() {
        Some(JwtVerifier::from_secret(
            &security.jwt_secret,
            security.jwt_leeway_secs,
        ))
    } else {
        None
    };

    verifier
        .transpose()
        .map(|v| v.map(Arc::new))
        .map_err(|e| ConfigValidationError::InvalidValue(format!("security.jwt: {}", e)))
}

impl AppState {
    pub fn new(
        config: Config,
        pool: Option<PgPool>,
        stores: Stores,
        provider: Arc<dyn CommerceProvider>,
    ) -> Result<Self, ConfigValidationError> {
        let services = CommerceServices::build(&config, stores, provider)?;
        let user_tokens = user_token_verifier(&config)?;
        let trusted_proxies = config.security.trusted_proxy_ips()?;
        let rate_limiter = IpRateLimiter::new(config.security.rate_limit_per_minute).map(|limiter| {
            Arc::new(
                limiter
                    .with_max_tracked(config.security.rate_limit_max_tracked_ips)
                    .with_trusted_proxies(trusted_proxies),
            )
        });

        if user_tokens.is_none() {
            tracing::warn!("No shopper token key configured; signed-in carts are disabled");
        }
        if !services.webhooks.is_configured() {
            tracing::warn!("No webhook signature key configured; notifications will be rejected");
        }

        Ok(Self {
            config: Arc::new(config),
            pool,
            services: Arc::new(services),
            user_tokens,
            rate_limiter,
        })
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Shopper-facing writes are limited per client IP
    let limited_routes = Router::new()
        .route("/api/v1/cart", delete(cart::clear_cart))
        .route("/api/v1/cart/items", post(cart::add_item))
        .route(
            "/api/v1/cart/items/:item_id",
            put(cart::update_item).delete(cart::remove_item),
        )
        .route("/api/v1/cart/merge", post(cart::merge))
        .route("/api/v1/checkout", post(checkout::checkout))
        .route("/api/v1/bookings", post(bookings::create_booking))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let shopper_routes = Router::new()
        .route("/api/v1/cart", get(cart::get_cart))
        .route(
            "/api/v1/bookings/availability",
            get(bookings::get_availability),
        );

    let admin_routes = Router::new()
        .route("/api/v1/admin/square/connect", get(admin::connect))
        .route("/api/v1/admin/square/status", get(admin::status))
        .route("/api/v1/admin/square/refresh", post(admin::refresh))
        .route("/api/v1/admin/square/connection", delete(admin::disconnect))
        .route("/api/v1/admin/catalog/sync", post(admin::sync_catalog))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // Provider callbacks authenticate by signed state or signature
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/api/v1/oauth/square/callback", get(oauth::callback))
        .route("/api/v1/webhooks/square", post(webhooks::receive))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(shopper_routes)
        .merge(limited_routes)
        .merge(admin_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors_layer(&config))
        .with_state(state)
}
