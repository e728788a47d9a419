use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use storefront_api::app::{create_app, AppState, Stores};
use storefront_api::config::Config;
use storefront_api::middleware::{init_metrics, logging::init_logging};
use storefront_api::services::SquareClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging);
    init_metrics().context("failed to install metrics recorder")?;

    info!("Starting storefront API v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database.pool_config()).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    let provider = Arc::new(SquareClient::new(&config.square)?);
    info!(
        environment = %config.square.environment,
        enabled = config.square.enabled,
        "Square client ready"
    );

    let addr = config.socket_addr()?;
    let state = AppState::new(config, Some(pool.clone()), Stores::postgres(&pool), provider)?;
    let app = create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
