mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::{Context, Result};
use std::time::Duration;

use services::{RazorpayClient, RedisCache};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;

    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting Zomatify backend"
    );

    let pool = db::create_pool(&settings).await?;
    if settings.run_migrations {
        db::run_migrations(&pool).await?;
    }

    let cache = RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await?;

    // Shared by the auth proxy and JWKS fetches
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")?;

    let razorpay = RazorpayClient::new(&settings)?;

    let jwks_cache = auth::JwksCache::new(
        http_client.clone(),
        settings.supabase_jwt_jwks_url.clone(),
        settings.supabase_jwt_issuer.clone(),
        settings.supabase_jwt_audience.clone(),
        settings.supabase_jwt_secret.as_deref(),
        settings.jwks_cache_ttl_seconds,
    );

    if let Err(e) = jwks_cache.warm_cache().await {
        tracing::warn!(error = %e, "Failed to warm JWKS cache - will fetch on first request");
    }

    let state = app::AppState::new(
        pool,
        settings.clone(),
        jwks_cache,
        cache,
        razorpay,
        http_client,
    );

    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
