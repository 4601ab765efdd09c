use axum::{http::HeaderValue, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Largest accepted request body; orders and webhooks are small JSON
const MAX_BODY_BYTES: usize = 256 * 1024;

use crate::auth::JwksCache;
use crate::config::Settings;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::{RazorpayClient, RedisCache};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub jwks_cache: JwksCache,
    pub cache: RedisCache,
    pub razorpay: RazorpayClient,
    /// Shared client for Supabase Auth and JWKS requests
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        db: PgPool,
        settings: Settings,
        jwks_cache: JwksCache,
        cache: RedisCache,
        razorpay: RazorpayClient,
        http_client: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            settings,
            jwks_cache,
            cache,
            razorpay,
            http_client,
        })
    }
}

/// Build the router with CORS, tracing and request-id middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // Spans at DEBUG; domain events log at INFO
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    // Build router (routes at root level, no /api prefix)
    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderName::from_static("last-event-id"),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}
