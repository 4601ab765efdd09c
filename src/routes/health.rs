use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub redis: String,
    pub payments: String,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (db_ok, redis_result) = tokio::join!(db::health_check(&state.db), state.cache.health_check());

    let redis_ok = redis_result.is_ok();
    let payments = if state.razorpay.is_live() { "live" } else { "test" };

    // Redis only backs carts and menu caching; the database is critical
    let status = match (db_ok, redis_ok) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    };

    let status_code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: if db_ok { "ok" } else { "error" }.to_string(),
                redis: if redis_ok { "ok" } else { "error" }.to_string(),
                payments: payments.to_string(),
            },
        }),
    )
}
