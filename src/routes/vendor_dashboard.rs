//! Vendor dashboard: storefront profile, live queue, orders and stats

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireVendor;
use crate::domain::orders::UpdateOrderStatusRequest;
use crate::domain::queue::{QueueEntryRow, QueueSettings, QueueSummary, UpdateQueueSettingsRequest};
use crate::domain::vendors::{
    EarningsTotals, OrderCounts, OrderScope, UpdateVendorRequest, Vendor, VendorOrdersQuery,
    VendorStats,
};
use crate::error::ApiError;
use crate::services::cache::keys;
use crate::services::orders::{self as order_service, Actor, OrderRow, ACTIVE_STATUSES_SQL};

use super::vendors::{fetch_vendor, VENDOR_COLUMNS};

// ============================================================================
// Profile
// ============================================================================

/// GET /vendor/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let profile = fetch_vendor(&state, vendor.vendor_id).await?;
    Ok(Json(DataResponse::new(profile)))
}

/// PUT /vendor/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
    Json(req): Json<UpdateVendorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.as_deref().map(str::trim);
    if name == Some("") {
        return Err(ApiError::bad_request("Vendor name cannot be empty"));
    }

    let sql = format!(
        r#"
        UPDATE vendors
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            cuisine = COALESCE($4, cuisine),
            image_url = COALESCE($5, image_url),
            is_open = COALESCE($6, is_open),
            accepting_orders = COALESCE($7, accepting_orders),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        VENDOR_COLUMNS
    );
    let updated: Vendor = sqlx::query_as(&sql)
        .bind(vendor.vendor_id)
        .bind(name)
        .bind(&req.description)
        .bind(&req.cuisine)
        .bind(&req.image_url)
        .bind(req.is_open)
        .bind(req.accepting_orders)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Vendor not found"))?;

    if let Err(e) = state
        .cache
        .delete_pattern(&keys::vendor_menu_pattern(vendor.vendor_id))
        .await
    {
        tracing::warn!(vendor_id = %vendor.vendor_id, error = %e, "Failed to invalidate menu cache");
    }

    tracing::info!(
        vendor_id = %vendor.vendor_id,
        user_id = %vendor.user_id(),
        is_open = updated.is_open,
        accepting_orders = updated.accepting_orders,
        "Vendor profile updated"
    );

    Ok(Json(DataResponse::new(updated)))
}

// ============================================================================
// Stats
// ============================================================================

/// Day boundaries are UTC regardless of the session time zone; `$2` is
/// today's UTC date.
fn stats_sql() -> String {
    let day = "(created_at AT TIME ZONE 'UTC')::date";
    format!(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE {day} = $2) AS orders_today,
            COUNT(*) FILTER (WHERE {day} = $2 AND status = 'completed') AS completed_today,
            COUNT(*) FILTER (WHERE {day} = $2 AND status = 'cancelled') AS cancelled_today,
            COUNT(*) FILTER (WHERE status IN {active}) AS active_orders,
            COALESCE(SUM(total_amount) FILTER (
                WHERE {day} = $2 AND payment_status = 'paid'
            ), 0) AS gross_sales
        FROM orders
        WHERE vendor_id = $1
        "#,
        day = day,
        active = ACTIVE_STATUSES_SQL
    )
}

/// GET /vendor/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let today = Utc::now().date_naive();

    let sql = stats_sql();
    let counts: OrderCounts = sqlx::query_as(&sql)
        .bind(vendor.vendor_id)
        .bind(today)
        .fetch_one(&state.db)
        .await?;

    let earnings: EarningsTotals = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(vendor_amount) FILTER (WHERE status = 'released'), 0) AS released,
            COALESCE(SUM(vendor_amount) FILTER (WHERE status = 'held'), 0) AS held
        FROM payment_distributions
        WHERE vendor_id = $1
        "#,
    )
    .bind(vendor.vendor_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(DataResponse::new(VendorStats::new(today, counts, earnings))))
}

// ============================================================================
// Queue
// ============================================================================

/// GET /vendor/queue
pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let profile = fetch_vendor(&state, vendor.vendor_id).await?;
    let settings = order_service::queue_settings(&state.db, vendor.vendor_id).await?;

    let sql = format!(
        r#"
        SELECT id AS order_id, bill_number, queue_position, status, payment_status, created_at
        FROM orders
        WHERE vendor_id = $1 AND status IN {} AND queue_position IS NOT NULL
        ORDER BY queue_position ASC
        "#,
        ACTIVE_STATUSES_SQL
    );
    let rows: Vec<QueueEntryRow> = sqlx::query_as(&sql)
        .bind(vendor.vendor_id)
        .fetch_all(&state.db)
        .await?;

    let summary = QueueSummary::build(
        &settings,
        profile.is_open && profile.accepting_orders,
        rows,
    )?;
    Ok(Json(DataResponse::new(summary)))
}

/// GET /vendor/queue-settings
pub async fn get_queue_settings(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let settings = order_service::queue_settings(&state.db, vendor.vendor_id).await?;
    Ok(Json(DataResponse::new(settings)))
}

/// PUT /vendor/queue-settings
pub async fn update_queue_settings(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
    Json(req): Json<UpdateQueueSettingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(ApiError::bad_request)?;

    let current = order_service::queue_settings(&state.db, vendor.vendor_id).await?;
    let next = req.apply_to(&current);

    let saved: QueueSettings = sqlx::query_as(
        r#"
        INSERT INTO queue_settings (vendor_id, max_active_orders, avg_preparation_minutes, auto_accept, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (vendor_id) DO UPDATE SET
            max_active_orders = EXCLUDED.max_active_orders,
            avg_preparation_minutes = EXCLUDED.avg_preparation_minutes,
            auto_accept = EXCLUDED.auto_accept,
            updated_at = NOW()
        RETURNING vendor_id, max_active_orders, avg_preparation_minutes, auto_accept, updated_at
        "#,
    )
    .bind(vendor.vendor_id)
    .bind(next.max_active_orders)
    .bind(next.avg_preparation_minutes)
    .bind(next.auto_accept)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        vendor_id = %vendor.vendor_id,
        user_id = %vendor.user_id(),
        max_active_orders = saved.max_active_orders,
        auto_accept = saved.auto_accept,
        "Queue settings updated"
    );

    Ok(Json(DataResponse::new(saved)))
}

// ============================================================================
// Orders
// ============================================================================

fn scope_filter(scope: OrderScope) -> String {
    match scope {
        OrderScope::Active => format!("o.status IN {}", ACTIVE_STATUSES_SQL),
        OrderScope::History => "o.status IN ('completed', 'cancelled')".to_string(),
    }
}

fn scope_order(scope: OrderScope) -> &'static str {
    match scope {
        OrderScope::Active => "o.queue_position ASC NULLS LAST, o.created_at ASC",
        OrderScope::History => "o.updated_at DESC",
    }
}

/// GET /vendor/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<VendorOrdersQuery>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let filter = scope_filter(query.scope);

    let count_sql = format!(
        "SELECT COUNT(*) FROM orders o WHERE o.vendor_id = $1 AND {}",
        filter
    );
    let total: i64 = sqlx::query_scalar(&count_sql)
        .bind(vendor.vendor_id)
        .fetch_one(&state.db)
        .await?;

    let sql = format!(
        "{} WHERE o.vendor_id = $1 AND {} ORDER BY {} LIMIT $2 OFFSET $3",
        order_service::order_select(),
        filter,
        scope_order(query.scope)
    );
    let rows: Vec<OrderRow> = sqlx::query_as(&sql)
        .bind(vendor.vendor_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.db)
        .await?;

    let data = order_service::attach_items(&state.db, rows).await?;
    Ok(Paginated::new(data, &pagination, total))
}

/// GET /vendor/orders/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let row = order_service::load_order(&state.db, order_id)
        .await?
        .filter(|o| o.vendor_id == vendor.vendor_id)
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    let order = order_service::order_response(&state.db, row).await?;
    Ok(Json(DataResponse::new(order)))
}

/// PATCH /vendor/orders/:order_id/status
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    vendor: RequireVendor,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = order_service::change_status(
        &state,
        order_id,
        Actor::Vendor(vendor.vendor_id),
        req.status,
        req.reason.as_deref(),
    )
    .await?;

    Ok(Json(DataResponse::new(order)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_scope_orders_by_queue_position() {
        assert!(scope_filter(OrderScope::Active).contains("'ready'"));
        assert!(scope_order(OrderScope::Active).starts_with("o.queue_position"));
    }

    #[test]
    fn history_scope_covers_finished_orders() {
        let filter = scope_filter(OrderScope::History);
        assert!(filter.contains("'completed'"));
        assert!(filter.contains("'cancelled'"));
        assert!(!filter.contains("'pending'"));
    }

    #[test]
    fn stats_bucket_days_in_utc() {
        let sql = stats_sql();
        assert!(!sql.contains(" created_at::date"));
        assert_eq!(sql.matches("(created_at AT TIME ZONE 'UTC')::date = $2").count(), 4);
    }
}
