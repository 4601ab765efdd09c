//! Storefront browsing
//!
//! Public vendor listing and menus. Menus are cached in Redis per vendor and
//! invalidated by every menu or stock write of that vendor.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::domain::menu::{filter_items, group_by_category, MenuItem, MenuQuery};
use crate::domain::vendors::{Vendor, VendorListQuery, VendorResponse};
use crate::error::ApiError;
use crate::services::cache::keys;

pub(crate) const VENDOR_COLUMNS: &str = "id, owner_id, name, description, cuisine, image_url, \
     is_open, accepting_orders, created_at, updated_at";

pub(crate) const MENU_COLUMNS: &str = "id, vendor_id, name, description, price, category, \
     image_url, is_available, is_vegetarian, stock_quantity, preparation_minutes, created_at, updated_at";

/// GET /vendors
pub async fn list_vendors(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<VendorListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let open_only = query.open_only.unwrap_or(false);
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM vendors
        WHERE ($1::bool = false OR is_open = true)
          AND ($2::text IS NULL OR name ILIKE $2 OR cuisine ILIKE $2)
        "#,
    )
    .bind(open_only)
    .bind(&search)
    .fetch_one(&state.db)
    .await?;

    let vendors: Vec<Vendor> = sqlx::query_as(&format!(
        r#"
        SELECT {}
        FROM vendors
        WHERE ($1::bool = false OR is_open = true)
          AND ($2::text IS NULL OR name ILIKE $2 OR cuisine ILIKE $2)
        ORDER BY is_open DESC, name ASC
        LIMIT $3 OFFSET $4
        "#,
        VENDOR_COLUMNS
    ))
    .bind(open_only)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<VendorResponse> = vendors.into_iter().map(Into::into).collect();
    Ok(Paginated::new(data, &pagination, total))
}

pub(crate) async fn fetch_vendor(state: &AppState, vendor_id: Uuid) -> Result<Vendor, ApiError> {
    sqlx::query_as(&format!("SELECT {} FROM vendors WHERE id = $1", VENDOR_COLUMNS))
        .bind(vendor_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Vendor not found"))
}

/// GET /vendors/:vendor_id
pub async fn get_vendor(
    State(state): State<Arc<AppState>>,
    Path(vendor_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let vendor = fetch_vendor(&state, vendor_id).await?;
    Ok(Json(DataResponse::new(VendorResponse::from(vendor))))
}

/// GET /vendors/:vendor_id/menu
pub async fn get_vendor_menu(
    State(state): State<Arc<AppState>>,
    Path(vendor_id): Path<Uuid>,
    Query(query): Query<MenuQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let include_unavailable = query.include_unavailable.unwrap_or(false);
    let cache_key = keys::vendor_menu(vendor_id, include_unavailable);

    let items: Vec<MenuItem> = match state.cache.get(&cache_key).await {
        Some(items) => items,
        None => {
            // 404 for unknown vendors rather than an empty menu
            fetch_vendor(&state, vendor_id).await?;

            let items: Vec<MenuItem> = sqlx::query_as(&format!(
                r#"
                SELECT {}
                FROM menu_items
                WHERE vendor_id = $1 AND ($2::bool = true OR is_available = true)
                ORDER BY category NULLS LAST, name
                "#,
                MENU_COLUMNS
            ))
            .bind(vendor_id)
            .bind(include_unavailable)
            .fetch_all(&state.db)
            .await?;

            if let Err(e) = state.cache.set(&cache_key, &items).await {
                tracing::warn!(vendor_id = %vendor_id, error = %e, "Failed to cache menu");
            }
            items
        }
    };

    let categories = group_by_category(filter_items(items, &query));
    Ok(Json(DataResponse::new(categories)))
}
