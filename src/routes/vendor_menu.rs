//! Menu and inventory management for the signed-in vendor

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::RequireVendor;
use crate::domain::menu::{
    availability_after_stock_change, CreateMenuItemRequest, InventoryQuery, MenuItem,
    UpdateAvailabilityRequest, UpdateMenuItemRequest, UpdateStockRequest,
    DEFAULT_LOW_STOCK_THRESHOLD,
};
use crate::error::ApiError;
use crate::services::cache::keys;

use super::vendors::MENU_COLUMNS;

async fn invalidate_menu(state: &AppState, vendor_id: Uuid) {
    if let Err(e) = state
        .cache
        .delete_pattern(&keys::vendor_menu_pattern(vendor_id))
        .await
    {
        tracing::warn!(vendor_id = %vendor_id, error = %e, "Failed to invalidate menu cache");
    }
}

async fn fetch_own_item(state: &AppState, vendor_id: Uuid, item_id: Uuid) -> Result<MenuItem, ApiError> {
    sqlx::query_as(&format!(
        "SELECT {} FROM menu_items WHERE id = $1 AND vendor_id = $2",
        MENU_COLUMNS
    ))
    .bind(item_id)
    .bind(vendor_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Menu item not found"))
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// GET /vendor/menu
pub async fn list_menu(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let items: Vec<MenuItem> = sqlx::query_as(&format!(
        "SELECT {} FROM menu_items WHERE vendor_id = $1 ORDER BY category NULLS LAST, name",
        MENU_COLUMNS
    ))
    .bind(vendor.vendor_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(DataResponse::new(items)))
}

/// POST /vendor/menu
pub async fn create_menu_item(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
    Json(req): Json<CreateMenuItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(ApiError::bad_request)?;

    // Items created with no stock start hidden
    let is_available = req.is_available && req.stock_quantity != Some(0);

    let item: MenuItem = sqlx::query_as(&format!(
        r#"
        INSERT INTO menu_items (vendor_id, name, description, price, category, image_url,
                                is_available, is_vegetarian, stock_quantity, preparation_minutes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        MENU_COLUMNS
    ))
    .bind(vendor.vendor_id)
    .bind(req.name.trim())
    .bind(trimmed(req.description.as_deref()))
    .bind(req.price)
    .bind(trimmed(req.category.as_deref()))
    .bind(trimmed(req.image_url.as_deref()))
    .bind(is_available)
    .bind(req.is_vegetarian)
    .bind(req.stock_quantity)
    .bind(req.preparation_minutes)
    .fetch_one(&state.db)
    .await?;

    invalidate_menu(&state, vendor.vendor_id).await;
    tracing::info!(vendor_id = %vendor.vendor_id, item_id = %item.id, "Menu item created");

    Ok(Created(item))
}

/// PUT /vendor/menu/:item_id
pub async fn update_menu_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    vendor: RequireVendor,
    Json(req): Json<UpdateMenuItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(ApiError::bad_request)?;

    let item: MenuItem = sqlx::query_as(&format!(
        r#"
        UPDATE menu_items
        SET name = COALESCE($3, name),
            description = COALESCE($4, description),
            price = COALESCE($5, price),
            category = COALESCE($6, category),
            image_url = COALESCE($7, image_url),
            is_vegetarian = COALESCE($8, is_vegetarian),
            preparation_minutes = COALESCE($9, preparation_minutes),
            updated_at = NOW()
        WHERE id = $1 AND vendor_id = $2
        RETURNING {}
        "#,
        MENU_COLUMNS
    ))
    .bind(item_id)
    .bind(vendor.vendor_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(trimmed(req.description.as_deref()))
    .bind(req.price)
    .bind(trimmed(req.category.as_deref()))
    .bind(trimmed(req.image_url.as_deref()))
    .bind(req.is_vegetarian)
    .bind(req.preparation_minutes)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Menu item not found"))?;

    invalidate_menu(&state, vendor.vendor_id).await;

    Ok(Json(DataResponse::new(item)))
}

/// DELETE /vendor/menu/:item_id
///
/// Past orders keep their item snapshots; the reference is cleared.
pub async fn delete_menu_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM menu_items WHERE id = $1 AND vendor_id = $2")
        .bind(item_id)
        .bind(vendor.vendor_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Menu item not found"));
    }

    invalidate_menu(&state, vendor.vendor_id).await;
    tracing::info!(vendor_id = %vendor.vendor_id, item_id = %item_id, "Menu item deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /vendor/menu/:item_id/availability
pub async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    vendor: RequireVendor,
    Json(req): Json<UpdateAvailabilityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = fetch_own_item(&state, vendor.vendor_id, item_id).await?;
    if req.is_available && current.stock_quantity == Some(0) {
        return Err(ApiError::conflict(
            "Item is out of stock; update its stock to make it available",
        ));
    }

    let item: MenuItem = sqlx::query_as(&format!(
        r#"
        UPDATE menu_items SET is_available = $3, updated_at = NOW()
        WHERE id = $1 AND vendor_id = $2
        RETURNING {}
        "#,
        MENU_COLUMNS
    ))
    .bind(item_id)
    .bind(vendor.vendor_id)
    .bind(req.is_available)
    .fetch_one(&state.db)
    .await?;

    invalidate_menu(&state, vendor.vendor_id).await;

    Ok(Json(DataResponse::new(item)))
}

/// PATCH /vendor/menu/:item_id/stock
pub async fn update_stock(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    vendor: RequireVendor,
    Json(req): Json<UpdateStockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if matches!(req.stock_quantity, Some(q) if q < 0) {
        return Err(ApiError::bad_request("stock_quantity cannot be negative"));
    }

    let mut tx = state.db.begin().await?;

    let current: MenuItem = sqlx::query_as(&format!(
        "SELECT {} FROM menu_items WHERE id = $1 AND vendor_id = $2 FOR UPDATE",
        MENU_COLUMNS
    ))
    .bind(item_id)
    .bind(vendor.vendor_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Menu item not found"))?;

    let is_available = availability_after_stock_change(
        current.is_available,
        current.stock_quantity,
        req.stock_quantity,
    );

    let item: MenuItem = sqlx::query_as(&format!(
        r#"
        UPDATE menu_items SET stock_quantity = $2, is_available = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        MENU_COLUMNS
    ))
    .bind(item_id)
    .bind(req.stock_quantity)
    .bind(is_available)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    invalidate_menu(&state, vendor.vendor_id).await;

    tracing::info!(
        vendor_id = %vendor.vendor_id,
        item_id = %item_id,
        stock = ?item.stock_quantity,
        is_available,
        "Stock updated"
    );

    Ok(Json(DataResponse::new(item)))
}

/// GET /vendor/inventory
///
/// Stock-tracked items at or below the threshold, emptiest first.
pub async fn low_stock(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InventoryQuery>,
    vendor: RequireVendor,
) -> Result<impl IntoResponse, ApiError> {
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD).max(0);

    let items: Vec<MenuItem> = sqlx::query_as(&format!(
        r#"
        SELECT {}
        FROM menu_items
        WHERE vendor_id = $1 AND stock_quantity IS NOT NULL AND stock_quantity <= $2
        ORDER BY stock_quantity ASC, name
        "#,
        MENU_COLUMNS
    ))
    .bind(vendor.vendor_id)
    .bind(threshold)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(DataResponse::new(items)))
}
