//! Server-side shopping cart

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::cart::{Cart, CartView, CheckoutRequest, SetCartItemRequest};
use crate::domain::orders::OrderableItem;
use crate::error::ApiError;
use crate::services::cache::keys;
use crate::services::orders;

/// Cart for display; an unreachable Redis shows an empty cart
async fn load_cart(state: &AppState, user_id: Uuid) -> Cart {
    state
        .cache
        .get(&keys::cart(user_id))
        .await
        .unwrap_or_default()
}

/// Cart that is about to be modified or ordered. A failed read must not be
/// mistaken for an empty cart, or the write that follows would replace it.
async fn load_cart_for_update(state: &AppState, user_id: Uuid) -> Result<Cart, ApiError> {
    stored_or_empty(state.cache.try_get(&keys::cart(user_id)).await)
}

fn stored_or_empty(stored: anyhow::Result<Option<Cart>>) -> Result<Cart, ApiError> {
    Ok(stored?.unwrap_or_default())
}

async fn save_cart(state: &AppState, user_id: Uuid, cart: &Cart) -> Result<(), ApiError> {
    let key = keys::cart(user_id);
    if cart.is_empty() {
        state.cache.delete(&key).await?;
    } else {
        state
            .cache
            .set_with_ttl(&key, cart, Duration::from_secs(state.settings.cart_ttl_seconds))
            .await?;
    }
    Ok(())
}

async fn render(state: &AppState, cart: &Cart) -> Result<CartView, ApiError> {
    let ids: Vec<Uuid> = cart.lines.iter().map(|l| l.menu_item_id).collect();
    if ids.is_empty() {
        return Ok(CartView::build(cart, &[], None));
    }

    let items: Vec<OrderableItem> = sqlx::query_as(
        r#"
        SELECT id, vendor_id, name, price, is_available, stock_quantity
        FROM menu_items
        WHERE id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(&state.db)
    .await?;

    let vendor_name: Option<String> = match cart.vendor_id {
        Some(vendor_id) => sqlx::query_scalar("SELECT name FROM vendors WHERE id = $1")
            .bind(vendor_id)
            .fetch_optional(&state.db)
            .await?,
        None => None,
    };

    Ok(CartView::build(cart, &items, vendor_name))
}

/// GET /cart
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let cart = load_cart(&state, auth.user_id).await;
    Ok(Json(DataResponse::new(render(&state, &cart).await?)))
}

/// PUT /cart/items
pub async fn set_cart_item(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<SetCartItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let vendor_id: Uuid = sqlx::query_scalar("SELECT vendor_id FROM menu_items WHERE id = $1")
        .bind(req.menu_item_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Menu item not found"))?;

    let mut cart = load_cart_for_update(&state, auth.user_id).await?;
    cart.set_quantity(vendor_id, req.menu_item_id, req.quantity, req.replace)?;
    save_cart(&state, auth.user_id, &cart).await?;

    Ok(Json(DataResponse::new(render(&state, &cart).await?)))
}

/// DELETE /cart
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    state.cache.delete(&keys::cart(auth.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/checkout
///
/// Places an order from the cart and empties it.
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = load_cart_for_update(&state, auth.user_id).await?;
    let vendor_id = match cart.vendor_id {
        Some(vendor_id) if !cart.is_empty() => vendor_id,
        _ => return Err(ApiError::bad_request("Cart is empty")),
    };

    let order = orders::place_order(
        &state,
        auth.user_id,
        vendor_id,
        &cart.order_lines(),
        req.notes.as_deref(),
    )
    .await?;

    if let Err(e) = state.cache.delete(&keys::cart(auth.user_id)).await {
        tracing::warn!(user_id = %auth.user_id, error = %e, "Failed to clear cart after checkout");
    }

    Ok(Created(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cart_starts_empty() {
        let cart = stored_or_empty(Ok(None)).unwrap();
        assert!(cart.is_empty());
        assert!(cart.vendor_id.is_none());
    }

    #[test]
    fn stored_cart_is_kept() {
        let mut stored = Cart::default();
        let vendor = Uuid::new_v4();
        stored.set_quantity(vendor, Uuid::new_v4(), 2, false).unwrap();

        let cart = stored_or_empty(Ok(Some(stored))).unwrap();
        assert_eq!(cart.vendor_id, Some(vendor));
        assert_eq!(cart.lines.len(), 1);
    }

    #[test]
    fn redis_failure_is_not_an_empty_cart() {
        let err = stored_or_empty(Err(anyhow::anyhow!("connection reset"))).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
