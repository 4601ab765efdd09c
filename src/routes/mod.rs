pub mod auth;
pub mod cart;
pub mod health;
pub mod me;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod vendor_dashboard;
pub mod vendor_menu;
pub mod vendors;
pub mod webhooks;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        .route("/webhooks/razorpay", post(webhooks::razorpay_webhook))
        // Auth
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/signin", post(auth::sign_in))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/signout", post(auth::sign_out))
        .route("/auth/session", get(auth::get_session))
        // Protected routes
        .route("/me", get(me::get_me).put(me::update_me))
        // Storefront
        .route("/vendors", get(vendors::list_vendors))
        .route("/vendors/:vendor_id", get(vendors::get_vendor))
        .route("/vendors/:vendor_id/menu", get(vendors::get_vendor_menu))
        // Cart
        .route("/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/items", put(cart::set_cart_item))
        .route("/cart/checkout", post(cart::checkout))
        // Customer orders
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:order_id", get(orders::get_order))
        .route("/orders/:order_id/cancel", post(orders::cancel_order))
        .route("/orders/:order_id/stream", get(orders::stream_order))
        // Vendor menu and inventory
        .route(
            "/vendor/menu",
            get(vendor_menu::list_menu).post(vendor_menu::create_menu_item),
        )
        .route(
            "/vendor/menu/:item_id",
            put(vendor_menu::update_menu_item).delete(vendor_menu::delete_menu_item),
        )
        .route(
            "/vendor/menu/:item_id/availability",
            patch(vendor_menu::update_availability),
        )
        .route("/vendor/menu/:item_id/stock", patch(vendor_menu::update_stock))
        .route("/vendor/inventory", get(vendor_menu::low_stock))
        // Vendor dashboard
        .route(
            "/vendor/profile",
            get(vendor_dashboard::get_profile).put(vendor_dashboard::update_profile),
        )
        .route("/vendor/stats", get(vendor_dashboard::get_stats))
        .route("/vendor/queue", get(vendor_dashboard::get_queue))
        .route(
            "/vendor/queue-settings",
            get(vendor_dashboard::get_queue_settings).put(vendor_dashboard::update_queue_settings),
        )
        .route("/vendor/orders", get(vendor_dashboard::list_orders))
        .route("/vendor/orders/:order_id", get(vendor_dashboard::get_order))
        .route(
            "/vendor/orders/:order_id/status",
            patch(vendor_dashboard::update_order_status),
        )
        // Payments
        .route("/payments/orders", post(payments::create_payment_order))
        .route("/payments/orders/:order_id", get(payments::get_payment_status))
        .route("/payments/verify", post(payments::verify_payment))
        .route("/payments/refund", post(payments::refund))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/unread-count",
            get(notifications::get_unread_count),
        )
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route(
            "/notifications/:id/read",
            put(notifications::mark_notification_read),
        )
        .route("/notifications/:id", delete(notifications::delete_notification))
}
