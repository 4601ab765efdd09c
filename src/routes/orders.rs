//! Customer order endpoints

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use sqlx::PgPool;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::orders::{
    CancelOrderRequest, CreateOrderRequest, OrderListQuery, OrderProgress, OrderStatus,
    OrderTrackingEvent,
};
use crate::error::ApiError;
use crate::services::orders::{self as order_service, Actor, OrderRow};

const TRACKING_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// POST /orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = order_service::place_order(
        &state,
        auth.user_id,
        req.vendor_id,
        &req.items,
        req.notes.as_deref(),
    )
    .await?;

    Ok(Created(order))
}

/// GET /orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<OrderListQuery>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let status = query.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE customer_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(auth.user_id)
    .bind(status)
    .fetch_one(&state.db)
    .await?;

    let sql = format!(
        r#"{}
        WHERE o.customer_id = $1 AND ($2::text IS NULL OR o.status = $2)
        ORDER BY o.created_at DESC
        LIMIT $3 OFFSET $4
        "#,
        order_service::order_select()
    );
    let rows: Vec<OrderRow> = sqlx::query_as(&sql)
        .bind(auth.user_id)
        .bind(status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.db)
        .await?;

    let data = order_service::attach_items(&state.db, rows).await?;
    Ok(Paginated::new(data, &pagination, total))
}

async fn own_order(state: &AppState, customer_id: Uuid, order_id: Uuid) -> Result<OrderRow, ApiError> {
    order_service::load_order(&state.db, order_id)
        .await?
        .filter(|o| o.customer_id == customer_id)
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

/// GET /orders/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let row = own_order(&state, auth.user_id, order_id).await?;
    let order = order_service::order_response(&state.db, row).await?;
    Ok(Json(DataResponse::new(order)))
}

/// POST /orders/:order_id/cancel
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    auth: RequireAuth,
    Json(req): Json<CancelOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = order_service::change_status(
        &state,
        order_id,
        Actor::Customer(auth.user_id),
        OrderStatus::Cancelled,
        req.reason.as_deref(),
    )
    .await?;

    Ok(Json(DataResponse::new(order)))
}

// ============================================================================
// Live tracking
// ============================================================================

/// Event to emit for the latest snapshot: an update when anything changed
/// since the previous poll, a heartbeat otherwise.
fn tracking_event(
    order_id: Uuid,
    previous: Option<&OrderProgress>,
    current: &OrderProgress,
    now: DateTime<Utc>,
) -> OrderTrackingEvent {
    if previous == Some(current) {
        OrderTrackingEvent::Heartbeat { timestamp: now }
    } else {
        OrderTrackingEvent::OrderUpdate {
            order_id,
            progress: current.clone(),
        }
    }
}

fn to_sse(event: &OrderTrackingEvent) -> Event {
    let name = match event {
        OrderTrackingEvent::OrderUpdate { .. } => "order_update",
        OrderTrackingEvent::Heartbeat { .. } => "heartbeat",
    };
    Event::default()
        .event(name)
        .data(serde_json::to_string(event).unwrap_or_default())
}

fn is_finished(progress: &OrderProgress) -> bool {
    progress
        .status
        .parse::<OrderStatus>()
        .map(|s| s.is_terminal())
        .unwrap_or(true)
}

struct Tracker {
    db: PgPool,
    order_id: Uuid,
    last: Option<OrderProgress>,
    finished: bool,
}

/// GET /orders/:order_id/stream
///
/// Server-sent events for one order until it completes or is cancelled.
pub async fn stream_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    own_order(&state, auth.user_id, order_id).await?;

    let tracker = Tracker {
        db: state.db.clone(),
        order_id,
        last: None,
        finished: false,
    };

    let stream = stream::unfold(tracker, |mut tracker| async move {
        if tracker.finished {
            return None;
        }
        if tracker.last.is_some() {
            tokio::time::sleep(TRACKING_POLL_INTERVAL).await;
        }

        let progress: OrderProgress = match sqlx::query_as(
            "SELECT status, payment_status, queue_position, estimated_ready_at FROM orders WHERE id = $1",
        )
        .bind(tracker.order_id)
        .fetch_optional(&tracker.db)
        .await
        {
            Ok(Some(progress)) => progress,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(order_id = %tracker.order_id, error = %e, "Order tracking poll failed");
                return None;
            }
        };

        let event = tracking_event(tracker.order_id, tracker.last.as_ref(), &progress, Utc::now());
        tracker.finished = is_finished(&progress);
        tracker.last = Some(progress);

        Some((Ok::<_, Infallible>(to_sse(&event)), tracker))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(status: &str, position: Option<i32>) -> OrderProgress {
        OrderProgress {
            status: status.to_string(),
            payment_status: "paid".to_string(),
            queue_position: position,
            estimated_ready_at: None,
        }
    }

    #[test]
    fn emits_update_only_on_change() {
        let order_id = Uuid::new_v4();
        let first = progress("pending", Some(2));

        let event = tracking_event(order_id, None, &first, Utc::now());
        assert!(matches!(event, OrderTrackingEvent::OrderUpdate { .. }));

        let event = tracking_event(order_id, Some(&first), &first.clone(), Utc::now());
        assert!(matches!(event, OrderTrackingEvent::Heartbeat { .. }));

        let moved = progress("pending", Some(1));
        let event = tracking_event(order_id, Some(&first), &moved, Utc::now());
        assert!(matches!(event, OrderTrackingEvent::OrderUpdate { .. }));
    }

    #[test]
    fn update_payload_is_flat() {
        let order_id = Uuid::new_v4();
        let event = tracking_event(order_id, None, &progress("ready", Some(1)), Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order_update");
        assert_eq!(json["status"], "ready");
        assert_eq!(json["queue_position"], 1);
    }

    #[test]
    fn stream_ends_on_terminal_status() {
        assert!(!is_finished(&progress("preparing", Some(1))));
        assert!(is_finished(&progress("completed", None)));
        assert!(is_finished(&progress("cancelled", None)));
    }
}
