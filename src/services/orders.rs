//! Order placement and lifecycle.
//!
//! Every write that touches a vendor's queue first locks that vendor's row,
//! so bill numbers and queue positions are assigned and renumbered one
//! transaction at a time per vendor.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool};
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::orders::{
    normalize_lines, price_lines, validate_notes, OrderItemResponse, OrderLineRequest,
    OrderResponse, OrderStatus, OrderableItem, PaymentStatus,
};
use crate::domain::payments::DistributionStatus;
use crate::domain::queue::{
    estimate_wait_minutes, estimated_ready_at, QueueSettings, DEFAULT_AVG_PREPARATION_MINUTES,
};
use crate::error::ApiError;
use crate::services::cache::keys;
use crate::services::{notifications, payments};

/// Statuses that hold a queue position, as a SQL list
pub const ACTIVE_STATUSES_SQL: &str = "('pending', 'accepted', 'preparing', 'ready')";

/// Base query for a full order row; callers append WHERE / ORDER BY clauses.
pub fn order_select() -> String {
    format!(
        r#"
        SELECT o.id, o.vendor_id, v.name AS vendor_name, v.owner_id AS vendor_owner_id,
               o.customer_id, o.bill_number, o.queue_position, o.status, o.payment_status,
               o.total_amount, o.notes, o.razorpay_order_id, o.razorpay_payment_id,
               o.refund_id, o.cancellation_reason, o.estimated_ready_at,
               COALESCE(qs.avg_preparation_minutes, {}) AS avg_preparation_minutes,
               o.created_at, o.updated_at
        FROM orders o
        JOIN vendors v ON v.id = o.vendor_id
        LEFT JOIN queue_settings qs ON qs.vendor_id = o.vendor_id
        "#,
        DEFAULT_AVG_PREPARATION_MINUTES
    )
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub vendor_owner_id: Uuid,
    pub customer_id: Uuid,
    pub bill_number: i32,
    pub queue_position: Option<i32>,
    pub status: String,
    pub payment_status: String,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub refund_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub estimated_ready_at: Option<DateTime<Utc>>,
    pub avg_preparation_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn status(&self) -> Result<OrderStatus, ApiError> {
        self.status.parse().map_err(ApiError::internal)
    }

    pub fn payment_status(&self) -> Result<PaymentStatus, ApiError> {
        self.payment_status.parse().map_err(ApiError::internal)
    }

    pub fn into_response(self, items: Vec<OrderItemResponse>) -> Result<OrderResponse, ApiError> {
        let status = self.status()?;
        let payment_status = self.payment_status()?;
        let estimated_wait_minutes = self
            .queue_position
            .filter(|_| status.is_active())
            .map(|p| estimate_wait_minutes(p, self.avg_preparation_minutes));

        Ok(OrderResponse {
            id: self.id,
            vendor_id: self.vendor_id,
            vendor_name: self.vendor_name,
            customer_id: self.customer_id,
            bill_number: self.bill_number,
            queue_position: self.queue_position,
            status,
            payment_status,
            total_amount: self.total_amount,
            notes: self.notes,
            items,
            estimated_ready_at: self.estimated_ready_at,
            estimated_wait_minutes,
            cancellation_reason: self.cancellation_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Who is changing an order's status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(Uuid),
    Vendor(Uuid),
    /// Automatic transitions such as auto-accept after payment
    System,
}

#[derive(Debug, sqlx::FromRow)]
struct VendorGate {
    owner_id: Uuid,
    name: String,
    is_open: bool,
    accepting_orders: bool,
}

pub async fn queue_settings<'e, E: PgExecutor<'e>>(
    executor: E,
    vendor_id: Uuid,
) -> Result<QueueSettings, sqlx::Error> {
    let settings: Option<QueueSettings> = sqlx::query_as(
        r#"
        SELECT vendor_id, max_active_orders, avg_preparation_minutes, auto_accept, updated_at
        FROM queue_settings
        WHERE vendor_id = $1
        "#,
    )
    .bind(vendor_id)
    .fetch_optional(executor)
    .await?;

    Ok(settings.unwrap_or_else(|| QueueSettings::defaults_for(vendor_id)))
}

pub async fn load_order(db: &PgPool, order_id: Uuid) -> Result<Option<OrderRow>, sqlx::Error> {
    let sql = format!("{} WHERE o.id = $1", order_select());
    sqlx::query_as(&sql)
        .bind(order_id)
        .fetch_optional(db)
        .await
}

/// Load the items of every row and build full responses, keeping row order.
pub async fn attach_items(db: &PgPool, rows: Vec<OrderRow>) -> Result<Vec<OrderResponse>, ApiError> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let items: Vec<OrderItemResponse> = sqlx::query_as(
        r#"
        SELECT id, order_id, menu_item_id, name, unit_price, quantity, line_total
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY name
        "#,
    )
    .bind(&ids)
    .fetch_all(db)
    .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderItemResponse>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    rows.into_iter()
        .map(|row| {
            let items = by_order.remove(&row.id).unwrap_or_default();
            row.into_response(items)
        })
        .collect()
}

pub async fn order_response(db: &PgPool, row: OrderRow) -> Result<OrderResponse, ApiError> {
    attach_items(db, vec![row])
        .await?
        .pop()
        .ok_or_else(|| ApiError::internal("Order disappeared while loading items"))
}

async fn invalidate_menu(state: &AppState, vendor_id: Uuid) {
    if let Err(e) = state
        .cache
        .delete_pattern(&keys::vendor_menu_pattern(vendor_id))
        .await
    {
        warn!(vendor_id = %vendor_id, error = %e, "Failed to invalidate menu cache");
    }
}

// ============================================================================
// Placement
// ============================================================================

/// What a committed placement produced
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub vendor_owner_id: Uuid,
    pub bill_number: i32,
    pub queue_position: i32,
    pub total: Decimal,
    pub item_count: i32,
}

/// Place an order for `customer_id`. Assigns the next bill number and the
/// tail queue position, snapshots prices and decrements tracked stock.
#[instrument(skip(state, lines, notes), fields(customer_id = %customer_id, vendor_id = %vendor_id))]
pub async fn place_order(
    state: &AppState,
    customer_id: Uuid,
    vendor_id: Uuid,
    lines: &[OrderLineRequest],
    notes: Option<&str>,
) -> Result<OrderResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let placed = insert_order(&mut *tx, customer_id, vendor_id, lines, notes).await?;
    tx.commit().await?;

    info!(
        order_id = %placed.order_id,
        bill_number = placed.bill_number,
        queue_position = placed.queue_position,
        total = %placed.total,
        "Order placed"
    );

    invalidate_menu(state, vendor_id).await;
    notifications::notify_order_placed(
        &state.db,
        placed.vendor_owner_id,
        placed.order_id,
        placed.bill_number,
        placed.total,
        placed.item_count,
    )
    .await;

    let row = load_order(&state.db, placed.order_id)
        .await?
        .ok_or_else(|| ApiError::internal("Placed order not found"))?;
    order_response(&state.db, row).await
}

/// Placement writes, run inside the caller's transaction.
pub async fn insert_order(
    conn: &mut PgConnection,
    customer_id: Uuid,
    vendor_id: Uuid,
    lines: &[OrderLineRequest],
    notes: Option<&str>,
) -> Result<PlacedOrder, ApiError> {
    let lines = normalize_lines(lines)?;
    let notes = validate_notes(notes)?;

    let vendor: VendorGate = sqlx::query_as(
        "SELECT owner_id, name, is_open, accepting_orders FROM vendors WHERE id = $1 FOR UPDATE",
    )
    .bind(vendor_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Vendor not found"))?;

    if !vendor.is_open {
        return Err(ApiError::conflict(format!("{} is closed right now", vendor.name)));
    }
    if !vendor.accepting_orders {
        return Err(ApiError::conflict(format!(
            "{} is not accepting orders right now",
            vendor.name
        )));
    }

    let settings = queue_settings(&mut *conn, vendor_id).await?;

    let (active_orders, last_position): (i64, Option<i32>) = sqlx::query_as(&format!(
        "SELECT COUNT(*), MAX(queue_position) FROM orders WHERE vendor_id = $1 AND status IN {}",
        ACTIVE_STATUSES_SQL
    ))
    .bind(vendor_id)
    .fetch_one(&mut *conn)
    .await?;

    if !settings.has_capacity(active_orders) {
        return Err(ApiError::conflict(
            "The vendor's queue is full. Please try again shortly",
        ));
    }

    let item_ids: Vec<Uuid> = lines.iter().map(|l| l.menu_item_id).collect();
    let items: Vec<OrderableItem> = sqlx::query_as(
        r#"
        SELECT id, vendor_id, name, price, is_available, stock_quantity
        FROM menu_items
        WHERE id = ANY($1)
        FOR UPDATE
        "#,
    )
    .bind(&item_ids)
    .fetch_all(&mut *conn)
    .await?;

    let (priced, total) = price_lines(vendor_id, &lines, &items)?;

    let bill_number: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(bill_number), 0) + 1 FROM orders WHERE vendor_id = $1",
    )
    .bind(vendor_id)
    .fetch_one(&mut *conn)
    .await?;

    let queue_position = last_position.unwrap_or(0) + 1;
    let order_id = Uuid::new_v4();
    let ready_at = estimated_ready_at(Utc::now(), queue_position, settings.avg_preparation_minutes);

    sqlx::query(
        r#"
        INSERT INTO orders (id, vendor_id, customer_id, bill_number, queue_position, status,
                            payment_status, total_amount, notes, estimated_ready_at)
        VALUES ($1, $2, $3, $4, $5, 'pending', 'pending', $6, $7, $8)
        "#,
    )
    .bind(order_id)
    .bind(vendor_id)
    .bind(customer_id)
    .bind(bill_number)
    .bind(queue_position)
    .bind(total)
    .bind(&notes)
    .bind(ready_at)
    .execute(&mut *conn)
    .await?;

    for line in &priced {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, menu_item_id, name, unit_price, quantity, line_total)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order_id)
        .bind(line.menu_item_id)
        .bind(&line.name)
        .bind(line.unit_price)
        .bind(line.quantity)
        .bind(line.line_total)
        .execute(&mut *conn)
        .await?;

        // Untracked items (NULL stock) are left alone
        sqlx::query(
            r#"
            UPDATE menu_items
            SET stock_quantity = stock_quantity - $2,
                is_available = CASE WHEN stock_quantity - $2 <= 0 THEN FALSE ELSE is_available END,
                updated_at = NOW()
            WHERE id = $1 AND stock_quantity IS NOT NULL
            "#,
        )
        .bind(line.menu_item_id)
        .bind(line.quantity)
        .execute(&mut *conn)
        .await?;
    }

    Ok(PlacedOrder {
        order_id,
        vendor_owner_id: vendor.owner_id,
        bill_number,
        queue_position,
        total,
        item_count: priced.iter().map(|l| l.quantity).sum(),
    })
}

// ============================================================================
// Status changes
// ============================================================================

fn authorize(actor: Actor, row: &OrderRow, current: OrderStatus, next: OrderStatus) -> Result<(), ApiError> {
    match actor {
        Actor::Customer(user_id) => {
            if row.customer_id != user_id {
                return Err(ApiError::not_found("Order not found"));
            }
            if next != OrderStatus::Cancelled {
                return Err(ApiError::forbidden("Customers can only cancel orders"));
            }
            if current != OrderStatus::Pending {
                return Err(ApiError::conflict(
                    "Orders can only be cancelled before the vendor accepts them",
                ));
            }
        }
        Actor::Vendor(vendor_id) => {
            if row.vendor_id != vendor_id {
                return Err(ApiError::not_found("Order not found"));
            }
        }
        Actor::System => {}
    }
    Ok(())
}

/// A committed status change, with the order as it was before it
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub before: OrderRow,
    pub from: OrderStatus,
    pub reason: Option<String>,
}

/// Move an order to `next`, releasing its queue slot when it leaves the
/// queue. Cancelling a paid order triggers a refund after commit; a failed
/// refund is recorded on the order as `refund_failed`.
#[instrument(skip(state, reason), fields(order_id = %order_id, next = %next))]
pub async fn change_status(
    state: &AppState,
    order_id: Uuid,
    actor: Actor,
    next: OrderStatus,
    reason: Option<&str>,
) -> Result<OrderResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let change = apply_status(&mut *tx, order_id, actor, next, reason).await?;
    tx.commit().await?;

    let row = &change.before;
    info!(
        vendor_id = %row.vendor_id,
        bill_number = row.bill_number,
        from = %change.from,
        to = %next,
        actor = ?actor,
        "Order status changed"
    );

    if next == OrderStatus::Cancelled {
        invalidate_menu(state, row.vendor_id).await;
    }

    match actor {
        Actor::Customer(_) => {
            if next == OrderStatus::Cancelled {
                notifications::notify_order_cancelled_by_customer(
                    &state.db,
                    row.vendor_owner_id,
                    order_id,
                    row.bill_number,
                    change.reason.as_deref(),
                )
                .await;
            }
        }
        Actor::Vendor(_) | Actor::System => {
            notifications::notify_order_status(
                &state.db,
                row.customer_id,
                order_id,
                row.bill_number,
                &row.vendor_name,
                next,
                change.reason.as_deref(),
            )
            .await;
        }
    }

    if next == OrderStatus::Cancelled && row.payment_status()?.is_refundable() {
        let refund_reason = change.reason.as_deref().unwrap_or("Order cancelled");
        if let Err(e) = payments::refund_order(state, order_id, refund_reason).await {
            warn!(order_id = %order_id, error = %e, "Refund after cancellation failed");
        }
    }

    let row = load_order(&state.db, order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    order_response(&state.db, row).await
}

/// Status change writes, run inside the caller's transaction: the order row,
/// queue renumbering, stock restore on cancel and escrow release on completion.
pub async fn apply_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    actor: Actor,
    next: OrderStatus,
    reason: Option<&str>,
) -> Result<StatusChange, ApiError> {
    let reason = validate_notes(reason)?;

    let vendor_id: Uuid = sqlx::query_scalar("SELECT vendor_id FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    sqlx::query("SELECT id FROM vendors WHERE id = $1 FOR UPDATE")
        .bind(vendor_id)
        .execute(&mut *conn)
        .await?;

    let locked = format!("{} WHERE o.id = $1 FOR UPDATE OF o", order_select());
    let row: OrderRow = sqlx::query_as(&locked)
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await?;

    let current = row.status()?;
    authorize(actor, &row, current, next)?;

    if !current.can_transition_to(next) {
        return Err(ApiError::conflict(format!(
            "Cannot change order from {} to {}",
            current, next
        )));
    }

    let leaves_queue = next.is_terminal();
    let ready_at = match (next, row.queue_position) {
        (OrderStatus::Accepted, Some(position)) => Some(estimated_ready_at(
            Utc::now(),
            position,
            row.avg_preparation_minutes,
        )),
        _ => row.estimated_ready_at,
    };
    let cancellation_reason = if next == OrderStatus::Cancelled {
        reason.clone()
    } else {
        None
    };

    sqlx::query(
        r#"
        UPDATE orders
        SET status = $2,
            queue_position = CASE WHEN $3 THEN NULL ELSE queue_position END,
            estimated_ready_at = $4,
            cancellation_reason = COALESCE($5, cancellation_reason),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .bind(next.as_str())
    .bind(leaves_queue)
    .bind(ready_at)
    .bind(&cancellation_reason)
    .execute(&mut *conn)
    .await?;

    if let (true, Some(position)) = (leaves_queue, row.queue_position) {
        let shifted = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET queue_position = queue_position - 1, updated_at = NOW()
            WHERE vendor_id = $1 AND queue_position > $2 AND status IN {}
            "#,
            ACTIVE_STATUSES_SQL
        ))
        .bind(vendor_id)
        .bind(position)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        tracing::debug!(vendor_id = %vendor_id, released = position, shifted, "Queue renumbered");
    }

    match next {
        OrderStatus::Cancelled => {
            sqlx::query(
                r#"
                UPDATE menu_items m
                SET stock_quantity = m.stock_quantity + oi.quantity,
                    is_available = CASE WHEN m.stock_quantity = 0 THEN TRUE ELSE m.is_available END,
                    updated_at = NOW()
                FROM order_items oi
                WHERE oi.order_id = $1
                  AND oi.menu_item_id = m.id
                  AND m.stock_quantity IS NOT NULL
                "#,
            )
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
        }
        OrderStatus::Completed => {
            sqlx::query(
                r#"
                UPDATE payment_distributions
                SET status = $2, released_at = NOW(), updated_at = NOW()
                WHERE order_id = $1 AND status = $3
                "#,
            )
            .bind(order_id)
            .bind(DistributionStatus::Released.as_str())
            .bind(DistributionStatus::Held.as_str())
            .execute(&mut *conn)
            .await?;
        }
        _ => {}
    }

    Ok(StatusChange {
        before: row,
        from: current,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(customer_id: Uuid, vendor_id: Uuid) -> OrderRow {
        OrderRow {
            id: Uuid::new_v4(),
            vendor_id,
            vendor_name: "Chai Point".to_string(),
            vendor_owner_id: Uuid::new_v4(),
            customer_id,
            bill_number: 7,
            queue_position: Some(3),
            status: "pending".to_string(),
            payment_status: "paid".to_string(),
            total_amount: "120.00".parse().unwrap(),
            notes: None,
            razorpay_order_id: None,
            razorpay_payment_id: None,
            refund_id: None,
            cancellation_reason: None,
            estimated_ready_at: None,
            avg_preparation_minutes: 8,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn customers_may_only_cancel_their_own_pending_orders() {
        let customer = Uuid::new_v4();
        let r = row(customer, Uuid::new_v4());

        assert!(authorize(
            Actor::Customer(customer),
            &r,
            OrderStatus::Pending,
            OrderStatus::Cancelled
        )
        .is_ok());
        assert!(matches!(
            authorize(Actor::Customer(Uuid::new_v4()), &r, OrderStatus::Pending, OrderStatus::Cancelled),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            authorize(Actor::Customer(customer), &r, OrderStatus::Accepted, OrderStatus::Cancelled),
            Err(ApiError::Conflict(_))
        ));
        assert!(matches!(
            authorize(Actor::Customer(customer), &r, OrderStatus::Pending, OrderStatus::Accepted),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn vendors_cannot_touch_other_vendors_orders() {
        let vendor = Uuid::new_v4();
        let r = row(Uuid::new_v4(), vendor);
        assert!(authorize(Actor::Vendor(vendor), &r, OrderStatus::Pending, OrderStatus::Accepted).is_ok());
        assert!(matches!(
            authorize(Actor::Vendor(Uuid::new_v4()), &r, OrderStatus::Pending, OrderStatus::Accepted),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn response_reports_wait_only_while_active() {
        let mut r = row(Uuid::new_v4(), Uuid::new_v4());
        let resp = r.clone().into_response(Vec::new()).unwrap();
        assert_eq!(resp.estimated_wait_minutes, Some(24));
        assert_eq!(resp.payment_status, PaymentStatus::Paid);

        r.status = "completed".to_string();
        r.queue_position = None;
        let resp = r.into_response(Vec::new()).unwrap();
        assert_eq!(resp.estimated_wait_minutes, None);
    }

    #[test]
    fn unknown_status_is_an_internal_error() {
        let mut r = row(Uuid::new_v4(), Uuid::new_v4());
        r.status = "lost".to_string();
        assert!(matches!(r.status(), Err(ApiError::Internal(_))));
    }

    mod db {
        use super::*;
        use crate::services::test_support::{self as fx, Vendor};

        async fn stock_of(pool: &PgPool, item_id: Uuid) -> (Option<i32>, bool) {
            sqlx::query_as("SELECT stock_quantity, is_available FROM menu_items WHERE id = $1")
                .bind(item_id)
                .fetch_one(pool)
                .await
                .unwrap()
        }

        async fn four_orders(pool: &PgPool) -> (Vendor, Vec<PlacedOrder>) {
            let vendor = fx::vendor(pool, "Dosa Corner").await;
            let item = fx::menu_item(pool, vendor.id, "60.00", None).await;
            let customer = fx::customer(pool).await;

            let mut placed = Vec::new();
            for _ in 0..4 {
                placed.push(fx::place(pool, customer, vendor.id, item, 1).await);
            }
            (vendor, placed)
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn bill_numbers_count_up_per_vendor(pool: PgPool) {
            let a = fx::vendor(&pool, "Dosa Corner").await;
            let b = fx::vendor(&pool, "Chai Point").await;
            let a_item = fx::menu_item(&pool, a.id, "60.00", None).await;
            let b_item = fx::menu_item(&pool, b.id, "20.00", None).await;
            let customer = fx::customer(&pool).await;

            let mut bills = Vec::new();
            for _ in 0..3 {
                bills.push(fx::place(&pool, customer, a.id, a_item, 1).await.bill_number);
            }
            let other = fx::place(&pool, customer, b.id, b_item, 2).await;

            assert_eq!(bills, vec![1, 2, 3]);
            assert_eq!(other.bill_number, 1);
            assert_eq!(other.queue_position, 1);
            assert_eq!(other.total, "40.00".parse::<Decimal>().unwrap());
            assert_eq!(
                fx::queue(&pool, a.id).await,
                vec![(1, Some(1)), (2, Some(2)), (3, Some(3))]
            );
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn cancelling_mid_queue_closes_the_gap(pool: PgPool) {
            let (vendor, placed) = four_orders(&pool).await;

            fx::set_status(
                &pool,
                placed[1].order_id,
                Actor::Vendor(vendor.id),
                OrderStatus::Cancelled,
            )
            .await
            .unwrap();

            assert_eq!(
                fx::queue(&pool, vendor.id).await,
                vec![(1, Some(1)), (2, None), (3, Some(2)), (4, Some(3))]
            );
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn completing_the_head_moves_everyone_up(pool: PgPool) {
            let (vendor, placed) = four_orders(&pool).await;

            fx::complete(&pool, placed[0].order_id, vendor.id).await;

            assert_eq!(
                fx::queue(&pool, vendor.id).await,
                vec![(1, None), (2, Some(1)), (3, Some(2)), (4, Some(3))]
            );

            // The next order goes to the tail, after the remaining three
            let item: Uuid = sqlx::query_scalar("SELECT id FROM menu_items WHERE vendor_id = $1")
                .bind(vendor.id)
                .fetch_one(&pool)
                .await
                .unwrap();
            let customer = fx::customer(&pool).await;
            let next = fx::place(&pool, customer, vendor.id, item, 1).await;
            assert_eq!(next.bill_number, 5);
            assert_eq!(next.queue_position, 4);
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn stock_runs_out_and_comes_back_on_cancel(pool: PgPool) {
            let vendor = fx::vendor(&pool, "Dosa Corner").await;
            let item = fx::menu_item(&pool, vendor.id, "60.00", Some(2)).await;
            let customer = fx::customer(&pool).await;

            let placed = fx::place(&pool, customer, vendor.id, item, 2).await;
            assert_eq!(stock_of(&pool, item).await, (Some(0), false));

            let sold_out = fx::try_place(&pool, customer, vendor.id, item, 1).await;
            assert!(sold_out.is_err());

            fx::set_status(
                &pool,
                placed.order_id,
                Actor::Customer(customer),
                OrderStatus::Cancelled,
            )
            .await
            .unwrap();
            assert_eq!(stock_of(&pool, item).await, (Some(2), true));
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn untracked_stock_is_left_alone(pool: PgPool) {
            let vendor = fx::vendor(&pool, "Dosa Corner").await;
            let item = fx::menu_item(&pool, vendor.id, "60.00", None).await;
            let customer = fx::customer(&pool).await;

            fx::place(&pool, customer, vendor.id, item, 5).await;
            assert_eq!(stock_of(&pool, item).await, (None, true));
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn full_queue_rejects_new_orders(pool: PgPool) {
            let vendor = fx::vendor(&pool, "Dosa Corner").await;
            let item = fx::menu_item(&pool, vendor.id, "60.00", None).await;
            let customer = fx::customer(&pool).await;
            sqlx::query(
                "INSERT INTO queue_settings (vendor_id, max_active_orders) VALUES ($1, 1)",
            )
            .bind(vendor.id)
            .execute(&pool)
            .await
            .unwrap();

            fx::place(&pool, customer, vendor.id, item, 1).await;
            let rejected = fx::try_place(&pool, customer, vendor.id, item, 1).await;
            assert!(matches!(rejected, Err(ApiError::Conflict(_))));
            assert_eq!(fx::queue(&pool, vendor.id).await.len(), 1);
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn closed_vendor_takes_no_orders(pool: PgPool) {
            let vendor = fx::vendor(&pool, "Dosa Corner").await;
            let item = fx::menu_item(&pool, vendor.id, "60.00", None).await;
            let customer = fx::customer(&pool).await;
            sqlx::query("UPDATE vendors SET is_open = FALSE WHERE id = $1")
                .bind(vendor.id)
                .execute(&pool)
                .await
                .unwrap();

            let rejected = fx::try_place(&pool, customer, vendor.id, item, 1).await;
            assert!(matches!(rejected, Err(ApiError::Conflict(_))));
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn illegal_transition_changes_nothing(pool: PgPool) {
            let (vendor, placed) = four_orders(&pool).await;

            let skipped = fx::set_status(
                &pool,
                placed[0].order_id,
                Actor::Vendor(vendor.id),
                OrderStatus::Ready,
            )
            .await;
            assert!(matches!(skipped, Err(ApiError::Conflict(_))));

            let status: String = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(placed[0].order_id)
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(status, "pending");
        }
    }
}
