//! Payment capture, escrow distribution and refunds.
//!
//! A captured payment creates one `held` distribution per order. It is
//! released when the order completes and marked refunded when the money goes
//! back to the customer.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::orders::{OrderStatus, PaymentStatus};
use crate::domain::payments::{
    from_paise, receipt_for, split_payment, to_paise, CreatePaymentOrderResponse,
    DistributionStatus, FeeSplit, RefundResponse, VerifyPaymentRequest,
};
use crate::error::ApiError;
use crate::services::orders::{self, Actor, OrderRow};
use crate::services::{notifications, signature};

async fn customer_order(state: &AppState, customer_id: Uuid, order_id: Uuid) -> Result<OrderRow, ApiError> {
    orders::load_order(&state.db, order_id)
        .await?
        .filter(|o| o.customer_id == customer_id)
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

fn order_amount_paise(row: &OrderRow) -> Result<i64, ApiError> {
    to_paise(row.total_amount)
        .filter(|p| *p > 0)
        .ok_or_else(|| ApiError::internal(format!("Order {} has an invalid total", row.id)))
}

/// Create (or reuse) the gateway order the checkout widget pays against.
#[instrument(skip(state))]
pub async fn create_payment_order(
    state: &AppState,
    customer_id: Uuid,
    order_id: Uuid,
) -> Result<CreatePaymentOrderResponse, ApiError> {
    let row = customer_order(state, customer_id, order_id).await?;

    if row.status()? == OrderStatus::Cancelled {
        return Err(ApiError::conflict("Cancelled orders cannot be paid"));
    }
    if !matches!(row.payment_status()?, PaymentStatus::Pending | PaymentStatus::Failed) {
        return Err(ApiError::conflict("Order is already paid"));
    }

    let amount = order_amount_paise(&row)?;
    let currency = state.settings.payment_currency.clone();

    let response = |razorpay_order_id: String| CreatePaymentOrderResponse {
        order_id,
        bill_number: row.bill_number,
        key_id: state.razorpay.key_id().to_string(),
        razorpay_order_id,
        amount,
        currency: currency.clone(),
    };

    if let Some(existing) = &row.razorpay_order_id {
        return Ok(response(existing.clone()));
    }

    let gateway_order = state
        .razorpay
        .create_order(
            amount,
            &currency,
            &receipt_for(row.bill_number, order_id),
            serde_json::json!({
                "order_id": order_id,
                "vendor_id": row.vendor_id,
                "bill_number": row.bill_number,
            }),
        )
        .await?;

    let stored = sqlx::query(
        "UPDATE orders SET razorpay_order_id = $2, updated_at = NOW() WHERE id = $1 AND razorpay_order_id IS NULL",
    )
    .bind(order_id)
    .bind(&gateway_order.id)
    .execute(&state.db)
    .await?
    .rows_affected();

    if stored == 0 {
        // A concurrent request stored its gateway order first
        let current: Option<String> =
            sqlx::query_scalar("SELECT razorpay_order_id FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_one(&state.db)
                .await?;
        if let Some(current) = current {
            return Ok(response(current));
        }
    }

    info!(
        order_id = %order_id,
        razorpay_order_id = %gateway_order.id,
        amount,
        "Payment order created"
    );

    Ok(response(gateway_order.id))
}

/// Verify a checkout callback and record the capture.
#[instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn verify_payment(
    state: &AppState,
    customer_id: Uuid,
    req: &VerifyPaymentRequest,
) -> Result<OrderRow, ApiError> {
    let row = customer_order(state, customer_id, req.order_id).await?;

    if row.razorpay_order_id.as_deref() != Some(req.razorpay_order_id.as_str()) {
        return Err(ApiError::bad_request("Payment does not belong to this order"));
    }

    if !signature::verify_payment_signature(
        &state.settings.razorpay_key_secret,
        &req.razorpay_order_id,
        &req.razorpay_payment_id,
        &req.razorpay_signature,
    ) {
        warn!(razorpay_payment_id = %req.razorpay_payment_id, "Invalid payment signature");
        return Err(ApiError::bad_request("Invalid payment signature"));
    }

    // The signature proves the ids; the amount is checked against the gateway
    // when it is reachable.
    let expected = order_amount_paise(&row)?;
    match state.razorpay.fetch_payment(&req.razorpay_payment_id).await {
        Ok(payment) if payment.amount != expected => {
            error!(
                expected = %row.total_amount,
                paid = %from_paise(payment.amount),
                "Payment amount does not match order"
            );
            return Err(ApiError::bad_request("Payment amount does not match order"));
        }
        Ok(payment) if payment.status == "failed" => {
            return Err(ApiError::bad_request("Payment failed"));
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not fetch payment from gateway; trusting signature"),
    }

    record_capture(state, req.order_id, &req.razorpay_payment_id).await
}

/// Mark an order paid and open its held distribution. Safe to call more than
/// once for the same payment.
#[instrument(skip(state))]
pub async fn record_capture(
    state: &AppState,
    order_id: Uuid,
    razorpay_payment_id: &str,
) -> Result<OrderRow, ApiError> {
    let mut tx = state.db.begin().await?;
    let capture = apply_capture(
        &mut *tx,
        order_id,
        razorpay_payment_id,
        state.settings.platform_fee_bps,
    )
    .await?;
    tx.commit().await?;

    let (row, split) = match capture {
        Capture::AlreadyCaptured(row) => return Ok(row),
        Capture::Captured { row, split } => (row, split),
    };

    info!(
        order_id = %order_id,
        razorpay_payment_id,
        bill_number = row.bill_number,
        platform_fee_paise = split.platform_fee_paise,
        "Payment captured"
    );

    notifications::notify_payment_received(
        &state.db,
        row.vendor_owner_id,
        order_id,
        row.bill_number,
        row.total_amount,
    )
    .await;

    match row.status()? {
        OrderStatus::Cancelled => {
            // Paid after the order was already cancelled
            if let Err(e) = refund_order(state, order_id, "Order was cancelled before payment completed").await {
                warn!(order_id = %order_id, error = %e, "Refund of late payment failed");
            }
        }
        OrderStatus::Pending => {
            let settings = orders::queue_settings(&state.db, row.vendor_id).await?;
            if settings.auto_accept {
                if let Err(e) =
                    orders::change_status(state, order_id, Actor::System, OrderStatus::Accepted, None).await
                {
                    warn!(order_id = %order_id, error = %e, "Auto-accept failed");
                }
            }
        }
        _ => {}
    }

    orders::load_order(&state.db, order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

#[derive(Debug)]
pub enum Capture {
    /// The order was already paid; nothing was written
    AlreadyCaptured(OrderRow),
    /// The order row as it was before the capture, and the fee split recorded
    Captured { row: OrderRow, split: FeeSplit },
}

/// Capture writes, run inside the caller's transaction.
pub async fn apply_capture(
    conn: &mut PgConnection,
    order_id: Uuid,
    razorpay_payment_id: &str,
    platform_fee_bps: u32,
) -> Result<Capture, ApiError> {
    let locked = format!("{} WHERE o.id = $1 FOR UPDATE OF o", orders::order_select());
    let row: OrderRow = sqlx::query_as(&locked)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    if row.payment_status()?.was_captured() {
        return Ok(Capture::AlreadyCaptured(row));
    }

    sqlx::query(
        r#"
        UPDATE orders
        SET payment_status = 'paid', razorpay_payment_id = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .bind(razorpay_payment_id)
    .execute(&mut *conn)
    .await?;

    let split = split_payment(order_amount_paise(&row)?, platform_fee_bps);

    sqlx::query(
        r#"
        INSERT INTO payment_distributions
            (order_id, vendor_id, razorpay_payment_id, total_amount, platform_fee, vendor_amount, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (order_id) DO NOTHING
        "#,
    )
    .bind(order_id)
    .bind(row.vendor_id)
    .bind(razorpay_payment_id)
    .bind(from_paise(split.total_paise))
    .bind(from_paise(split.platform_fee_paise))
    .bind(from_paise(split.vendor_amount_paise))
    .bind(DistributionStatus::Held.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(Capture::Captured { row, split })
}

/// Record a failed payment attempt unless the order was already paid.
pub async fn record_failure(state: &AppState, razorpay_order_id: &str) -> Result<(), ApiError> {
    let failed: Option<(Uuid, Uuid, i32)> = sqlx::query_as(
        r#"
        UPDATE orders
        SET payment_status = 'failed', updated_at = NOW()
        WHERE razorpay_order_id = $1 AND payment_status IN ('pending', 'failed')
        RETURNING id, customer_id, bill_number
        "#,
    )
    .bind(razorpay_order_id)
    .fetch_optional(&state.db)
    .await?;

    if let Some((order_id, customer_id, bill_number)) = failed {
        info!(order_id = %order_id, razorpay_order_id, "Payment failed");
        notifications::notify_payment_failed(&state.db, customer_id, order_id, bill_number).await;
    }
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct RefundClaim {
    razorpay_payment_id: Option<String>,
    total_amount: Decimal,
    customer_id: Uuid,
    bill_number: i32,
}

/// Move a paid order to `refunding`. Only one caller can win the claim;
/// everyone else gets a conflict.
pub async fn claim_refund<'e, E: PgExecutor<'e>>(
    executor: E,
    order_id: Uuid,
) -> Result<RefundClaim, ApiError> {
    sqlx::query_as(
        r#"
        UPDATE orders
        SET payment_status = 'refunding', updated_at = NOW()
        WHERE id = $1 AND payment_status IN ('paid', 'refund_failed')
        RETURNING razorpay_payment_id, total_amount, customer_id, bill_number
        "#,
    )
    .bind(order_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| ApiError::conflict("Order is not eligible for a refund"))
}

/// Refund a captured order in full.
///
/// The order is claimed by moving it to `refunding`, so concurrent callers
/// cannot issue a second refund. Gateway failures leave it `refund_failed`.
#[instrument(skip(state))]
pub async fn refund_order(
    state: &AppState,
    order_id: Uuid,
    reason: &str,
) -> Result<RefundResponse, ApiError> {
    let claim = claim_refund(&state.db, order_id).await?;

    let refund = match (&claim.razorpay_payment_id, to_paise(claim.total_amount)) {
        (Some(payment_id), Some(amount)) => state
            .razorpay
            .refund_payment(
                payment_id,
                Some(amount),
                serde_json::json!({ "order_id": order_id, "reason": reason }),
            )
            .await
            .map_err(ApiError::from),
        _ => Err(ApiError::internal("Paid order has no refundable payment")),
    };

    match refund {
        Ok(refund) => {
            let mut tx = state.db.begin().await?;
            sqlx::query(
                r#"
                UPDATE orders
                SET payment_status = 'refunded', refund_id = $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(order_id)
            .bind(&refund.id)
            .execute(&mut *tx)
            .await?;
            mark_distribution_refunded(&mut *tx, order_id).await?;
            tx.commit().await?;

            info!(order_id = %order_id, refund_id = %refund.id, "Refund issued");
            notifications::notify_refund(
                &state.db,
                claim.customer_id,
                order_id,
                claim.bill_number,
                claim.total_amount,
                true,
            )
            .await;

            Ok(RefundResponse {
                order_id,
                refund_id: Some(refund.id),
                payment_status: PaymentStatus::Refunded,
            })
        }
        Err(e) => {
            sqlx::query(
                r#"
                UPDATE orders
                SET payment_status = 'refund_failed', updated_at = NOW()
                WHERE id = $1 AND payment_status = 'refunding'
                "#,
            )
            .bind(order_id)
            .execute(&state.db)
            .await?;

            error!(order_id = %order_id, error = %e, "Refund failed");
            notifications::notify_refund(
                &state.db,
                claim.customer_id,
                order_id,
                claim.bill_number,
                claim.total_amount,
                false,
            )
            .await;

            Err(e)
        }
    }
}

/// Apply a refund reported by the gateway (dashboard refunds included).
pub async fn record_refund_processed(
    state: &AppState,
    razorpay_payment_id: &str,
    refund_id: &str,
) -> Result<(), ApiError> {
    let mut tx = state.db.begin().await?;

    let order_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE orders
        SET payment_status = 'refunded', refund_id = COALESCE(refund_id, $2), updated_at = NOW()
        WHERE razorpay_payment_id = $1 AND payment_status <> 'refunded'
        RETURNING id
        "#,
    )
    .bind(razorpay_payment_id)
    .bind(refund_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(order_id) = order_id {
        mark_distribution_refunded(&mut *tx, order_id).await?;
        info!(order_id = %order_id, refund_id, "Refund confirmed by gateway");
    }

    tx.commit().await?;
    Ok(())
}

pub async fn mark_distribution_refunded(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payment_distributions
        SET status = $2, updated_at = NOW()
        WHERE order_id = $1 AND status <> $2
        "#,
    )
    .bind(order_id)
    .bind(DistributionStatus::Refunded.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support as fx;
    use sqlx::PgPool;

    async fn paid_order(pool: &PgPool) -> (fx::Vendor, Uuid) {
        let vendor = fx::vendor(pool, "Dosa Corner").await;
        let item = fx::menu_item(pool, vendor.id, "120.00", None).await;
        let customer = fx::customer(pool).await;
        let placed = fx::place(pool, customer, vendor.id, item, 1).await;

        let mut tx = pool.begin().await.unwrap();
        apply_capture(&mut *tx, placed.order_id, "pay_test_1", 500)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        (vendor, placed.order_id)
    }

    async fn distribution(pool: &PgPool, order_id: Uuid) -> (String, Decimal, Decimal) {
        sqlx::query_as(
            "SELECT status, platform_fee, vendor_amount FROM payment_distributions WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn payment_status(pool: &PgPool, order_id: Uuid) -> String {
        sqlx::query_scalar("SELECT payment_status FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn capture_holds_the_split(pool: PgPool) {
        let (_, order_id) = paid_order(&pool).await;

        assert_eq!(payment_status(&pool, order_id).await, "paid");
        let (status, fee, vendor_amount) = distribution(&pool, order_id).await;
        assert_eq!(status, "held");
        assert_eq!(fee, "6.00".parse::<Decimal>().unwrap());
        assert_eq!(vendor_amount, "114.00".parse::<Decimal>().unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn repeated_capture_writes_nothing(pool: PgPool) {
        let (_, order_id) = paid_order(&pool).await;

        let mut tx = pool.begin().await.unwrap();
        let again = apply_capture(&mut *tx, order_id, "pay_test_2", 500)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(again, Capture::AlreadyCaptured(_)));
        let payment_id: Option<String> =
            sqlx::query_scalar("SELECT razorpay_payment_id FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(payment_id.as_deref(), Some("pay_test_1"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn completion_releases_the_held_payout(pool: PgPool) {
        let (vendor, order_id) = paid_order(&pool).await;

        fx::complete(&pool, order_id, vendor.id).await;

        let (status, _, _) = distribution(&pool, order_id).await;
        assert_eq!(status, "released");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn only_one_refund_claim_wins(pool: PgPool) {
        let (_, order_id) = paid_order(&pool).await;

        let claim = claim_refund(&pool, order_id).await.unwrap();
        assert_eq!(claim.razorpay_payment_id.as_deref(), Some("pay_test_1"));
        assert_eq!(claim.total_amount, "120.00".parse::<Decimal>().unwrap());
        assert_eq!(payment_status(&pool, order_id).await, "refunding");

        let second = claim_refund(&pool, order_id).await;
        assert!(matches!(second, Err(ApiError::Conflict(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unpaid_orders_cannot_be_claimed(pool: PgPool) {
        let vendor = fx::vendor(&pool, "Dosa Corner").await;
        let item = fx::menu_item(&pool, vendor.id, "120.00", None).await;
        let customer = fx::customer(&pool).await;
        let placed = fx::place(&pool, customer, vendor.id, item, 1).await;

        let claim = claim_refund(&pool, placed.order_id).await;
        assert!(matches!(claim, Err(ApiError::Conflict(_))));
        assert_eq!(payment_status(&pool, placed.order_id).await, "pending");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn refunded_payout_is_marked(pool: PgPool) {
        let (_, order_id) = paid_order(&pool).await;

        claim_refund(&pool, order_id).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        mark_distribution_refunded(&mut *conn, order_id).await.unwrap();

        let (status, _, _) = distribution(&pool, order_id).await;
        assert_eq!(status, "refunded");
    }
}
