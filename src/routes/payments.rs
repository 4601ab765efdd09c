//! Payment routes: checkout, verification, status and refunds

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::{RequireAuth, RequireVendor};
use crate::domain::orders::{OrderStatus, PaymentStatus};
use crate::domain::payments::{
    CreatePaymentOrderRequest, PaymentDistribution, PaymentStatusResponse, RefundRequest,
    RefundResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::error::ApiError;
use crate::services::orders::{self as order_service, Actor};
use crate::services::payments;

const DEFAULT_REFUND_REASON: &str = "Refund issued by vendor";

/// POST /payments/orders
///
/// Creates the Razorpay order for an unpaid order.
pub async fn create_payment_order(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<CreatePaymentOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = payments::create_payment_order(&state, auth.user_id, req.order_id).await?;
    Ok(Created(response))
}

/// GET /payments/orders/:order_id
///
/// Visible to the ordering customer and the vendor who owns the order.
pub async fn get_payment_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let row = order_service::load_order(&state.db, order_id)
        .await?
        .filter(|o| o.customer_id == auth.user_id || o.vendor_owner_id == auth.user_id)
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    let distribution: Option<PaymentDistribution> = sqlx::query_as(
        r#"
        SELECT id, order_id, vendor_id, razorpay_payment_id, total_amount, platform_fee,
               vendor_amount, status, released_at, created_at
        FROM payment_distributions
        WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(DataResponse::new(PaymentStatusResponse {
        order_id: row.id,
        payment_status: row.payment_status()?,
        total_amount: row.total_amount,
        razorpay_order_id: row.razorpay_order_id,
        razorpay_payment_id: row.razorpay_payment_id,
        refund_id: row.refund_id,
        distribution,
    })))
}

/// POST /payments/verify
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = payments::verify_payment(&state, auth.user_id, &req).await?;

    Ok(Json(DataResponse::new(VerifyPaymentResponse {
        order_id: row.id,
        status: row.status()?,
        payment_status: row.payment_status()?,
        verified: true,
    })))
}

/// Reject refund requests the order's state cannot satisfy.
fn check_refundable(status: OrderStatus, payment_status: PaymentStatus) -> Result<(), ApiError> {
    if status == OrderStatus::Completed {
        return Err(ApiError::conflict("Completed orders cannot be refunded"));
    }
    match payment_status {
        PaymentStatus::Pending | PaymentStatus::Failed => {
            Err(ApiError::bad_request("Order has not been paid"))
        }
        PaymentStatus::Refunding => Err(ApiError::conflict("A refund is already in progress")),
        PaymentStatus::Refunded => Err(ApiError::conflict("Order has already been refunded")),
        PaymentStatus::Paid | PaymentStatus::RefundFailed => Ok(()),
    }
}

/// POST /payments/refund
///
/// Active orders are cancelled first, which refunds them; cancelled orders
/// whose refund failed earlier are retried.
pub async fn refund(
    State(state): State<Arc<AppState>>,
    vendor: RequireVendor,
    Json(req): Json<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = order_service::load_order(&state.db, req.order_id)
        .await?
        .filter(|o| o.vendor_id == vendor.vendor_id)
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    let status = row.status()?;
    check_refundable(status, row.payment_status()?)?;

    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REFUND_REASON);

    if status == OrderStatus::Cancelled {
        let response = payments::refund_order(&state, row.id, reason).await?;
        return Ok(Json(DataResponse::new(response)));
    }

    order_service::change_status(
        &state,
        row.id,
        Actor::Vendor(vendor.vendor_id),
        OrderStatus::Cancelled,
        Some(reason),
    )
    .await?;

    let after = order_service::load_order(&state.db, row.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    let response = refund_outcome(after.id, after.payment_status()?, after.refund_id)?;
    Ok(Json(DataResponse::new(response)))
}

/// Result of cancelling a paid order. The cancellation stands even when the
/// gateway refused the refund; that case is reported the same way a direct
/// refund failure is.
fn refund_outcome(
    order_id: Uuid,
    payment_status: PaymentStatus,
    refund_id: Option<String>,
) -> Result<RefundResponse, ApiError> {
    if payment_status == PaymentStatus::RefundFailed {
        return Err(ApiError::gateway(
            "Order was cancelled but the refund failed; it can be retried",
        ));
    }
    Ok(RefundResponse {
        order_id,
        refund_id,
        payment_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_orders_are_not_refundable() {
        assert!(matches!(
            check_refundable(OrderStatus::Completed, PaymentStatus::Paid),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn unpaid_orders_are_bad_requests() {
        assert!(matches!(
            check_refundable(OrderStatus::Pending, PaymentStatus::Pending),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            check_refundable(OrderStatus::Cancelled, PaymentStatus::Failed),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn refund_failure_after_cancel_is_a_gateway_error() {
        let err = refund_outcome(Uuid::new_v4(), PaymentStatus::RefundFailed, None).unwrap_err();
        assert!(matches!(err, ApiError::PaymentGateway(_)));

        let ok = refund_outcome(
            Uuid::new_v4(),
            PaymentStatus::Refunded,
            Some("rfnd_1".to_string()),
        )
        .unwrap();
        assert_eq!(ok.payment_status, PaymentStatus::Refunded);
        assert_eq!(ok.refund_id.as_deref(), Some("rfnd_1"));
    }

    #[test]
    fn failed_refunds_can_be_retried() {
        assert!(check_refundable(OrderStatus::Cancelled, PaymentStatus::RefundFailed).is_ok());
        assert!(check_refundable(OrderStatus::Preparing, PaymentStatus::Paid).is_ok());
        assert!(matches!(
            check_refundable(OrderStatus::Cancelled, PaymentStatus::Refunded),
            Err(ApiError::Conflict(_))
        ));
    }
}
