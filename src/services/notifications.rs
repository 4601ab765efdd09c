//! Notification service
//!
//! Creates in-app notifications when orders and payments change. The
//! `notify_*` helpers log failures instead of returning them: a notification
//! must never fail the request that triggered it.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::notifications::NotificationType;
use crate::domain::orders::OrderStatus;

/// Create a notification for a user
pub async fn create_notification(
    db: &PgPool,
    user_id: Uuid,
    notification_type: NotificationType,
    title: &str,
    message: Option<&str>,
    data: Option<serde_json::Value>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    let data = data.unwrap_or(serde_json::json!({}));

    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, type, title, message, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(notification_type.as_str())
    .bind(title)
    .bind(message)
    .bind(&data)
    .execute(db)
    .await?;

    tracing::info!(
        user_id = %user_id,
        notification_type = %notification_type,
        notification_id = %id,
        "Notification created"
    );

    Ok(id)
}

async fn send(
    db: &PgPool,
    user_id: Uuid,
    notification_type: NotificationType,
    title: String,
    message: String,
    data: serde_json::Value,
) {
    if let Err(e) =
        create_notification(db, user_id, notification_type, &title, Some(&message), Some(data))
            .await
    {
        tracing::warn!(
            user_id = %user_id,
            notification_type = %notification_type,
            error = %e,
            "Failed to create notification"
        );
    }
}

/// Tell a vendor's owner that a new order arrived
pub async fn notify_order_placed(
    db: &PgPool,
    vendor_owner_id: Uuid,
    order_id: Uuid,
    bill_number: i32,
    total_amount: Decimal,
    item_count: i32,
) {
    send(
        db,
        vendor_owner_id,
        NotificationType::OrderPlaced,
        format!("New order #{}", bill_number),
        format!("{} item(s), total ₹{}", item_count, total_amount),
        serde_json::json!({
            "order_id": order_id,
            "bill_number": bill_number,
            "total_amount": total_amount,
        }),
    )
    .await
}

/// Tell a customer their order moved to `status`
pub async fn notify_order_status(
    db: &PgPool,
    customer_id: Uuid,
    order_id: Uuid,
    bill_number: i32,
    vendor_name: &str,
    status: OrderStatus,
    reason: Option<&str>,
) {
    let Some(notification_type) = NotificationType::for_status(status) else {
        return;
    };

    let (title, message) = match status {
        OrderStatus::Accepted => (
            format!("Order #{} accepted", bill_number),
            format!("{} has accepted your order", vendor_name),
        ),
        OrderStatus::Preparing => (
            format!("Order #{} is being prepared", bill_number),
            format!("{} started preparing your order", vendor_name),
        ),
        OrderStatus::Ready => (
            format!("Order #{} is ready!", bill_number),
            format!("Collect your order from {}", vendor_name),
        ),
        OrderStatus::Completed => (
            format!("Order #{} completed", bill_number),
            format!("Enjoy your meal from {}", vendor_name),
        ),
        OrderStatus::Cancelled => (
            format!("Order #{} cancelled", bill_number),
            match reason {
                Some(r) => format!("{} cancelled your order: {}", vendor_name, r),
                None => format!("Your order from {} was cancelled", vendor_name),
            },
        ),
        OrderStatus::Pending => return,
    };

    send(
        db,
        customer_id,
        notification_type,
        title,
        message,
        serde_json::json!({
            "order_id": order_id,
            "bill_number": bill_number,
            "status": status,
        }),
    )
    .await
}

fn customer_cancellation_text(bill_number: i32, reason: Option<&str>) -> (String, String) {
    let title = format!("Order #{} cancelled by customer", bill_number);
    let message = match reason {
        Some(r) => format!("The customer cancelled order #{}: {}", bill_number, r),
        None => format!("The customer cancelled order #{}", bill_number),
    };
    (title, message)
}

/// Tell a vendor's owner that the customer cancelled an order
pub async fn notify_order_cancelled_by_customer(
    db: &PgPool,
    vendor_owner_id: Uuid,
    order_id: Uuid,
    bill_number: i32,
    reason: Option<&str>,
) {
    let (title, message) = customer_cancellation_text(bill_number, reason);
    send(
        db,
        vendor_owner_id,
        NotificationType::OrderCancelled,
        title,
        message,
        serde_json::json!({
            "order_id": order_id,
            "bill_number": bill_number,
            "status": OrderStatus::Cancelled,
            "cancelled_by": "customer",
        }),
    )
    .await
}

/// Tell a vendor's owner that an order was paid
pub async fn notify_payment_received(
    db: &PgPool,
    vendor_owner_id: Uuid,
    order_id: Uuid,
    bill_number: i32,
    amount: Decimal,
) {
    send(
        db,
        vendor_owner_id,
        NotificationType::PaymentReceived,
        format!("Payment received for #{}", bill_number),
        format!("₹{} paid", amount),
        serde_json::json!({
            "order_id": order_id,
            "bill_number": bill_number,
            "amount": amount,
        }),
    )
    .await
}

pub async fn notify_payment_failed(db: &PgPool, customer_id: Uuid, order_id: Uuid, bill_number: i32) {
    send(
        db,
        customer_id,
        NotificationType::PaymentFailed,
        format!("Payment failed for order #{}", bill_number),
        "Your payment did not go through. You can try again.".to_string(),
        serde_json::json!({
            "order_id": order_id,
            "bill_number": bill_number,
        }),
    )
    .await
}

/// Tell a customer how their refund went
pub async fn notify_refund(
    db: &PgPool,
    customer_id: Uuid,
    order_id: Uuid,
    bill_number: i32,
    amount: Decimal,
    succeeded: bool,
) {
    let (notification_type, title, message) = if succeeded {
        (
            NotificationType::RefundIssued,
            format!("Refund issued for order #{}", bill_number),
            format!("₹{} will be credited to your original payment method", amount),
        )
    } else {
        (
            NotificationType::RefundFailed,
            format!("Refund delayed for order #{}", bill_number),
            "We could not process your refund yet. It will be retried.".to_string(),
        )
    };

    send(
        db,
        customer_id,
        notification_type,
        title,
        message,
        serde_json::json!({
            "order_id": order_id,
            "bill_number": bill_number,
            "amount": amount,
        }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_cancellation_names_the_bill() {
        let (title, message) = customer_cancellation_text(12, None);
        assert_eq!(title, "Order #12 cancelled by customer");
        assert_eq!(message, "The customer cancelled order #12");

        let (_, message) = customer_cancellation_text(12, Some("Ordered twice"));
        assert!(message.ends_with(": Ordered twice"));
    }
}
