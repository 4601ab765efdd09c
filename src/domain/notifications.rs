//! Notification domain types
//!
//! In-app notifications for customers and vendors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orders::OrderStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    // Vendor-facing
    OrderPlaced,
    PaymentReceived,

    // Customer-facing; `OrderCancelled` also tells a vendor the customer cancelled
    OrderAccepted,
    OrderPreparing,
    OrderReady,
    OrderCompleted,
    OrderCancelled,
    PaymentFailed,
    RefundIssued,
    RefundFailed,

    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderPlaced => "order_placed",
            Self::PaymentReceived => "payment_received",
            Self::OrderAccepted => "order_accepted",
            Self::OrderPreparing => "order_preparing",
            Self::OrderReady => "order_ready",
            Self::OrderCompleted => "order_completed",
            Self::OrderCancelled => "order_cancelled",
            Self::PaymentFailed => "payment_failed",
            Self::RefundIssued => "refund_issued",
            Self::RefundFailed => "refund_failed",
            Self::System => "system",
        }
    }

    /// Notification sent to the customer when their order enters `status`
    pub fn for_status(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Accepted => Some(Self::OrderAccepted),
            OrderStatus::Preparing => Some(Self::OrderPreparing),
            OrderStatus::Ready => Some(Self::OrderReady),
            OrderStatus::Completed => Some(Self::OrderCompleted),
            OrderStatus::Cancelled => Some(Self::OrderCancelled),
            OrderStatus::Pending => None,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: Option<bool>,
    #[serde(default, rename = "type")]
    pub notification_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            notification_type: n.notification_type,
            title: n.title,
            message: n.message,
            data: n.data,
            is_read: n.is_read,
            read_at: n.read_at,
            created_at: n.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkedReadResponse {
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_match_serde() {
        for t in [
            NotificationType::OrderPlaced,
            NotificationType::RefundFailed,
            NotificationType::System,
        ] {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json.trim_matches('"'), t.as_str());
        }
    }

    #[test]
    fn pending_orders_do_not_notify_customers() {
        assert_eq!(NotificationType::for_status(OrderStatus::Pending), None);
        assert_eq!(
            NotificationType::for_status(OrderStatus::Ready),
            Some(NotificationType::OrderReady)
        );
    }
}
