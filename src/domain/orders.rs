//! Order domain types
//!
//! Order lifecycle, line validation and pricing. Database access lives in
//! `services::orders`; everything here is pure so it can be unit tested.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;

pub const MAX_ORDER_LINES: usize = 50;
pub const MAX_LINE_QUANTITY: u32 = 50;
pub const MAX_NOTES_LEN: usize = 500;

/// Order lifecycle status
///
/// `pending → accepted → preparing → ready → completed`, with cancellation
/// allowed until the food is ready.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Orders that occupy a slot in the vendor's queue
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Accepted | Self::Preparing | Self::Ready
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Accepted, Preparing)
                | (Preparing, Ready)
                | (Ready, Completed)
                | (Pending | Accepted | Preparing, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Payment state of an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunding,
    Refunded,
    RefundFailed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunding => "refunding",
            Self::Refunded => "refunded",
            Self::RefundFailed => "refund_failed",
        }
    }

    /// Money was captured at some point
    pub fn was_captured(&self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Refunding | Self::Refunded | Self::RefundFailed
        )
    }

    /// A refund may be (re)attempted from this state
    pub fn is_refundable(&self) -> bool {
        matches!(self, Self::Paid | Self::RefundFailed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunding" => Ok(Self::Refunding),
            "refunded" => Ok(Self::Refunded),
            "refund_failed" => Ok(Self::RefundFailed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub menu_item_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub vendor_id: Uuid,
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OrderListQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

// ============================================================================
// Validation and pricing
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderValidationError {
    #[error("Order must contain at least one item")]
    Empty,

    #[error("Order cannot contain more than {MAX_ORDER_LINES} different items")]
    TooManyLines,

    #[error("Quantity for item {0} must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity(Uuid),

    #[error("Menu item {0} does not exist")]
    UnknownItem(Uuid),

    #[error("Menu item {0} belongs to a different vendor")]
    WrongVendor(Uuid),

    #[error("{0} is currently unavailable")]
    Unavailable(String),

    #[error("Only {available} of {name} left in stock")]
    InsufficientStock { name: String, available: i32 },

    #[error("Notes cannot exceed {MAX_NOTES_LEN} characters")]
    NotesTooLong,
}

impl From<OrderValidationError> for ApiError {
    fn from(err: OrderValidationError) -> Self {
        match err {
            OrderValidationError::Unavailable(_)
            | OrderValidationError::InsufficientStock { .. } => ApiError::Conflict(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

/// Merge duplicate menu items and check line bounds.
/// First-seen order of items is preserved.
pub fn normalize_lines(
    items: &[OrderLineRequest],
) -> Result<Vec<OrderLineRequest>, OrderValidationError> {
    if items.is_empty() {
        return Err(OrderValidationError::Empty);
    }

    let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(items.len());
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for item in items {
        if item.quantity == 0 {
            return Err(OrderValidationError::InvalidQuantity(item.menu_item_id));
        }
        match index.get(&item.menu_item_id) {
            Some(&i) => merged[i].quantity = merged[i].quantity.saturating_add(item.quantity),
            None => {
                index.insert(item.menu_item_id, merged.len());
                merged.push(*item);
            }
        }
    }

    if merged.len() > MAX_ORDER_LINES {
        return Err(OrderValidationError::TooManyLines);
    }
    if let Some(line) = merged.iter().find(|l| l.quantity > MAX_LINE_QUANTITY) {
        return Err(OrderValidationError::InvalidQuantity(line.menu_item_id));
    }

    Ok(merged)
}

pub fn validate_notes(notes: Option<&str>) -> Result<Option<String>, OrderValidationError> {
    match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) if n.chars().count() > MAX_NOTES_LEN => Err(OrderValidationError::NotesTooLong),
        Some(n) => Ok(Some(n.to_string())),
        None => Ok(None),
    }
}

/// The parts of a menu item that matter when ordering
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderableItem {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub is_available: bool,
    pub stock_quantity: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub menu_item_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// Price normalized lines against current menu rows, returning the lines and
/// the order total.
pub fn price_lines(
    vendor_id: Uuid,
    lines: &[OrderLineRequest],
    items: &[OrderableItem],
) -> Result<(Vec<PricedLine>, Decimal), OrderValidationError> {
    let by_id: HashMap<Uuid, &OrderableItem> = items.iter().map(|i| (i.id, i)).collect();
    let mut priced = Vec::with_capacity(lines.len());
    let mut total = Decimal::ZERO;

    for line in lines {
        let item = by_id
            .get(&line.menu_item_id)
            .ok_or(OrderValidationError::UnknownItem(line.menu_item_id))?;

        if item.vendor_id != vendor_id {
            return Err(OrderValidationError::WrongVendor(item.id));
        }
        if !item.is_available {
            return Err(OrderValidationError::Unavailable(item.name.clone()));
        }

        let quantity = line.quantity as i32;
        if let Some(stock) = item.stock_quantity {
            if stock < quantity {
                return Err(OrderValidationError::InsufficientStock {
                    name: item.name.clone(),
                    available: stock,
                });
            }
        }

        let line_total = item.price * Decimal::from(quantity);
        total += line_total;
        priced.push(PricedLine {
            menu_item_id: item.id,
            name: item.name.clone(),
            unit_price: item.price,
            quantity,
            line_total,
        });
    }

    Ok((priced, total))
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItemResponse {
    pub id: Uuid,
    #[serde(skip)]
    pub order_id: Uuid,
    pub menu_item_id: Option<Uuid>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub customer_id: Uuid,
    pub bill_number: i32,
    pub queue_position: Option<i32>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub estimated_ready_at: Option<DateTime<Utc>>,
    pub estimated_wait_minutes: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot pushed to customers tracking an order
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct OrderProgress {
    pub status: String,
    pub payment_status: String,
    pub queue_position: Option<i32>,
    pub estimated_ready_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderTrackingEvent {
    OrderUpdate {
        order_id: Uuid,
        #[serde(flatten)]
        progress: OrderProgress,
    },
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item(vendor_id: Uuid, name: &str, price: Decimal, stock: Option<i32>) -> OrderableItem {
        OrderableItem {
            id: Uuid::new_v4(),
            vendor_id,
            name: name.to_string(),
            price,
            is_available: true,
            stock_quantity: stock,
        }
    }

    fn line(item: &OrderableItem, quantity: u32) -> OrderLineRequest {
        OrderLineRequest {
            menu_item_id: item.id,
            quantity,
        }
    }

    #[test]
    fn status_machine_follows_kitchen_flow() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Accepted.can_transition_to(Accepted));

        for status in [Pending, Accepted, Preparing] {
            assert!(status.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Accepted,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("delivered".parse::<OrderStatus>().is_err());
        assert_eq!(
            "refund_failed".parse::<PaymentStatus>().unwrap(),
            PaymentStatus::RefundFailed
        );
    }

    #[test]
    fn duplicate_lines_are_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let lines = normalize_lines(&[
            OrderLineRequest { menu_item_id: a, quantity: 2 },
            OrderLineRequest { menu_item_id: b, quantity: 1 },
            OrderLineRequest { menu_item_id: a, quantity: 3 },
        ])
        .unwrap();

        assert_eq!(
            lines,
            vec![
                OrderLineRequest { menu_item_id: a, quantity: 5 },
                OrderLineRequest { menu_item_id: b, quantity: 1 },
            ]
        );
    }

    #[test]
    fn invalid_lines_are_rejected() {
        let id = Uuid::new_v4();
        assert_eq!(normalize_lines(&[]), Err(OrderValidationError::Empty));
        assert_eq!(
            normalize_lines(&[OrderLineRequest { menu_item_id: id, quantity: 0 }]),
            Err(OrderValidationError::InvalidQuantity(id))
        );
        assert_eq!(
            normalize_lines(&[
                OrderLineRequest { menu_item_id: id, quantity: 30 },
                OrderLineRequest { menu_item_id: id, quantity: 30 },
            ]),
            Err(OrderValidationError::InvalidQuantity(id))
        );

        let too_many: Vec<_> = (0..=MAX_ORDER_LINES)
            .map(|_| OrderLineRequest { menu_item_id: Uuid::new_v4(), quantity: 1 })
            .collect();
        assert_eq!(normalize_lines(&too_many), Err(OrderValidationError::TooManyLines));
    }

    #[test]
    fn prices_lines_from_menu() {
        let vendor = Uuid::new_v4();
        let dosa = item(vendor, "Masala Dosa", dec("85.50"), None);
        let chai = item(vendor, "Chai", dec("20"), Some(10));

        let (priced, total) =
            price_lines(vendor, &[line(&dosa, 2), line(&chai, 3)], &[dosa.clone(), chai.clone()])
                .unwrap();

        assert_eq!(priced.len(), 2);
        assert_eq!(priced[0].line_total, dec("171.00"));
        assert_eq!(priced[1].line_total, dec("60"));
        assert_eq!(total, dec("231.00"));
    }

    #[test]
    fn pricing_rejects_foreign_unavailable_and_short_items() {
        let vendor = Uuid::new_v4();
        let foreign = item(Uuid::new_v4(), "Burger", dec("120"), None);
        assert_eq!(
            price_lines(vendor, &[line(&foreign, 1)], &[foreign.clone()]),
            Err(OrderValidationError::WrongVendor(foreign.id))
        );

        let mut idli = item(vendor, "Idli", dec("40"), None);
        idli.is_available = false;
        assert!(matches!(
            price_lines(vendor, &[line(&idli, 1)], &[idli.clone()]),
            Err(OrderValidationError::Unavailable(_))
        ));

        let vada = item(vendor, "Vada", dec("30"), Some(2));
        assert_eq!(
            price_lines(vendor, &[line(&vada, 3)], &[vada.clone()]),
            Err(OrderValidationError::InsufficientStock {
                name: "Vada".to_string(),
                available: 2
            })
        );

        let missing = Uuid::new_v4();
        assert_eq!(
            price_lines(
                vendor,
                &[OrderLineRequest { menu_item_id: missing, quantity: 1 }],
                &[]
            ),
            Err(OrderValidationError::UnknownItem(missing))
        );
    }

    #[test]
    fn notes_are_trimmed_and_bounded() {
        assert_eq!(validate_notes(Some("  extra spicy ")).unwrap().as_deref(), Some("extra spicy"));
        assert_eq!(validate_notes(Some("   ")).unwrap(), None);
        let long = "a".repeat(MAX_NOTES_LEN + 1);
        assert_eq!(validate_notes(Some(&long)), Err(OrderValidationError::NotesTooLong));
    }

    #[test]
    fn stock_shortage_maps_to_conflict() {
        let err: ApiError = OrderValidationError::Unavailable("Chai".into()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
        let err: ApiError = OrderValidationError::Empty.into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
