//! Vendor domain types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vendor {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cuisine: Option<String>,
    pub image_url: Option<String>,
    pub is_open: bool,
    pub accepting_orders: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public storefront view of a vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cuisine: Option<String>,
    pub image_url: Option<String>,
    pub is_open: bool,
    pub accepting_orders: bool,
}

impl From<Vendor> for VendorResponse {
    fn from(v: Vendor) -> Self {
        Self {
            id: v.id,
            name: v.name,
            description: v.description,
            cuisine: v.cuisine,
            image_url: v.image_url,
            is_open: v.is_open,
            accepting_orders: v.accepting_orders,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VendorListQuery {
    #[serde(default)]
    pub open_only: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateVendorRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_open: Option<bool>,
    #[serde(default)]
    pub accepting_orders: Option<bool>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderScope {
    #[default]
    Active,
    History,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VendorOrdersQuery {
    #[serde(default)]
    pub scope: OrderScope,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderCounts {
    pub orders_today: i64,
    pub completed_today: i64,
    pub cancelled_today: i64,
    pub active_orders: i64,
    pub gross_sales: Decimal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EarningsTotals {
    pub released: Decimal,
    pub held: Decimal,
}

/// Dashboard numbers for the current UTC day
#[derive(Debug, Clone, Serialize)]
pub struct VendorStats {
    pub date: NaiveDate,
    pub orders_today: i64,
    pub completed_today: i64,
    pub cancelled_today: i64,
    pub active_orders: i64,
    pub gross_sales: Decimal,
    pub earnings_released: Decimal,
    pub earnings_held: Decimal,
}

impl VendorStats {
    pub fn new(date: NaiveDate, counts: OrderCounts, earnings: EarningsTotals) -> Self {
        Self {
            date,
            orders_today: counts.orders_today,
            completed_today: counts.completed_today,
            cancelled_today: counts.cancelled_today,
            active_orders: counts.active_orders,
            gross_sales: counts.gross_sales,
            earnings_released: earnings.released,
            earnings_held: earnings.held,
        }
    }
}
