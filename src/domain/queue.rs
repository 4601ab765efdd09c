//! Vendor order queue
//!
//! Active orders hold positions `1..=n`; wait estimates are derived from the
//! position and the vendor's average preparation time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orders::OrderStatus;
use crate::error::ApiError;

pub const DEFAULT_MAX_ACTIVE_ORDERS: i32 = 50;
pub const DEFAULT_AVG_PREPARATION_MINUTES: i32 = 10;

/// Per-vendor queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueSettings {
    pub vendor_id: Uuid,
    pub max_active_orders: i32,
    pub avg_preparation_minutes: i32,
    pub auto_accept: bool,
    pub updated_at: DateTime<Utc>,
}

impl QueueSettings {
    /// Settings used when a vendor never saved any
    pub fn defaults_for(vendor_id: Uuid) -> Self {
        Self {
            vendor_id,
            max_active_orders: DEFAULT_MAX_ACTIVE_ORDERS,
            avg_preparation_minutes: DEFAULT_AVG_PREPARATION_MINUTES,
            auto_accept: false,
            updated_at: Utc::now(),
        }
    }

    pub fn has_capacity(&self, active_orders: i64) -> bool {
        active_orders < self.max_active_orders as i64
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQueueSettingsRequest {
    #[serde(default)]
    pub max_active_orders: Option<i32>,
    #[serde(default)]
    pub avg_preparation_minutes: Option<i32>,
    #[serde(default)]
    pub auto_accept: Option<bool>,
}

impl UpdateQueueSettingsRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_active_orders {
            if !(1..=500).contains(&max) {
                return Err("max_active_orders must be between 1 and 500".to_string());
            }
        }
        if let Some(avg) = self.avg_preparation_minutes {
            if !(1..=240).contains(&avg) {
                return Err("avg_preparation_minutes must be between 1 and 240".to_string());
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, current: &QueueSettings) -> QueueSettings {
        QueueSettings {
            vendor_id: current.vendor_id,
            max_active_orders: self.max_active_orders.unwrap_or(current.max_active_orders),
            avg_preparation_minutes: self
                .avg_preparation_minutes
                .unwrap_or(current.avg_preparation_minutes),
            auto_accept: self.auto_accept.unwrap_or(current.auto_accept),
            updated_at: Utc::now(),
        }
    }
}

/// Minutes until an order at `position` is expected to be ready
pub fn estimate_wait_minutes(position: i32, avg_preparation_minutes: i32) -> i64 {
    position.max(1) as i64 * avg_preparation_minutes.max(0) as i64
}

pub fn estimated_ready_at(
    from: DateTime<Utc>,
    position: i32,
    avg_preparation_minutes: i32,
) -> DateTime<Utc> {
    from + Duration::minutes(estimate_wait_minutes(position, avg_preparation_minutes))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QueueEntryRow {
    pub order_id: Uuid,
    pub bill_number: i32,
    pub queue_position: i32,
    pub status: String,
    pub payment_status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub order_id: Uuid,
    pub bill_number: i32,
    pub queue_position: i32,
    pub status: OrderStatus,
    pub payment_status: String,
    pub estimated_wait_minutes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub vendor_id: Uuid,
    pub active_orders: usize,
    pub max_active_orders: i32,
    pub accepting_orders: bool,
    pub entries: Vec<QueueEntry>,
}

impl QueueSummary {
    /// Fails on a row whose status is not a known order status.
    pub fn build(
        settings: &QueueSettings,
        accepting_orders: bool,
        rows: Vec<QueueEntryRow>,
    ) -> Result<Self, ApiError> {
        let entries = rows
            .into_iter()
            .map(|row| {
                Ok(QueueEntry {
                    order_id: row.order_id,
                    bill_number: row.bill_number,
                    queue_position: row.queue_position,
                    status: row.status.parse().map_err(ApiError::internal)?,
                    payment_status: row.payment_status,
                    estimated_wait_minutes: estimate_wait_minutes(
                        row.queue_position,
                        settings.avg_preparation_minutes,
                    ),
                    created_at: row.created_at,
                })
            })
            .collect::<Result<Vec<QueueEntry>, ApiError>>()?;

        Ok(Self {
            vendor_id: settings.vendor_id,
            active_orders: entries.len(),
            max_active_orders: settings.max_active_orders,
            accepting_orders: accepting_orders && settings.has_capacity(entries.len() as i64),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_scales_with_position() {
        assert_eq!(estimate_wait_minutes(1, 12), 12);
        assert_eq!(estimate_wait_minutes(4, 12), 48);
        assert_eq!(estimate_wait_minutes(0, 12), 12);
    }

    #[test]
    fn ready_time_is_offset_from_now() {
        let now = Utc::now();
        assert_eq!(estimated_ready_at(now, 3, 5), now + Duration::minutes(15));
    }

    #[test]
    fn capacity_is_exclusive_of_limit() {
        let mut settings = QueueSettings::defaults_for(Uuid::new_v4());
        settings.max_active_orders = 2;
        assert!(settings.has_capacity(1));
        assert!(!settings.has_capacity(2));
    }

    #[test]
    fn update_request_is_validated_and_merged() {
        let current = QueueSettings::defaults_for(Uuid::new_v4());
        let update = UpdateQueueSettingsRequest {
            max_active_orders: None,
            avg_preparation_minutes: Some(7),
            auto_accept: Some(true),
        };
        assert!(update.validate().is_ok());

        let merged = update.apply_to(&current);
        assert_eq!(merged.max_active_orders, DEFAULT_MAX_ACTIVE_ORDERS);
        assert_eq!(merged.avg_preparation_minutes, 7);
        assert!(merged.auto_accept);

        let bad = UpdateQueueSettingsRequest {
            max_active_orders: Some(0),
            avg_preparation_minutes: None,
            auto_accept: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn summary_closes_intake_when_full() {
        let mut settings = QueueSettings::defaults_for(Uuid::new_v4());
        settings.max_active_orders = 1;
        settings.avg_preparation_minutes = 8;

        let rows = vec![QueueEntryRow {
            order_id: Uuid::new_v4(),
            bill_number: 17,
            queue_position: 1,
            status: "preparing".to_string(),
            payment_status: "paid".to_string(),
            created_at: Utc::now(),
        }];

        let summary = QueueSummary::build(&settings, true, rows).unwrap();
        assert_eq!(summary.active_orders, 1);
        assert!(!summary.accepting_orders);
        assert_eq!(summary.entries[0].status, OrderStatus::Preparing);
        assert_eq!(summary.entries[0].estimated_wait_minutes, 8);
    }

    #[test]
    fn unknown_status_fails_the_summary() {
        let settings = QueueSettings::defaults_for(Uuid::new_v4());
        let rows = vec![QueueEntryRow {
            order_id: Uuid::new_v4(),
            bill_number: 3,
            queue_position: 1,
            status: "teleported".to_string(),
            payment_status: "paid".to_string(),
            created_at: Utc::now(),
        }];

        assert!(matches!(
            QueueSummary::build(&settings, true, rows),
            Err(ApiError::Internal(_))
        ));
    }
}
