//! Payment domain types
//!
//! Amounts are stored as NUMERIC rupees and exchanged with the gateway as
//! integer paise.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orders::{OrderStatus, PaymentStatus};

/// Convert a rupee amount to paise. `None` for negative or oversized values.
pub fn to_paise(amount: Decimal) -> Option<i64> {
    let paise = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    paise.to_i64().filter(|p| *p >= 0)
}

pub fn from_paise(paise: i64) -> Decimal {
    Decimal::new(paise, 2)
}

/// Split of a captured payment between the platform and the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSplit {
    pub total_paise: i64,
    pub platform_fee_paise: i64,
    pub vendor_amount_paise: i64,
}

/// Platform fee is `fee_bps` basis points of the total, rounded half-up to
/// the nearest paisa; the vendor gets the remainder.
pub fn split_payment(total_paise: i64, fee_bps: u32) -> FeeSplit {
    let total = total_paise.max(0);
    let fee = ((total as i128 * fee_bps as i128 + 5_000) / 10_000) as i64;
    let fee = fee.min(total);

    FeeSplit {
        total_paise: total,
        platform_fee_paise: fee,
        vendor_amount_paise: total - fee,
    }
}

/// Gateway receipt id; Razorpay caps receipts at 40 characters
pub fn receipt_for(bill_number: i32, order_id: Uuid) -> String {
    let short = order_id.simple().to_string();
    let mut receipt = format!("zomatify_{}_{}", bill_number, &short[..8]);
    receipt.truncate(40);
    receipt
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Held,
    Released,
    Refunded,
}

impl DistributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Released => "released",
            Self::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentDistribution {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub razorpay_payment_id: String,
    pub total_amount: Decimal,
    pub platform_fee: Decimal,
    pub vendor_amount: Decimal,
    pub status: String,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Requests / responses
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentOrderRequest {
    pub order_id: Uuid,
}

/// Everything the Razorpay checkout widget needs
#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentOrderResponse {
    pub order_id: Uuid,
    pub bill_number: i32,
    pub key_id: String,
    pub razorpay_order_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyPaymentResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub order_id: Uuid,
    pub refund_id: Option<String>,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusResponse {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub refund_id: Option<String>,
    pub distribution: Option<PaymentDistribution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn converts_rupees_to_paise() {
        assert_eq!(to_paise(dec("231.50")), Some(23150));
        assert_eq!(to_paise(dec("0.005")), Some(1));
        assert_eq!(to_paise(dec("-1")), None);
        assert_eq!(from_paise(23150), dec("231.50"));
    }

    #[test]
    fn fee_split_rounds_half_up() {
        // 5% of ₹231.50 is 1157.5 paise
        let split = split_payment(23150, 500);
        assert_eq!(split.platform_fee_paise, 1158);
        assert_eq!(split.vendor_amount_paise, 21992);
        assert_eq!(
            split.platform_fee_paise + split.vendor_amount_paise,
            split.total_paise
        );
    }

    #[test]
    fn fee_split_edges() {
        assert_eq!(split_payment(10000, 0).vendor_amount_paise, 10000);
        assert_eq!(split_payment(10000, 10_000).vendor_amount_paise, 0);
        assert_eq!(split_payment(1, 250).platform_fee_paise, 0);
        assert_eq!(split_payment(-5, 500).total_paise, 0);
    }

    #[test]
    fn receipt_fits_gateway_limit() {
        let receipt = receipt_for(i32::MAX, Uuid::new_v4());
        assert!(receipt.starts_with("zomatify_2147483647_"));
        assert!(receipt.len() <= 40);
    }
}
