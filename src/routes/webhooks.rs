//! Razorpay webhook receiver
//!
//! Signed with the webhook secret over the raw body. Deliveries are
//! deduplicated by event id; a delivery that fails to apply releases its id so
//! the gateway's retry is processed.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::payments::to_paise;
use crate::error::ApiError;
use crate::services::{payments, signature};

const HEADER_SIGNATURE: &str = "x-razorpay-signature";
const HEADER_EVENT_ID: &str = "x-razorpay-event-id";

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    payment: Option<Entity<PaymentEntity>>,
    #[serde(default)]
    refund: Option<Entity<RefundEntity>>,
}

#[derive(Debug, Deserialize)]
struct Entity<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct RefundEntity {
    id: String,
    payment_id: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /webhooks/razorpay
pub async fn razorpay_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = header(&headers, HEADER_SIGNATURE)
        .ok_or_else(|| ApiError::bad_request("Missing webhook signature"))?;

    if !signature::verify_webhook_signature(&state.settings.razorpay_webhook_secret, &body, signature)
    {
        warn!("Rejected webhook with invalid signature");
        return Err(ApiError::bad_request("Invalid webhook signature"));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid webhook payload: {}", e)))?;

    let event_id = header(&headers, HEADER_EVENT_ID).map(str::to_string);
    if let Some(id) = &event_id {
        let inserted = sqlx::query(
            "INSERT INTO webhook_events (id, event_type) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(&event.event)
        .execute(&state.db)
        .await?
        .rows_affected();

        if inserted == 0 {
            info!(event_id = %id, event = %event.event, "Duplicate webhook ignored");
            return Ok(Json(serde_json::json!({ "status": "duplicate" })));
        }
    }

    if let Err(e) = apply_event(&state, &event).await {
        error!(event = %event.event, error = %e, "Webhook processing failed");
        if let Some(id) = &event_id {
            sqlx::query("DELETE FROM webhook_events WHERE id = $1")
                .bind(id)
                .execute(&state.db)
                .await?;
        }
        return Err(e);
    }

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn apply_event(state: &AppState, event: &WebhookEvent) -> Result<(), ApiError> {
    match event.event.as_str() {
        "payment.captured" => {
            let payment = payment_entity(event)?;
            let Some(razorpay_order_id) = payment.order_id.as_deref() else {
                warn!(payment_id = %payment.id, "Captured payment has no order id");
                return Ok(());
            };

            let order: Option<(Uuid, Decimal)> = sqlx::query_as(
                "SELECT id, total_amount FROM orders WHERE razorpay_order_id = $1",
            )
            .bind(razorpay_order_id)
            .fetch_optional(&state.db)
            .await?;

            let Some((order_id, total_amount)) = order else {
                warn!(razorpay_order_id, "Captured payment for unknown order");
                return Ok(());
            };

            if to_paise(total_amount) != Some(payment.amount) {
                error!(
                    order_id = %order_id,
                    expected = %total_amount,
                    paid_paise = payment.amount,
                    "Captured amount does not match order"
                );
                return Ok(());
            }

            payments::record_capture(state, order_id, &payment.id).await?;
        }
        "payment.failed" => {
            let payment = payment_entity(event)?;
            if let Some(razorpay_order_id) = payment.order_id.as_deref() {
                payments::record_failure(state, razorpay_order_id).await?;
            }
        }
        "refund.processed" => {
            let refund = event
                .payload
                .refund
                .as_ref()
                .map(|r| &r.entity)
                .ok_or_else(|| ApiError::bad_request("Refund event without refund entity"))?;
            payments::record_refund_processed(state, &refund.payment_id, &refund.id).await?;
        }
        other => {
            info!(event = other, "Ignoring unhandled webhook event");
        }
    }
    Ok(())
}

fn payment_entity(event: &WebhookEvent) -> Result<&PaymentEntity, ApiError> {
    event
        .payload
        .payment
        .as_ref()
        .map(|p| &p.entity)
        .ok_or_else(|| ApiError::bad_request("Payment event without payment entity"))
}
