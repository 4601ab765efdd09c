//! Razorpay REST client.
//!
//! Covers the three calls the backend needs: create an order before
//! checkout, fetch a payment, and refund a captured payment. Idempotent reads
//! and order creation are retried with exponential backoff on transport
//! errors and 5xx responses; refunds are sent once.

use anyhow::{Context, Result};
use backoff::ExponentialBackoffBuilder;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::config::Settings;
use crate::error::ApiError;

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    max_retry_elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to payment gateway failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payment gateway rejected request ({status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("payment gateway returned {0}")]
    Server(u16),

    #[error("unexpected payment gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Server(_) => true,
            Self::Rejected { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS.as_u16(),
            Self::Decode(_) => false,
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected { description, .. } => ApiError::BadRequest(description),
            other => ApiError::PaymentGateway(other.to_string()),
        }
    }
}

/// Razorpay error envelope: `{"error": {"code": "...", "description": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub captured: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct RefundBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
    notes: &'a serde_json::Value,
}

impl RazorpayClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.razorpay_timeout_seconds))
            .build()
            .context("Failed to create Razorpay HTTP client")?;

        tracing::info!(
            base_url = %settings.razorpay_api_base,
            live = settings.razorpay_key_id.starts_with("rzp_live_"),
            "Razorpay client initialized"
        );

        Ok(Self {
            client,
            base_url: settings.razorpay_api_base.trim_end_matches('/').to_string(),
            key_id: settings.razorpay_key_id.clone(),
            key_secret: settings.razorpay_key_secret.clone(),
            max_retry_elapsed: Duration::from_secs(settings.razorpay_timeout_seconds * 2),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn is_live(&self) -> bool {
        self.key_id.starts_with("rzp_live_")
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, method = %method, "Razorpay request");
        self.client
            .request(method, url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
    }

    async fn send<R: DeserializeOwned>(request: RequestBuilder) -> Result<R, GatewayError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()));
        }

        if status.is_server_error() {
            return Err(GatewayError::Server(status.as_u16()));
        }

        let description = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.error.description)
            .unwrap_or_else(|| format!("Payment gateway returned {}", status));

        Err(GatewayError::Rejected {
            status: status.as_u16(),
            description,
        })
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn send_with_retry<R, F>(&self, operation: &'static str, build: F) -> Result<R, GatewayError>
    where
        R: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(self.max_retry_elapsed))
            .build();

        backoff::future::retry(policy, || {
            let request = build();
            async move {
                Self::send::<R>(request).await.map_err(|e| {
                    if e.is_transient() {
                        warn!(operation, error = %e, "Retrying Razorpay call");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }

    /// Create a gateway order for `amount` paise.
    #[instrument(skip(self, notes))]
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> Result<GatewayOrder, GatewayError> {
        let body = CreateOrderBody {
            amount,
            currency,
            receipt,
            notes: &notes,
        };

        let order: GatewayOrder = self
            .send_with_retry("create_order", || {
                self.request(reqwest::Method::POST, "/orders").json(&body)
            })
            .await
            .map_err(|e| {
                error!(error = %e, receipt, "Failed to create Razorpay order");
                e
            })?;

        debug!(razorpay_order_id = %order.id, status = %order.status, "Razorpay order created");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let path = format!("/payments/{}", payment_id);
        self.send_with_retry("fetch_payment", || {
            self.request(reqwest::Method::GET, &path)
        })
        .await
    }

    /// Refund a captured payment; `None` refunds the full amount.
    #[instrument(skip(self, notes))]
    pub async fn refund_payment(
        &self,
        payment_id: &str,
        amount: Option<i64>,
        notes: serde_json::Value,
    ) -> Result<GatewayRefund, GatewayError> {
        let path = format!("/payments/{}/refund", payment_id);
        let request = self
            .request(reqwest::Method::POST, &path)
            .json(&RefundBody {
                amount,
                notes: &notes,
            });

        let refund: GatewayRefund = Self::send(request).await.map_err(|e| {
            error!(error = %e, payment_id, "Razorpay refund failed");
            e
        })?;

        debug!(refund_id = %refund.id, status = %refund.status, "Razorpay refund created");
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_rejections_surface_as_bad_requests() {
        let err: ApiError = GatewayError::Rejected {
            status: 400,
            description: "The amount must be atleast INR 1.00".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("atleast")));

        let err: ApiError = GatewayError::Server(503).into();
        assert!(matches!(err, ApiError::PaymentGateway(_)));
    }

    #[test]
    fn only_server_errors_and_throttling_are_retried() {
        assert!(GatewayError::Server(502).is_transient());
        assert!(GatewayError::Rejected {
            status: 429,
            description: String::new()
        }
        .is_transient());
        assert!(!GatewayError::Rejected {
            status: 400,
            description: String::new()
        }
        .is_transient());
        assert!(!GatewayError::Decode("eof".to_string()).is_transient());
    }

    #[test]
    fn parses_error_envelope() {
        let body = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"Invalid payment id"}}"#;
        let env: ErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(env.error.description.as_deref(), Some("Invalid payment id"));
    }
}
