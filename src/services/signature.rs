//! Razorpay signature checks.
//!
//! Both checkout callbacks and webhooks are signed with hex encoded
//! HMAC-SHA256; comparisons are constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

fn verify_hex_hmac(secret: &[u8], parts: &[&[u8]], provided: &str) -> bool {
    let Ok(provided_bytes) = hex::decode(provided.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    for part in parts {
        mac.update(part);
    }
    let expected = mac.finalize().into_bytes();
    let expected_bytes: &[u8] = expected.as_ref();

    expected_bytes.ct_eq(provided_bytes.as_slice()).into()
}

/// Checkout signature: HMAC of `"<razorpay_order_id>|<razorpay_payment_id>"`
/// keyed with the API key secret.
pub fn verify_payment_signature(
    key_secret: &str,
    razorpay_order_id: &str,
    razorpay_payment_id: &str,
    signature: &str,
) -> bool {
    verify_hex_hmac(
        key_secret.as_bytes(),
        &[
            razorpay_order_id.as_bytes(),
            b"|",
            razorpay_payment_id.as_bytes(),
        ],
        signature,
    )
}

/// Webhook signature: HMAC of the raw request body keyed with the webhook
/// secret.
pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature: &str) -> bool {
    verify_hex_hmac(webhook_secret.as_bytes(), &[body], signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYMENT_SIG: &str = "2d67c3fceac8e3487e54e2d6ea7815a350a8562ed56d521a80eb43a393e9ab52";
    const WEBHOOK_SIG: &str = "816caa6774dc529a4a300077fdf718673cd33343f0270ccb26f0d67fe087c772";

    #[test]
    fn accepts_valid_checkout_signature() {
        assert!(verify_payment_signature(
            "test_secret",
            "order_IEIaMR65cu6nz3",
            "pay_IH4NVgf4Dreq1l",
            PAYMENT_SIG
        ));
    }

    #[test]
    fn rejects_tampered_checkout_signature() {
        assert!(!verify_payment_signature(
            "test_secret",
            "order_IEIaMR65cu6nz3",
            "pay_SOMEONEELSE",
            PAYMENT_SIG
        ));
        assert!(!verify_payment_signature(
            "other_secret",
            "order_IEIaMR65cu6nz3",
            "pay_IH4NVgf4Dreq1l",
            PAYMENT_SIG
        ));
        assert!(!verify_payment_signature(
            "test_secret",
            "order_IEIaMR65cu6nz3",
            "pay_IH4NVgf4Dreq1l",
            "not-hex"
        ));
    }

    #[test]
    fn webhook_signature_covers_raw_body() {
        let body = br#"{"event":"payment.captured"}"#;
        assert!(verify_webhook_signature("whsec_zomatify", body, WEBHOOK_SIG));
        assert!(!verify_webhook_signature(
            "whsec_zomatify",
            br#"{"event":"payment.failed"}"#,
            WEBHOOK_SIG
        ));
        assert!(!verify_webhook_signature("whsec_zomatify", body, &WEBHOOK_SIG[..32]));
    }
}
