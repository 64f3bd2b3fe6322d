//! Payment gateway seam. The checkout service talks to a [`PaymentGateway`]
//! trait object carrying its own credentials, so tests substitute a double
//! without process-wide state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::errors::ServiceError;

mod paystack;

pub use paystack::PaystackGateway;

type HmacSha512 = Hmac<Sha512>;

/// Request to open a payment intent with the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest {
    /// Charge amount in the gateway's minor currency unit
    pub amount_minor: i64,
    pub email: String,
    pub currency: String,
    /// Where the gateway sends the shopper after payment
    pub callback_url: String,
    /// Opaque correlation data echoed back by the gateway
    pub metadata: serde_json::Value,
}

/// Authorization handle issued by the gateway for a new intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
}

/// Authoritative charge status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Success,
    Failed,
    Pending,
}

/// Result of an on-demand verification call.
#[derive(Debug, Clone)]
pub struct ChargeVerification {
    pub status: ChargeStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub currency: Option<String>,
    pub ip_address: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for the given amount and correlation data.
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Query the authoritative status of a reference.
    async fn verify(&self, reference: &str) -> Result<ChargeVerification, ServiceError>;
}

/// Inbound webhook payload shape.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookChargeData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChargeData {
    pub reference: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Event type emitted by the gateway for a completed charge.
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

/// Verify an inbound notification: hex HMAC-SHA512 of the raw body, keyed by
/// the shared secret, compared against the signature header in constant time.
/// Side-effect free; must run before any state mutation.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Parse the gateway's RFC 3339 `paid_at` timestamps.
pub fn parse_paid_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compute the signature a gateway would attach to `payload`. Used by tests
/// to produce authentic webhook deliveries.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let secret = "sk_test_secret";
        let body = br#"{"event":"charge.success","data":{"reference":"ref_1"}}"#;

        let sig = sign_payload(secret, body);
        assert!(verify_webhook_signature(secret, body, &sig));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = "sk_test_secret";
        let sig = sign_payload(secret, b"original body");
        assert!(!verify_webhook_signature(secret, b"tampered body", &sig));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let body = b"payload";
        let sig = sign_payload("secret_a", body);
        assert!(!verify_webhook_signature("secret_b", body, &sig));
    }

    #[test]
    fn malformed_signature_rejected() {
        assert!(!verify_webhook_signature("secret", b"payload", "not-hex"));
        assert!(!verify_webhook_signature("secret", b"payload", ""));
    }

    #[test]
    fn paid_at_parses_rfc3339() {
        let parsed = parse_paid_at("2024-05-01T12:30:00+01:00").expect("should parse");
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T11:30:00+00:00");
        assert!(parse_paid_at("yesterday").is_none());
    }

    #[test]
    fn webhook_payload_deserializes() {
        let raw = r#"{
            "event": "charge.success",
            "data": {
                "reference": "ref_abc",
                "id": 4242,
                "paid_at": "2024-05-01T12:30:00Z",
                "channel": "card",
                "currency": "NGN",
                "status": "success"
            }
        }"#;

        let event: WebhookEvent = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(event.event, CHARGE_SUCCESS_EVENT);
        assert_eq!(event.data.reference, "ref_abc");
        assert_eq!(event.data.id, Some(4242));
    }
}
