use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use tracing::warn;

use crate::{
    errors::ServiceError,
    gateway::{verify_webhook_signature, WebhookEvent},
    AppState,
};

/// Signature header attached by the gateway to webhook deliveries
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// POST /api/v1/payments/webhook
///
/// Authenticity first: the HMAC over the raw body is checked before the
/// payload is even parsed, so a forged or replayed delivery never reaches
/// the transition logic. Once the signature passes, the endpoint always
/// acknowledges with 200, including for unknown references: the response is
/// a delivery receipt to the gateway, not a business result.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_webhook_signature(&state.config.payment.secret_key, &body, signature) {
        warn!("Payment webhook signature verification failed");
        return Err(ServiceError::InvalidSignature);
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("Invalid webhook payload: {}", e)))?;

    state.services.checkout.apply_webhook_event(event).await?;

    Ok((StatusCode::OK, "ok"))
}
