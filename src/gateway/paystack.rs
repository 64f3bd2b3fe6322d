use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, instrument};

use super::{
    parse_paid_at, ChargeStatus, ChargeVerification, CreateIntentRequest, PaymentGateway,
    PaymentIntent,
};
use crate::{config::PaymentConfig, errors::ServiceError};

/// Paystack HTTP adapter. Carries its own credentials and a client with an
/// explicit request timeout; a timed-out call surfaces as `GatewayError`
/// before anything is persisted.
pub struct PaystackGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

/// Response envelope common to all gateway endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
}

impl PaystackGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn map_transport_error(err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::GatewayError("gateway request timed out".to_string())
        } else {
            ServiceError::GatewayError(format!("gateway request failed: {}", err))
        }
    }

    async fn unwrap_envelope<T>(response: reqwest::Response) -> Result<T, ServiceError>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::GatewayError(format!(
                "gateway returned HTTP {}",
                status
            )));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("malformed gateway response: {}", e)))?;

        if !envelope.status {
            return Err(ServiceError::GatewayError(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| ServiceError::GatewayError("gateway response missing data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    #[instrument(skip(self, request), fields(amount_minor = request.amount_minor))]
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let body = serde_json::json!({
            "email": request.email,
            "amount": request.amount_minor,
            "currency": request.currency,
            "callback_url": request.callback_url,
            "metadata": request.metadata,
        });

        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Payment intent request failed: {}", e);
                Self::map_transport_error(e)
            })?;

        let data: InitializeData = Self::unwrap_envelope(response).await?;

        Ok(PaymentIntent {
            reference: data.reference,
            authorization_url: data.authorization_url,
            access_code: data.access_code,
        })
    }

    #[instrument(skip(self))]
    async fn verify(&self, reference: &str) -> Result<ChargeVerification, ServiceError> {
        let response = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                error!("Charge verification request failed: {}", e);
                Self::map_transport_error(e)
            })?;

        let data: VerifyData = Self::unwrap_envelope(response).await?;

        let status = match data.status.as_str() {
            "success" => ChargeStatus::Success,
            "pending" | "ongoing" | "processing" | "queued" => ChargeStatus::Pending,
            _ => ChargeStatus::Failed,
        };

        Ok(ChargeVerification {
            status,
            transaction_id: data.id.map(|id| id.to_string()),
            paid_at: data.paid_at.as_deref().and_then(parse_paid_at),
            channel: data.channel,
            currency: data.currency,
            ip_address: data.ip_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_envelope_deserializes() {
        let raw = r#"{
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "id": 1209483,
                "paid_at": "2024-05-01T12:30:00Z",
                "channel": "card",
                "currency": "NGN",
                "ip_address": "127.0.0.1"
            }
        }"#;

        let envelope: Envelope<VerifyData> = serde_json::from_str(raw).expect("deserialize");
        assert!(envelope.status);
        let data = envelope.data.expect("data present");
        assert_eq!(data.status, "success");
        assert_eq!(data.id, Some(1209483));
    }

    #[test]
    fn initialize_envelope_deserializes() {
        let raw = r#"{
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.example.com/abc123",
                "access_code": "abc123",
                "reference": "ref_xyz"
            }
        }"#;

        let envelope: Envelope<InitializeData> = serde_json::from_str(raw).expect("deserialize");
        let data = envelope.data.expect("data present");
        assert_eq!(data.reference, "ref_xyz");
        assert_eq!(data.access_code, "abc123");
    }
}
