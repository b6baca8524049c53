//! Razorpay-compatible gateway client and the signature checks that guard
//! the payment callbacks.
//!
//! Two HMAC-SHA256 schemes are in play: checkout verification signs
//! `"{gateway_order_id}|{gateway_payment_id}"` with the API key secret, and
//! webhooks sign the raw request body with the webhook secret. Both arrive
//! hex-encoded and are compared in constant time.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::{error, instrument};

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Hex HMAC-SHA256 over `message`.
pub fn sign(secret: &str, message: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks the signature Razorpay returns to the client after checkout.
pub fn verify_payment_signature(
    key_secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> bool {
    let message = format!("{gateway_order_id}|{gateway_payment_id}");
    constant_time_eq(&sign(key_secret, message.as_bytes()), signature)
}

/// Checks the `x-razorpay-signature` header against the raw webhook body.
pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature: &str) -> bool {
    constant_time_eq(&sign(webhook_secret, body), signature)
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

/// Converts a rupee amount to integer paise, the unit the gateway expects.
pub fn to_paise(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError("amount out of range".to_string()))
}

/// Gateway-side order, created before the client is handed off to pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Paise.
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Paise.
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
}

/// The outbound calls the payment service needs. Swapped for a stub in
/// tests and for the HTTP client in production.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError>;

    async fn refund_payment(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
    ) -> Result<GatewayRefund, ServiceError>;
}

/// Razorpay REST client using basic auth with the key pair.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    http: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self), fields(receipt = %receipt))]
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let body = json!({
            "amount": to_paise(amount)?,
            "currency": currency,
            "receipt": receipt,
        });

        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(status = %status, detail = %detail, "gateway order creation failed");
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway returned {status}"
            )));
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("bad gateway response: {e}")))
    }

    #[instrument(skip(self))]
    async fn refund_payment(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
    ) -> Result<GatewayRefund, ServiceError> {
        let body = json!({ "amount": to_paise(amount)? });

        let response = self
            .http
            .post(format!(
                "{}/payments/{}/refund",
                self.base_url, gateway_payment_id
            ))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(status = %status, detail = %detail, "gateway refund failed");
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway returned {status}"
            )));
        }

        response
            .json::<GatewayRefund>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("bad gateway response: {e}")))
    }
}
