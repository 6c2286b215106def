use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use metrics::counter;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// A payment intent as created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    /// Amount in the currency's minor unit, exactly as the gateway holds it.
    pub amount_minor: i64,
    pub currency: String,
}

impl PaymentIntent {
    /// Amount in major units (e.g. rupees rather than paise).
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.amount_minor, 2).normalize()
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent for `amount` major units.
    async fn create_intent(&self, amount: Decimal) -> Result<PaymentIntent, ServiceError>;
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: String,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Deserialize)]
struct GatewayErrorDetail {
    #[serde(default)]
    description: Option<String>,
}

/// Payment gateway client using HTTP basic auth with a key id and secret.
///
/// Credentials are checked once at construction; a client that exists can
/// always attempt a call.
#[derive(Clone)]
pub struct PaymentIntentClient {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    currency: String,
}

impl std::fmt::Debug for PaymentIntentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentIntentClient")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl PaymentIntentClient {
    pub fn new(
        base_url: impl Into<String>,
        key_id: Option<&str>,
        key_secret: Option<&str>,
        currency: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let (Some(key_id), Some(key_secret)) = (non_blank(key_id), non_blank(key_secret)) else {
            return Err(ServiceError::ConfigurationError(
                "Payment gateway not configured".to_string(),
            ));
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::ConfigurationError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            currency: currency.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            cfg.payment_gateway_url.clone(),
            cfg.payment_key_id.as_deref(),
            cfg.payment_key_secret.as_deref(),
            cfg.payment_currency.clone(),
            Duration::from_secs(cfg.payment_timeout_secs),
        )
    }

    fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
        amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor| minor.round().to_i64())
            .ok_or_else(|| ServiceError::InvalidInput("Invalid amount".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaymentIntentClient {
    #[instrument(skip(self), fields(currency = %self.currency))]
    async fn create_intent(&self, amount: Decimal) -> Result<PaymentIntent, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput("Invalid amount".to_string()));
        }
        let amount_minor = Self::to_minor_units(amount)?;
        if amount_minor <= 0 {
            return Err(ServiceError::InvalidInput("Invalid amount".to_string()));
        }

        let body = CreateOrderRequest {
            amount: amount_minor,
            currency: &self.currency,
            receipt: format!("rcpt_{}", Uuid::new_v4().simple()),
        };

        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("payment gateway unreachable: {}", e);
                ServiceError::GatewayError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<GatewayErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.description)
                .unwrap_or_else(|| status.to_string());
            error!(%status, "payment gateway rejected intent: {}", reason);
            return Err(ServiceError::GatewayError(reason));
        }

        let created: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("malformed gateway response: {}", e)))?;

        counter!("order_reconciler.payment_intents.created", 1);
        info!(intent_id = %created.id, amount_minor = created.amount, "payment intent created");

        Ok(PaymentIntent {
            intent_id: created.id,
            amount_minor: created.amount,
            currency: created.currency,
        })
    }
}
