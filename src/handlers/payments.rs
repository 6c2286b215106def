use super::{error_message, service_error_message};
use crate::handlers::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::{error, info};
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[schema(example = json!({ "amount": 2399.5 }))]
pub struct CreatePaymentRequest {
    /// Amount in major units; a number or a numeric string
    #[serde(default)]
    #[schema(value_type = f64, example = 2399.5)]
    pub amount: Option<Value>,
}

impl CreatePaymentRequest {
    fn amount(&self) -> Option<Decimal> {
        match self.amount.as_ref()? {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }
}

/// What the checkout widget needs to open the payment sheet.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "id": "order_NX2k1c9f", "amount": 239950, "currency": "INR" }))]
pub struct PaymentIntentResponse {
    pub id: String,
    /// Minor units, as held by the gateway
    pub amount: i64,
    pub currency: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/create",
    summary = "Create payment intent",
    description = "Create a gateway payment intent for the checkout amount",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Intent created", body = PaymentIntentResponse),
        (status = 400, description = "Invalid amount", body = crate::errors::ErrorMessage),
        (status = 502, description = "Gateway rejected the request", body = crate::errors::ErrorMessage),
        (status = 503, description = "Payment gateway not configured", body = crate::errors::ErrorMessage)
    ),
    tag = "payments"
)]
pub async fn create_payment(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(gateway) = state.payments.clone() else {
        return error_message(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payment gateway not configured",
        );
    };

    let request: CreatePaymentRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some(amount) = request.amount().filter(|a| *a > Decimal::ZERO) else {
        return error_message(StatusCode::BAD_REQUEST, "Invalid amount");
    };

    match gateway.create_intent(amount).await {
        Ok(intent) => {
            info!(intent_id = %intent.intent_id, amount_minor = intent.amount_minor, "payment intent created");
            Json(PaymentIntentResponse {
                id: intent.intent_id,
                amount: intent.amount_minor,
                currency: intent.currency,
            })
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "payment intent creation failed");
            service_error_message(&e)
        }
    }
}
