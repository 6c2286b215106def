use super::error_message;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::webhooks::carrier::record_outcome;
use crate::webhooks::{IngestOutcome, RawCarrierEvent};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

/// Carrier tracking webhook.
///
/// Status codes drive the carrier's redelivery: 2xx and 404 end it, 5xx asks
/// for another attempt.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/carrier",
    summary = "Carrier tracking webhook",
    description = "Apply a carrier tracking event to the order that carries its waybill or shipment id",
    request_body(content = Object, description = "Carrier payload (awb, shipment_id, current_status_code, current_timestamp, ...)"),
    responses(
        (status = 200, description = "Event applied or already recorded", body = WebhookAck),
        (status = 400, description = "Neither awb nor shipment_id present", body = crate::errors::ErrorMessage),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorMessage),
        (status = 404, description = "No order carries this shipment"),
        (status = 500, description = "Store failure; redeliver", body = crate::errors::ErrorMessage)
    ),
    tag = "webhooks"
)]
pub async fn carrier_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.webhook_auth.verify(&headers, &body) {
        record_outcome("rejected");
        warn!(scheme = state.webhook_auth.name(), "carrier webhook failed verification");
        return error_message(StatusCode::UNAUTHORIZED, "Invalid webhook signature");
    }

    let event: RawCarrierEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            record_outcome("rejected");
            warn!(error = %e, "carrier webhook body is not a JSON object");
            return error_message(StatusCode::BAD_REQUEST, "Invalid webhook payload");
        }
    };

    match state.ingestor.ingest(event).await {
        Ok(IngestOutcome::Processed { .. }) => Json(WebhookAck {
            success: true,
            message: "Webhook processed successfully".to_string(),
        })
        .into_response(),
        Ok(IngestOutcome::OrderNotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Order not found" })),
        )
            .into_response(),
        Err(ServiceError::ValidationError(message)) => {
            error_message(StatusCode::BAD_REQUEST, message)
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "carrier webhook processing failed");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Webhook processing failed")
        }
    }
}
