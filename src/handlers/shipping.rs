use super::{error_message, service_error_message};
use crate::clients::ShipmentHandle;
use crate::handlers::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

const CARRIER_NOT_CONFIGURED: &str = "Carrier account not configured";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({ "orderId": "550e8400-e29b-41d4-a716-446655440000", "automate": true }))]
pub struct CreateShipmentRequest {
    pub order_id: Uuid,
    /// Also request a waybill right away
    #[serde(default)]
    pub automate: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub shipment: ShipmentHandle,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TrackingRefreshResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/shipping/create",
    summary = "Create carrier shipment",
    description = "Book the carrier shipment for an order, optionally assigning a waybill",
    request_body = CreateShipmentRequest,
    responses(
        (status = 200, description = "Shipment created and recorded", body = CreateShipmentResponse),
        (status = 400, description = "Malformed request", body = crate::errors::ErrorMessage),
        (status = 404, description = "Order not found", body = crate::errors::ErrorMessage),
        (status = 409, description = "Order already has a shipment", body = crate::errors::ErrorMessage),
        (status = 502, description = "Carrier rejected the request", body = crate::errors::ErrorMessage),
        (status = 503, description = "Carrier not configured", body = crate::errors::ErrorMessage)
    ),
    tag = "shipping"
)]
pub async fn create_shipment(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(orchestrator) = state.shipments.clone() else {
        return error_message(StatusCode::SERVICE_UNAVAILABLE, CARRIER_NOT_CONFIGURED);
    };

    let request: CreateShipmentRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return error_message(StatusCode::BAD_REQUEST, "orderId is required"),
    };

    match orchestrator
        .create_shipment_for_order(request.order_id, request.automate)
        .await
    {
        Ok(shipment) => Json(CreateShipmentResponse {
            success: true,
            shipment,
        })
        .into_response(),
        Err(e) => service_error_message(&e),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/shipping/track/{order_id}",
    summary = "Refresh tracking",
    description = "Pull the carrier's current tracking state for an order and apply it",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Tracking applied", body = TrackingRefreshResponse),
        (status = 400, description = "Order has no shipment", body = TrackingRefreshResponse),
        (status = 404, description = "Order not found", body = TrackingRefreshResponse),
        (status = 502, description = "Carrier lookup failed", body = TrackingRefreshResponse),
        (status = 503, description = "Carrier not configured", body = TrackingRefreshResponse)
    ),
    tag = "shipping"
)]
pub async fn refresh_tracking(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Response {
    let Some(orchestrator) = state.shipments.clone() else {
        return failed(StatusCode::SERVICE_UNAVAILABLE, CARRIER_NOT_CONFIGURED.to_string());
    };

    match orchestrator.refresh_tracking(order_id).await {
        Ok(_) => Json(TrackingRefreshResponse {
            success: true,
            error: None,
        })
        .into_response(),
        Err(e) => {
            warn!(order_id = %order_id, error = %e, "tracking refresh failed");
            failed(e.status_code(), e.response_message())
        }
    }
}

fn failed(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(TrackingRefreshResponse {
            success: false,
            error: Some(error),
        }),
    )
        .into_response()
}
