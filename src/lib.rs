//! Order & Shipment Reconciliation Engine
//!
//! Keeps a storefront's orders consistent with the payment gateway and the
//! shipping carrier: payment intents, shipment creation, and idempotent
//! ingestion of carrier tracking webhooks.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::clients::{CarrierGateway, PaymentGateway};
use crate::repositories::OrderStore;
use crate::services::orders::OrderService;
use crate::services::shipments::ShipmentOrchestrator;
use crate::webhooks::{WebhookAuthenticator, WebhookIngestor};

/// Shared state handed to every handler.
///
/// The payment gateway and the carrier are optional: a deployment without
/// credentials keeps serving webhooks and orders, and the affected
/// endpoints answer 503.
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn OrderStore>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub shipments: Option<ShipmentOrchestrator>,
    pub webhook_auth: Arc<dyn WebhookAuthenticator>,
    pub ingestor: WebhookIngestor,
    pub orders: OrderService,
}

impl AppState {
    pub fn new(
        config: config::AppConfig,
        store: Arc<dyn OrderStore>,
        payments: Option<Arc<dyn PaymentGateway>>,
        carrier: Option<Arc<dyn CarrierGateway>>,
        webhook_auth: Arc<dyn WebhookAuthenticator>,
    ) -> Self {
        let shipments = carrier.map(|carrier| ShipmentOrchestrator::new(store.clone(), carrier));
        let orders = OrderService::new(
            store.clone(),
            shipments.clone(),
            config.auto_ship_on_payment,
        );
        Self {
            ingestor: WebhookIngestor::new(store.clone()),
            config,
            store,
            payments,
            shipments,
            webhook_auth,
            orders,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Orders
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/payment/confirm",
            post(handlers::orders::confirm_payment),
        )
        // Payment gateway
        .route("/payments/create", post(handlers::payments::create_payment))
        // Carrier
        .route("/shipping/create", post(handlers::shipping::create_shipment))
        .route(
            "/shipping/track/:order_id",
            post(handlers::shipping::refresh_tracking),
        )
        .route(
            "/webhooks/carrier",
            post(handlers::carrier_webhooks::carrier_webhook),
        )
}

async fn api_status(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "build_time": option_env!("BUILD_TIME").unwrap_or("unknown"),
        "service": "order-reconciler",
        "environment": state.config.environment,
        "integrations": {
            "payment_gateway": state.payments.is_some(),
            "carrier": state.shipments.is_some(),
            "webhook_auth": state.webhook_auth.name(),
            "auto_ship_on_payment": state.config.auto_ship_on_payment,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Json(ApiResponse::success(status_data))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "order store health check failed");
            "unhealthy"
        }
    };
    let code = if store_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let health_data = json!({
        "status": store_status,
        "checks": { "store": store_status },
        "timestamp": Utc::now().to_rfc3339(),
    });

    (code, Json(ApiResponse::success(health_data)))
}
