#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use order_reconciler::{
    clients::{CarrierGateway, PaymentGateway, PaymentIntentClient, ShipmentClient},
    config::AppConfig,
    models::{LineItem, Order, PaymentRecord, ShippingAddress, ShippingRecord},
    repositories::{InMemoryOrderStore, OrderStore},
    webhooks::authenticator_from_config,
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const SIGNATURE_HEADER: &str = "x-shiprocket-signature";

/// Router over the in-memory store, with the payment gateway and carrier
/// pointed at wiremock servers when requested.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryOrderStore>,
}

#[derive(Default)]
pub struct TestAppBuilder {
    payment_gateway: Option<String>,
    carrier: Option<String>,
    webhook_secret: bool,
    auto_ship: bool,
}

impl TestAppBuilder {
    pub fn payment_gateway(mut self, server: &MockServer) -> Self {
        self.payment_gateway = Some(server.uri());
        self
    }

    pub fn carrier(mut self, server: &MockServer) -> Self {
        self.carrier = Some(server.uri());
        self
    }

    pub fn signed_webhooks(mut self) -> Self {
        self.webhook_secret = true;
        self
    }

    pub fn auto_ship(mut self) -> Self {
        self.auto_ship = true;
        self
    }

    pub fn build(self) -> TestApp {
        let mut cfg = AppConfig::new(
            "memory://".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_ship_on_payment = self.auto_ship;
        if self.webhook_secret {
            cfg.carrier_webhook_secret = Some(WEBHOOK_SECRET.to_string());
            cfg.carrier_webhook_signature_header = SIGNATURE_HEADER.to_string();
        }

        let payments: Option<Arc<dyn PaymentGateway>> = self.payment_gateway.map(|uri| {
            let client = PaymentIntentClient::new(
                uri,
                Some("rzp_test_key"),
                Some("rzp_test_secret"),
                "INR",
                Duration::from_secs(5),
            )
            .expect("payment client");
            Arc::new(client) as Arc<dyn PaymentGateway>
        });
        let carrier: Option<Arc<dyn CarrierGateway>> = self.carrier.map(|uri| {
            let client = ShipmentClient::new(
                uri,
                "ops@shop.test",
                "pw",
                "Primary",
                Duration::from_secs(5),
            )
            .expect("carrier client");
            Arc::new(client) as Arc<dyn CarrierGateway>
        });

        let store = Arc::new(InMemoryOrderStore::new());
        let webhook_auth = authenticator_from_config(&cfg);
        let state = AppState::new(cfg, store.clone(), payments, carrier, webhook_auth);

        let router = Router::new()
            .nest("/api/v1", order_reconciler::api_v1_routes())
            .layer(axum::middleware::from_fn(
                order_reconciler::middleware_helpers::request_id_middleware,
            ))
            .with_state(state.clone());

        TestApp {
            router,
            state,
            store,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let bytes = body
            .map(|json| serde_json::to_vec(&json).expect("serialize request body"))
            .unwrap_or_default();
        self.request_raw(method, uri, bytes, &[]).await
    }

    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn post_webhook(&self, payload: &Value) -> Response {
        self.request(Method::POST, "/api/v1/webhooks/carrier", Some(payload.clone()))
            .await
    }

    /// Stores a placed order, optionally paid and with a shipping record.
    pub async fn seed_order(&self, paid: bool, shipping: Option<ShippingRecord>) -> Order {
        let mut order = Order::placed(
            Decimal::new(99800, 2),
            vec![sample_item()],
            sample_address(),
        );
        if paid {
            order.payment = Some(PaymentRecord::completed(chrono::Utc::now()));
        }
        order.shipping = shipping;
        self.store.insert(order).await.expect("seed order")
    }

    pub async fn order(&self, id: Uuid) -> Order {
        self.store
            .find_by_id(id)
            .await
            .expect("store read")
            .expect("order exists")
    }
}

pub fn shipped_with(shipment_id: &str, awb: Option<&str>) -> ShippingRecord {
    ShippingRecord {
        shipment_id: Some(shipment_id.to_string()),
        awb_code: awb.map(str::to_string),
        ..Default::default()
    }
}

pub fn sample_item() -> LineItem {
    LineItem {
        product_id: "prod-kurta".to_string(),
        name: "Cotton Kurta".to_string(),
        sku: Some("KUR-M-BLU".to_string()),
        quantity: 2,
        unit_price: Decimal::new(499, 0),
    }
}

pub fn sample_address() -> ShippingAddress {
    ShippingAddress {
        name: "Anita Rao".to_string(),
        phone: "9812345678".to_string(),
        email: Some("anita@example.com".to_string()),
        line1: "5 Brigade Road".to_string(),
        line2: None,
        city: "Bengaluru".to_string(),
        state: "KA".to_string(),
        postal_code: "560001".to_string(),
        country: "India".to_string(),
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn mount_carrier_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/external/auth/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "tok-test" })),
        )
        .mount(server)
        .await;
}
