mod common;

use axum::http::{Method, StatusCode};
use order_reconciler::models::{OrderStatus, ShippingStatus};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{json_body, mount_carrier_login, shipped_with, TestApp};

async fn mount_adhoc_order(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/external/orders/create/adhoc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": 9001,
            "shipment_id": 7001,
            "status": "NEW",
            "awb_code": "",
            "courier_name": ""
        })))
        .expect(expected)
        .mount(server)
        .await;
}

fn tracking_body(code: &str, date: &str) -> serde_json::Value {
    json!({
        "tracking_data": {
            "track_status": 1,
            "shipment_status": 42,
            "shipment_track": [{
                "awb_code": "AWB1",
                "courier_name": "Bluedart",
                "current_status": "In Transit"
            }],
            "shipment_track_activities": [{
                "date": date,
                "activity": "In Transit",
                "location": "Hub A",
                "sr-status": code
            }],
            "track_url": "https://track.example/AWB1"
        }
    })
}

#[tokio::test]
async fn automated_creation_records_shipment_and_waybill() {
    let carrier = MockServer::start().await;
    mount_carrier_login(&carrier).await;
    mount_adhoc_order(&carrier, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/external/courier/assign/awb"))
        .and(body_partial_json(json!({ "shipment_id": "7001" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "awb_assign_status": 1,
            "response": { "data": { "awb_code": "AWB7001", "courier_name": "Xpressbees" } }
        })))
        .expect(1)
        .mount(&carrier)
        .await;

    let app = TestApp::builder().carrier(&carrier).build();
    let order = app.seed_order(true, None).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/shipping/create",
            Some(json!({ "orderId": order.id, "automate": true })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["shipment"]["shipmentId"], "7001");
    assert_eq!(body["shipment"]["awbCode"], "AWB7001");

    let stored = app.order(order.id).await;
    assert_eq!(stored.shipment_id(), Some("7001"));
    assert_eq!(stored.awb_code(), Some("AWB7001"));
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn already_shipped_order_is_conflict_without_carrier_call() {
    let carrier = MockServer::start().await;
    mount_carrier_login(&carrier).await;
    mount_adhoc_order(&carrier, 0).await;

    let app = TestApp::builder().carrier(&carrier).build();
    let order = app.seed_order(true, Some(shipped_with("SR1", Some("AWB1")))).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/shipping/create",
            Some(json!({ "orderId": order.id, "automate": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(json_body(response).await["error"]
        .as_str()
        .unwrap()
        .contains("already has a shipment"));
    assert_eq!(app.order(order.id).await, order);
}

#[tokio::test]
async fn carrier_rejection_is_reported_as_error_body() {
    let carrier = MockServer::start().await;
    mount_carrier_login(&carrier).await;
    Mock::given(method("POST"))
        .and(path("/v1/external/orders/create/adhoc"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({ "message": "Delivery postcode not serviceable" })),
        )
        .mount(&carrier)
        .await;

    let app = TestApp::builder().carrier(&carrier).build();
    let order = app.seed_order(true, None).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/shipping/create",
            Some(json!({ "orderId": order.id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(json_body(response).await["error"]
        .as_str()
        .unwrap()
        .contains("Delivery postcode not serviceable"));
    assert_eq!(app.order(order.id).await.shipping, None);
}

#[tokio::test]
async fn shipping_endpoints_need_a_carrier_account() {
    let app = TestApp::new();
    let order = app.seed_order(true, None).await;

    let create = app
        .request(
            Method::POST,
            "/api/v1/shipping/create",
            Some(json!({ "orderId": order.id })),
        )
        .await;
    assert_eq!(create.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json_body(create).await["error"],
        "Carrier account not configured"
    );

    let track = app
        .request(
            Method::POST,
            &format!("/api/v1/shipping/track/{}", order.id),
            None,
        )
        .await;
    assert_eq!(track.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(track).await["success"], false);
}

#[tokio::test]
async fn create_requires_an_order_id() {
    let carrier = MockServer::start().await;
    let app = TestApp::builder().carrier(&carrier).build();
    let response = app
        .request(
            Method::POST,
            "/api/v1/shipping/create",
            Some(json!({ "automate": true })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn refresh_and_webhook_share_deduplication() {
    let carrier = MockServer::start().await;
    mount_carrier_login(&carrier).await;
    Mock::given(method("GET"))
        .and(path("/v1/external/courier/track/awb/AWB1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(tracking_body("3", "2025-01-02 00:00:00")),
        )
        .expect(1)
        .mount(&carrier)
        .await;

    let app = TestApp::builder().carrier(&carrier).build();
    let order = app.seed_order(true, Some(shipped_with("SR1", Some("AWB1")))).await;

    let webhook = app
        .post_webhook(&json!({
            "awb": "AWB1",
            "current_status_code": 3,
            "current_status": "In Transit",
            "location": "Hub A",
            "current_timestamp": "2025-01-02T00:00:00Z"
        }))
        .await;
    assert_eq!(webhook.status(), StatusCode::OK);

    let refresh = app
        .request(
            Method::POST,
            &format!("/api/v1/shipping/track/{}", order.id),
            None,
        )
        .await;
    assert_eq!(refresh.status(), StatusCode::OK);
    assert_eq!(json_body(refresh).await["success"], true);

    let stored = app.order(order.id).await;
    let shipping = stored.shipping.clone().unwrap();
    assert_eq!(stored.tracking_history().len(), 1);
    assert_eq!(stored.status, OrderStatus::Shipped);
    assert_eq!(shipping.status, Some(ShippingStatus::Shipped));
    assert_eq!(shipping.courier.as_deref(), Some("Bluedart"));
    assert_eq!(
        shipping.tracking_url.as_deref(),
        Some("https://track.example/AWB1")
    );
}

#[tokio::test]
async fn refresh_without_shipment_fails() {
    let carrier = MockServer::start().await;
    let app = TestApp::builder().carrier(&carrier).build();
    let order = app.seed_order(true, None).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/shipping/track/{}", order.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let missing = app
        .request(
            Method::POST,
            &format!("/api/v1/shipping/track/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
