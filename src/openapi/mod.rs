use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Order Reconciler API",
        version = "0.1.0",
        description = r#"
# Order & Shipment Reconciliation

Keeps orders in step with the payment gateway and the shipping carrier.

- **Payments**: create gateway payment intents for checkout amounts
- **Shipping**: book carrier shipments for paid orders and pull tracking on demand
- **Webhooks**: idempotent ingestion of carrier tracking events
- **Orders**: place orders and confirm their payment

## Error Handling

Order endpoints return the standard error envelope:

```json
{
  "error": "Not Found",
  "message": "Not found: Order 550e8400-e29b-41d4-a716-446655440000 not found",
  "request_id": "req-abc123",
  "timestamp": "2025-01-01T00:00:00Z"
}
```

Payment, shipping and webhook endpoints keep the storefront contract
`{ "error": "..." }`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Order placement and payment confirmation"),
        (name = "payments", description = "Payment gateway intents"),
        (name = "shipping", description = "Carrier shipments and tracking"),
        (name = "webhooks", description = "Carrier callbacks")
    ),
    paths(
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::create_order,
        crate::handlers::orders::confirm_payment,
        crate::handlers::payments::create_payment,
        crate::handlers::shipping::create_shipment,
        crate::handlers::shipping::refresh_tracking,
        crate::handlers::carrier_webhooks::carrier_webhook,
    ),
    components(
        schemas(
            crate::ListQuery,
            crate::models::Order,
            crate::models::OrderStatus,
            crate::models::ShippingStatus,
            crate::models::PaymentStatus,
            crate::models::PaymentRecord,
            crate::models::ShippingRecord,
            crate::models::TrackingEvent,
            crate::models::LineItem,
            crate::models::ShippingAddress,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::PaymentConfirmation,
            crate::handlers::payments::CreatePaymentRequest,
            crate::handlers::payments::PaymentIntentResponse,
            crate::handlers::shipping::CreateShipmentRequest,
            crate::handlers::shipping::CreateShipmentResponse,
            crate::handlers::shipping::TrackingRefreshResponse,
            crate::handlers::carrier_webhooks::WebhookAck,
            crate::errors::ErrorResponse,
            crate::errors::ErrorMessage
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
