use crate::clients::ShipmentHandle;
use crate::errors::ServiceError;
use crate::models::{LineItem, Order, PaymentRecord, ShippingAddress};
use crate::repositories::{OrderPatch, OrderStore};
use crate::services::shipments::ShipmentOrchestrator;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Checkout hand-off: the buyer's cart and address.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
}

impl CreateOrderRequest {
    fn check_contents(&self) -> Result<Decimal, ServiceError> {
        let address = &self.shipping_address;
        let required = [
            ("name", &address.name),
            ("phone", &address.phone),
            ("line1", &address.line1),
            ("city", &address.city),
            ("state", &address.state),
            ("postalCode", &address.postal_code),
            ("country", &address.country),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ServiceError::ValidationError(format!(
                "shippingAddress.{} is required",
                field
            )));
        }

        let mut total = Decimal::ZERO;
        for item in &self.items {
            if item.quantity == 0 || item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "invalid quantity or price for item {}",
                    item.product_id
                )));
            }
            total = item
                .unit_price
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| {
                    ServiceError::ValidationError("Order total is out of range".to_string())
                })?;
        }
        if total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Order total must be positive".to_string(),
            ));
        }
        Ok(total)
    }
}

/// Result of confirming a payment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub order: Order,
    /// Shipment booked automatically after the payment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub shipment: Option<ShipmentHandle>,
    /// Why automatic shipment creation did not happen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_error: Option<String>,
}

/// Order placement and the payment-confirmation collaborator.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    orchestrator: Option<ShipmentOrchestrator>,
    auto_ship_on_payment: bool,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        orchestrator: Option<ShipmentOrchestrator>,
        auto_ship_on_payment: bool,
    ) -> Self {
        Self {
            store,
            orchestrator,
            auto_ship_on_payment,
        }
    }

    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn place_order(&self, request: CreateOrderRequest) -> Result<Order, ServiceError> {
        request.validate()?;
        let total = request.check_contents()?;

        let order = self
            .store
            .insert(Order::placed(total, request.items, request.shipping_address))
            .await?;
        info!(order_id = %order.id, total = %order.total_amount, "order placed");
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError> {
        self.store.list(page.max(1), per_page.clamp(1, 100)).await
    }

    /// Marks the order's payment as completed. `status` is left alone;
    /// confirming an already paid order keeps the original `paidAt`.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm_payment(&self, order_id: Uuid) -> Result<PaymentConfirmation, ServiceError> {
        let existing = self.get_order(order_id).await?;

        let order = if existing.is_paid() {
            existing
        } else {
            let patch = OrderPatch {
                payment: Some(PaymentRecord::completed(Utc::now())),
                ..Default::default()
            };
            self.store
                .update_atomic(order_id, patch)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?
                .order
        };
        info!("payment confirmed");

        if !self.auto_ship_on_payment {
            return Ok(PaymentConfirmation {
                order,
                shipment: None,
                shipment_error: None,
            });
        }

        let Some(orchestrator) = &self.orchestrator else {
            warn!("automatic shipping enabled but no carrier is configured");
            return Ok(PaymentConfirmation {
                order,
                shipment: None,
                shipment_error: Some("Carrier not configured".to_string()),
            });
        };

        let (shipment, shipment_error) =
            match orchestrator.create_shipment_for_order(order_id, true).await {
                Ok(handle) => (Some(handle), None),
                Err(ServiceError::AlreadyShipped(_)) => (None, None),
                Err(e) => {
                    error!(error = %e, "automatic shipment creation failed");
                    (None, Some(e.response_message()))
                }
            };

        // Re-read so the response shows the recorded shipment.
        let order = match shipment {
            Some(_) => self.get_order(order_id).await?,
            None => order,
        };

        Ok(PaymentConfirmation {
            order,
            shipment,
            shipment_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        AwbAssignment, CarrierGateway, ShipmentRequest, TrackingLookup, TrackingSnapshot,
    };
    use crate::models::{OrderStatus, PaymentStatus, ShippingRecord};
    use crate::repositories::InMemoryOrderStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct StubCarrier {
        fail: bool,
    }

    #[async_trait]
    impl CarrierGateway for StubCarrier {
        async fn create_shipment(
            &self,
            _request: &ShipmentRequest,
        ) -> Result<ShipmentHandle, ServiceError> {
            if self.fail {
                return Err(ServiceError::CarrierError("carrier down".into()));
            }
            Ok(ShipmentHandle {
                shipment_id: "SR-AUTO".into(),
                ..Default::default()
            })
        }

        async fn assign_awb(&self, _shipment_id: &str) -> Result<AwbAssignment, ServiceError> {
            Ok(AwbAssignment {
                awb_code: "AWB-AUTO".into(),
                courier: None,
            })
        }

        async fn fetch_tracking(
            &self,
            _lookup: &TrackingLookup,
        ) -> Result<TrackingSnapshot, ServiceError> {
            Err(ServiceError::CarrierError("unused".into()))
        }
    }

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            items: vec![
                LineItem {
                    product_id: "p-1".into(),
                    name: "Saree".into(),
                    sku: Some("SAR-RED".into()),
                    quantity: 1,
                    unit_price: dec!(1899.50),
                },
                LineItem {
                    product_id: "p-2".into(),
                    name: "Dupatta".into(),
                    sku: None,
                    quantity: 2,
                    unit_price: dec!(250),
                },
            ],
            shipping_address: ShippingAddress {
                name: "Lakshmi Iyer".into(),
                phone: "9840012345".into(),
                email: None,
                line1: "14 TTK Road".into(),
                line2: None,
                city: "Chennai".into(),
                state: "TN".into(),
                postal_code: "600018".into(),
                country: "India".into(),
            },
        }
    }

    fn service(auto_ship: bool, carrier: Option<StubCarrier>) -> (OrderService, Arc<InMemoryOrderStore>) {
        let store = Arc::new(InMemoryOrderStore::new());
        let orchestrator = carrier.map(|c| ShipmentOrchestrator::new(store.clone(), Arc::new(c)));
        (OrderService::new(store.clone(), orchestrator, auto_ship), store)
    }

    #[tokio::test]
    async fn places_pending_order_with_computed_total() {
        let (service, _) = service(false, None);
        let order = service.place_order(request()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, dec!(2399.50));
        assert_eq!(order.payment.unwrap().status, PaymentStatus::Pending);
        assert!(order.shipping.is_none());
    }

    #[tokio::test]
    async fn rejects_empty_cart_and_missing_address_fields() {
        let (service, store) = service(false, None);
        let mut empty = request();
        empty.items.clear();
        assert_matches!(
            service.place_order(empty).await,
            Err(ServiceError::ValidationError(_))
        );

        let mut no_city = request();
        no_city.shipping_address.city = " ".into();
        assert_matches!(
            service.place_order(no_city).await,
            Err(ServiceError::ValidationError(msg)) if msg.contains("city")
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn oversized_total_is_rejected_without_insert() {
        let (service, store) = service(false, None);

        let mut huge_line = request();
        huge_line.items[0].quantity = 4_000_000_000;
        huge_line.items[0].unit_price = Decimal::MAX;
        assert_matches!(
            service.place_order(huge_line).await,
            Err(ServiceError::ValidationError(msg)) if msg == "Order total is out of range"
        );

        let mut huge_sum = request();
        huge_sum.items[0].unit_price = Decimal::MAX;
        huge_sum.items[1].unit_price = Decimal::MAX;
        huge_sum.items[1].quantity = 1;
        assert_matches!(
            service.place_order(huge_sum).await,
            Err(ServiceError::ValidationError(_))
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn confirm_payment_keeps_status_and_first_paid_at() {
        let (service, _) = service(false, None);
        let order = service.place_order(request()).await.unwrap();

        let first = service.confirm_payment(order.id).await.unwrap();
        assert_eq!(first.order.status, OrderStatus::Pending);
        let paid_at = first.order.payment.as_ref().and_then(|p| p.paid_at);
        assert!(paid_at.is_some());
        assert!(first.shipment.is_none());

        let second = service.confirm_payment(order.id).await.unwrap();
        assert_eq!(second.order.payment.and_then(|p| p.paid_at), paid_at);
    }

    #[tokio::test]
    async fn auto_ship_books_shipment_after_payment() {
        let (service, store) = service(true, Some(StubCarrier { fail: false }));
        let order = service.place_order(request()).await.unwrap();

        let confirmation = service.confirm_payment(order.id).await.unwrap();
        let handle = confirmation.shipment.unwrap();
        assert_eq!(handle.shipment_id, "SR-AUTO");
        assert_eq!(handle.awb_code.as_deref(), Some("AWB-AUTO"));
        assert_eq!(confirmation.order.shipment_id(), Some("SR-AUTO"));

        let stored = store.find_by_id(order.id).await.unwrap().unwrap();
        assert!(stored.is_paid());
    }

    #[tokio::test]
    async fn auto_ship_failure_does_not_undo_payment() {
        let (service, store) = service(true, Some(StubCarrier { fail: true }));
        let order = service.place_order(request()).await.unwrap();

        let confirmation = service.confirm_payment(order.id).await.unwrap();
        assert!(confirmation.shipment.is_none());
        assert!(confirmation.shipment_error.unwrap().contains("carrier down"));
        assert!(store.find_by_id(order.id).await.unwrap().unwrap().is_paid());
    }

    #[tokio::test]
    async fn auto_ship_ignores_existing_shipment() {
        let (service, store) = service(true, Some(StubCarrier { fail: true }));
        let mut placed = Order::placed(dec!(10), request().items, request().shipping_address);
        placed.shipping = Some(ShippingRecord {
            shipment_id: Some("SR-OLD".into()),
            ..Default::default()
        });
        let order = store.insert(placed).await.unwrap();

        let confirmation = service.confirm_payment(order.id).await.unwrap();
        assert!(confirmation.shipment.is_none());
        assert!(confirmation.shipment_error.is_none());
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (service, _) = service(false, None);
        assert_matches!(
            service.confirm_payment(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
