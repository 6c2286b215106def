use crate::clients::{
    CarrierGateway, ShipmentHandle, ShipmentRequest, TrackingLookup, TrackingSnapshot,
};
use crate::errors::ServiceError;
use crate::models::Order;
use crate::repositories::{OrderPatch, OrderStore, ShippingPatch};
use crate::services::reconciliation::{reconcile, Reconciled, TrackingUpdate};
use metrics::counter;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

fn tracking_update(order: &Order, snapshot: TrackingSnapshot) -> TrackingUpdate {
    TrackingUpdate {
        awb_code: snapshot.awb_code,
        shipment_id: order.shipment_id().map(str::to_string),
        status_code: snapshot.status_code,
        current_status: snapshot.current_status,
        location: snapshot.location,
        courier: snapshot.courier,
        timestamp: snapshot.timestamp,
        delivered_date: snapshot.delivered_date,
        pickup_date: snapshot.pickup_date,
        tracking_url: snapshot.tracking_url,
        ..Default::default()
    }
}

/// Books carrier shipments for orders and pulls tracking on demand.
#[derive(Clone)]
pub struct ShipmentOrchestrator {
    store: Arc<dyn OrderStore>,
    carrier: Arc<dyn CarrierGateway>,
}

impl ShipmentOrchestrator {
    pub fn new(store: Arc<dyn OrderStore>, carrier: Arc<dyn CarrierGateway>) -> Self {
        Self { store, carrier }
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Creates the carrier shipment for `order_id` and records its identifiers.
    ///
    /// With `automate`, a waybill is requested right away. The shipment is
    /// recorded even if that request fails, since it already exists on the
    /// carrier side; the waybill then arrives with the first tracking event.
    #[instrument(skip(self))]
    pub async fn create_shipment_for_order(
        &self,
        order_id: Uuid,
        automate: bool,
    ) -> Result<ShipmentHandle, ServiceError> {
        let order = self.load(order_id).await?;
        if order.shipment_id().is_some() {
            return Err(ServiceError::AlreadyShipped(order_id));
        }

        let request = ShipmentRequest {
            order_id,
            order_date: order.created_at,
            address: order.shipping_address.clone(),
            items: order.items.clone(),
            sub_total: order.total_amount,
            prepaid: order.is_paid(),
        };
        let mut handle = self.carrier.create_shipment(&request).await?;

        if automate && handle.awb_code.is_none() {
            match self.carrier.assign_awb(&handle.shipment_id).await {
                Ok(assignment) => {
                    handle.awb_code = Some(assignment.awb_code);
                    if assignment.courier.is_some() {
                        handle.courier = assignment.courier;
                    }
                }
                Err(e) => warn!(
                    shipment_id = %handle.shipment_id,
                    error = %e,
                    "waybill assignment failed; shipment recorded without one"
                ),
            }
        }

        let patch = OrderPatch {
            shipping: ShippingPatch {
                shipment_id: Some(handle.shipment_id.clone()),
                awb_code: handle.awb_code.clone(),
                courier: handle.courier.clone(),
                tracking_url: handle.tracking_url.clone(),
                ..Default::default()
            },
            require_no_shipment: true,
            ..Default::default()
        };

        match self.store.update_atomic(order_id, patch).await {
            Ok(Some(_)) => {
                info!(shipment_id = %handle.shipment_id, awb = ?handle.awb_code, "shipment recorded");
                Ok(handle)
            }
            Ok(None) => Err(ServiceError::NotFound(format!("Order {} not found", order_id))),
            Err(e) => {
                error!(
                    shipment_id = %handle.shipment_id,
                    error = %e,
                    "carrier shipment created but not recorded"
                );
                Err(e)
            }
        }
    }

    /// Pulls the current tracking state from the carrier and applies it the
    /// same way a webhook delivery would be applied.
    #[instrument(skip(self))]
    pub async fn refresh_tracking(&self, order_id: Uuid) -> Result<Reconciled, ServiceError> {
        let order = self.load(order_id).await?;
        let lookup = match (order.awb_code(), order.shipment_id()) {
            (Some(awb), _) => TrackingLookup::Awb(awb.to_string()),
            (None, Some(shipment_id)) => TrackingLookup::Shipment(shipment_id.to_string()),
            (None, None) => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Order {} has no shipment to track",
                    order_id
                )))
            }
        };

        let snapshot = self.carrier.fetch_tracking(&lookup).await?;
        counter!("order_reconciler.tracking.refreshes", 1);

        let update = tracking_update(&order, snapshot);
        reconcile(self.store.as_ref(), &order, &update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::AwbAssignment;
    use crate::models::{
        OrderStatus, PaymentRecord, ShippingAddress, ShippingRecord, ShippingStatus,
    };
    use crate::repositories::InMemoryOrderStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use mockall::mock;
    use rust_decimal::Decimal;

    mock! {
        pub Carrier {}
        #[async_trait]
        impl CarrierGateway for Carrier {
            async fn create_shipment(&self, request: &ShipmentRequest) -> Result<ShipmentHandle, ServiceError>;
            async fn assign_awb(&self, shipment_id: &str) -> Result<AwbAssignment, ServiceError>;
            async fn fetch_tracking(&self, lookup: &TrackingLookup) -> Result<TrackingSnapshot, ServiceError>;
        }
    }

    fn paid_order() -> Order {
        let mut order = Order::placed(
            Decimal::new(2400, 0),
            vec![],
            ShippingAddress {
                name: "Tara Menon".into(),
                phone: "9445566778".into(),
                email: None,
                line1: "9 Marine Drive".into(),
                line2: None,
                city: "Kochi".into(),
                state: "KL".into(),
                postal_code: "682031".into(),
                country: "India".into(),
            },
        );
        order.payment = Some(PaymentRecord::completed(Utc::now()));
        order
    }

    fn handle(id: &str) -> ShipmentHandle {
        ShipmentHandle {
            shipment_id: id.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn records_shipment_and_waybill_when_automated() {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = store.insert(paid_order()).await.unwrap();

        let mut carrier = MockCarrier::new();
        carrier
            .expect_create_shipment()
            .withf(|req| req.prepaid)
            .times(1)
            .returning(|_| Ok(handle("SR-42")));
        carrier
            .expect_assign_awb()
            .withf(|id| id == "SR-42")
            .times(1)
            .returning(|_| {
                Ok(AwbAssignment {
                    awb_code: "AWB42".into(),
                    courier: Some("Ekart".into()),
                })
            });

        let orchestrator = ShipmentOrchestrator::new(store.clone(), Arc::new(carrier));
        let result = orchestrator
            .create_shipment_for_order(order.id, true)
            .await
            .unwrap();
        assert_eq!(result.awb_code.as_deref(), Some("AWB42"));

        let stored = store.find_by_id(order.id).await.unwrap().unwrap();
        let shipping = stored.shipping.unwrap();
        assert_eq!(shipping.shipment_id.as_deref(), Some("SR-42"));
        assert_eq!(shipping.awb_code.as_deref(), Some("AWB42"));
        assert_eq!(shipping.courier.as_deref(), Some("Ekart"));
        assert_eq!(shipping.status, None);
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn manual_creation_skips_waybill() {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = store.insert(paid_order()).await.unwrap();

        let mut carrier = MockCarrier::new();
        carrier
            .expect_create_shipment()
            .times(1)
            .returning(|_| Ok(handle("SR-1")));
        carrier.expect_assign_awb().times(0);

        let orchestrator = ShipmentOrchestrator::new(store.clone(), Arc::new(carrier));
        orchestrator
            .create_shipment_for_order(order.id, false)
            .await
            .unwrap();
        let stored = store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.awb_code(), None);
        assert_eq!(stored.shipment_id(), Some("SR-1"));
    }

    #[tokio::test]
    async fn failed_waybill_assignment_still_records_shipment() {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = store.insert(paid_order()).await.unwrap();

        let mut carrier = MockCarrier::new();
        carrier
            .expect_create_shipment()
            .returning(|_| Ok(handle("SR-7")));
        carrier
            .expect_assign_awb()
            .returning(|_| Err(ServiceError::CarrierError("no courier serviceable".into())));

        let orchestrator = ShipmentOrchestrator::new(store.clone(), Arc::new(carrier));
        let result = orchestrator
            .create_shipment_for_order(order.id, true)
            .await
            .unwrap();
        assert_eq!(result.awb_code, None);
        let stored = store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.shipment_id(), Some("SR-7"));
    }

    #[tokio::test]
    async fn already_shipped_makes_no_carrier_call_and_no_mutation() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut existing = paid_order();
        existing.shipping = Some(ShippingRecord {
            shipment_id: Some("SR-1".into()),
            ..Default::default()
        });
        let order = store.insert(existing).await.unwrap();

        let mut carrier = MockCarrier::new();
        carrier.expect_create_shipment().times(0);

        let orchestrator = ShipmentOrchestrator::new(store.clone(), Arc::new(carrier));
        assert_matches!(
            orchestrator.create_shipment_for_order(order.id, true).await,
            Err(ServiceError::AlreadyShipped(id)) if id == order.id
        );
        assert_eq!(store.find_by_id(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn carrier_failure_leaves_order_untouched() {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = store.insert(paid_order()).await.unwrap();

        let mut carrier = MockCarrier::new();
        carrier
            .expect_create_shipment()
            .returning(|_| Err(ServiceError::CarrierError("pincode not serviceable".into())));

        let orchestrator = ShipmentOrchestrator::new(store.clone(), Arc::new(carrier));
        assert_matches!(
            orchestrator.create_shipment_for_order(order.id, false).await,
            Err(ServiceError::CarrierError(_))
        );
        assert_eq!(store.find_by_id(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let orchestrator = ShipmentOrchestrator::new(
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(MockCarrier::new()),
        );
        assert_matches!(
            orchestrator
                .create_shipment_for_order(Uuid::new_v4(), false)
                .await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn refresh_requires_a_shipment() {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = store.insert(paid_order()).await.unwrap();
        let mut carrier = MockCarrier::new();
        carrier.expect_fetch_tracking().times(0);

        let orchestrator = ShipmentOrchestrator::new(store, Arc::new(carrier));
        assert_matches!(
            orchestrator.refresh_tracking(order.id).await,
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[tokio::test]
    async fn refresh_applies_snapshot_and_is_idempotent() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut existing = paid_order();
        existing.shipping = Some(ShippingRecord {
            shipment_id: Some("SR-9".into()),
            ..Default::default()
        });
        let order = store.insert(existing).await.unwrap();

        let mut carrier = MockCarrier::new();
        carrier
            .expect_fetch_tracking()
            .withf(|lookup| matches!(lookup, TrackingLookup::Shipment(id) if id == "SR-9"))
            .times(1)
            .returning(|_| {
                Ok(TrackingSnapshot {
                    awb_code: Some("AWB9".into()),
                    status_code: Some(6),
                    current_status: Some("Delivered".into()),
                    location: Some("Kochi".into()),
                    timestamp: Some(Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()),
                    delivered_date: Some(Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()),
                    tracking_url: Some("https://track.example/AWB9".into()),
                    ..Default::default()
                })
            });
        // Once the waybill is known it is used for the lookup.
        carrier
            .expect_fetch_tracking()
            .withf(|lookup| matches!(lookup, TrackingLookup::Awb(awb) if awb == "AWB9"))
            .times(1)
            .returning(|_| {
                Ok(TrackingSnapshot {
                    awb_code: Some("AWB9".into()),
                    status_code: Some(6),
                    current_status: Some("Delivered".into()),
                    location: Some("Kochi".into()),
                    timestamp: Some(Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()),
                    ..Default::default()
                })
            });

        let orchestrator = ShipmentOrchestrator::new(store.clone(), Arc::new(carrier));
        let first = orchestrator.refresh_tracking(order.id).await.unwrap();
        assert!(!first.duplicate);
        assert_eq!(first.order.status, OrderStatus::Delivered);
        let shipping = first.order.shipping.clone().unwrap();
        assert_eq!(shipping.status, Some(ShippingStatus::Delivered));
        assert_eq!(shipping.awb_code.as_deref(), Some("AWB9"));
        assert!(shipping.delivered_at.is_some());
        assert_eq!(shipping.tracking_url.as_deref(), Some("https://track.example/AWB9"));

        let second = orchestrator.refresh_tracking(order.id).await.unwrap();
        assert!(second.duplicate);
        assert_eq!(second.order.tracking_history().len(), 1);
    }
}
