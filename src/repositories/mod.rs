//! Order persistence.
//!
//! Every mutation goes through [`OrderStore::update_atomic`] with a fully
//! computed [`OrderPatch`]; callers never write back an order they read
//! earlier.

use crate::errors::ServiceError;
use crate::models::{Order, OrderStatus, PaymentRecord, ShippingStatus, TrackingEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod order_repository;

pub use memory::InMemoryOrderStore;
pub use order_repository::SeaOrmOrderStore;

/// Secondary keys an order can be resolved by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLookup {
    AwbCode(String),
    ShipmentId(String),
}

impl OrderLookup {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderLookup::AwbCode(awb) => order.awb_code() == Some(awb.as_str()),
            OrderLookup::ShipmentId(id) => order.shipment_id() == Some(id.as_str()),
        }
    }
}

/// Shipping fields to overwrite. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingPatch {
    pub shipment_id: Option<String>,
    pub awb_code: Option<String>,
    pub courier: Option<String>,
    pub status: Option<ShippingStatus>,
    pub current_location: Option<String>,
    pub tracking_url: Option<String>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_update_at: Option<DateTime<Utc>>,
}

impl ShippingPatch {
    pub fn is_empty(&self) -> bool {
        self == &ShippingPatch::default()
    }
}

/// A single atomic change to one order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment: Option<PaymentRecord>,
    pub shipping: ShippingPatch,
    /// Appended unless an event with the same `(timestamp, statusCode)` is
    /// already persisted.
    pub push_tracking_event: Option<TrackingEvent>,
    /// Fail with `AlreadyShipped` if the stored order has a shipment id.
    pub require_no_shipment: bool,
}

/// Result of a successful patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub order: Order,
    /// False when `push_tracking_event` was suppressed as a duplicate or absent.
    pub event_appended: bool,
}

impl OrderPatch {
    pub fn append_event(event: TrackingEvent) -> Self {
        Self {
            push_tracking_event: Some(event),
            ..Default::default()
        }
    }

    /// Computes the next version of `current`. Pure; both stores call this
    /// while holding their write lock so the check and the write cannot be
    /// interleaved with another patch.
    pub fn apply_to(&self, current: &Order, now: DateTime<Utc>) -> Result<UpdateResult, ServiceError> {
        if self.require_no_shipment && current.shipment_id().is_some() {
            return Err(ServiceError::AlreadyShipped(current.id));
        }

        let mut next = current.clone();
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(payment) = &self.payment {
            next.payment = Some(payment.clone());
        }

        let mut event_appended = false;
        if !self.shipping.is_empty() || self.push_tracking_event.is_some() {
            let shipping = next.shipping.get_or_insert_with(Default::default);
            let patch = &self.shipping;

            macro_rules! overwrite {
                ($($field:ident),+) => {
                    $(if let Some(value) = &patch.$field {
                        shipping.$field = Some(value.clone());
                    })+
                };
            }
            overwrite!(
                shipment_id,
                awb_code,
                courier,
                status,
                current_location,
                tracking_url,
                picked_up_at,
                delivered_at,
                last_update_at
            );

            if let Some(event) = &self.push_tracking_event {
                if !shipping.contains_occurrence(event) {
                    shipping.tracking_history.push(event.clone());
                    event_appended = true;
                }
            }

            if shipping.awb_code.is_some() && shipping.shipment_id.is_none() {
                return Err(ServiceError::InvalidOperation(format!(
                    "order {} cannot carry a waybill without a shipment",
                    current.id
                )));
            }
        }

        if next != *current {
            next.updated_at = now;
        }

        Ok(UpdateResult {
            order: next,
            event_appended,
        })
    }
}

/// Authoritative order record.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<Order, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    async fn find_by_field(&self, lookup: &OrderLookup) -> Result<Option<Order>, ServiceError>;

    /// Newest first. `page` starts at 1. Returns the page and the total count.
    async fn list(&self, page: u64, limit: u64) -> Result<(Vec<Order>, u64), ServiceError>;

    /// Applies `patch` in one atomic write. `Ok(None)` when the order does not exist.
    async fn update_atomic(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<Option<UpdateResult>, ServiceError>;

    /// Appends `event` to the tracking history unless the same occurrence is
    /// already there. Returns whether it was appended.
    async fn append_to_array_if_absent(
        &self,
        id: Uuid,
        event: TrackingEvent,
    ) -> Result<bool, ServiceError> {
        self.update_atomic(id, OrderPatch::append_event(event))
            .await?
            .map(|result| result.event_appended)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
