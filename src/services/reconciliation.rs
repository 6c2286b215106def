//! Applying carrier tracking information to an order.
//!
//! Webhook deliveries and manual tracking refreshes both normalize their input
//! into a [`TrackingUpdate`] and go through [`reconcile`], so the two paths
//! cannot drift apart.

use crate::errors::ServiceError;
use crate::models::{Order, TrackingEvent};
use crate::repositories::{OrderPatch, OrderStore, ShippingPatch};
use crate::services::status_mapping::{is_pickup_code, map_carrier_status, DELIVERED_CODE};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

/// Carrier tracking information in a source-independent shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingUpdate {
    pub awb_code: Option<String>,
    pub shipment_id: Option<String>,
    /// Numeric code, used for the status table and the date gates.
    pub status_code: Option<i64>,
    /// Code as the carrier sent it; recorded in the history even when it is
    /// not a number.
    pub status_text: Option<String>,
    pub current_status: Option<String>,
    pub location: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub courier: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub pickup_date: Option<DateTime<Utc>>,
    pub tracking_url: Option<String>,
}

impl TrackingUpdate {
    /// History entry for this update. Without a carrier timestamp the event is
    /// stamped with `now`.
    pub fn tracking_event(&self, now: DateTime<Utc>) -> TrackingEvent {
        TrackingEvent {
            activity: self.current_status.clone(),
            location: self
                .location
                .clone()
                .or_else(|| self.origin.clone())
                .or_else(|| self.destination.clone()),
            timestamp: self.timestamp.unwrap_or(now),
            status_code: self
                .status_text
                .clone()
                .or_else(|| self.status_code.map(|c| c.to_string())),
        }
    }
}

/// The order after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub order: Order,
    /// The event was already in the history; nothing was appended.
    pub duplicate: bool,
}

/// Computes the single patch that applies `update` to `order`.
pub fn build_patch(order: &Order, update: &TrackingUpdate, now: DateTime<Utc>) -> OrderPatch {
    let event = update.tracking_event(now);
    let mapped = update.status_code.and_then(map_carrier_status);

    let mut shipping = ShippingPatch {
        current_location: update
            .current_status
            .clone()
            .or_else(|| update.location.clone()),
        last_update_at: Some(event.timestamp),
        status: mapped.map(|(shipping, _)| shipping),
        courier: update.courier.clone(),
        tracking_url: update.tracking_url.clone(),
        ..Default::default()
    };

    if update.status_code == Some(DELIVERED_CODE) {
        shipping.delivered_at = update.delivered_date;
    }
    if update.status_code.map(is_pickup_code).unwrap_or(false) {
        shipping.picked_up_at = update.pickup_date;
    }

    // A waybill assigned after shipment creation is learned from tracking.
    if order.shipment_id().is_some() && order.awb_code().is_none() {
        shipping.awb_code = update.awb_code.clone();
    }

    OrderPatch {
        status: mapped.map(|(_, status)| status),
        shipping,
        push_tracking_event: Some(event),
        ..Default::default()
    }
}

/// Applies `update` to `order` in one atomic store write.
#[instrument(skip(store, order, update), fields(order_id = %order.id, status_code = ?update.status_code))]
pub async fn reconcile(
    store: &dyn OrderStore,
    order: &Order,
    update: &TrackingUpdate,
) -> Result<Reconciled, ServiceError> {
    let patch = build_patch(order, update, Utc::now());

    if let Some(next) = patch.status {
        if order.status.is_regression_to(next) {
            // Carrier is the source of record; accepted but worth seeing.
            warn!(
                from = %order.status,
                to = %next,
                "carrier event moves order status backwards"
            );
        }
    }

    let result = store
        .update_atomic(order.id, patch)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order.id)))?;

    debug!(
        appended = result.event_appended,
        status = %result.order.status,
        "tracking update applied"
    );

    Ok(Reconciled {
        duplicate: !result.event_appended,
        order: result.order,
    })
}
