//! Carrier tracking webhooks: payload normalization and ingestion.

use crate::clients::parse_carrier_timestamp;
use crate::errors::ServiceError;
use crate::models::Order;
use crate::repositories::{OrderLookup, OrderStore};
use crate::services::reconciliation::{reconcile, TrackingUpdate};
use crate::services::status_mapping::parse_status_code;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const WEBHOOK_EVENTS: &str = "order_reconciler.webhook.events";

pub(crate) fn record_outcome(outcome: &'static str) {
    counter!(WEBHOOK_EVENTS, 1, "outcome" => outcome);
}

/// Webhook body as the carrier sends it. Carriers are loose with types, so
/// every field is kept as raw JSON and normalized by [`RawCarrierEvent::into_update`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCarrierEvent {
    #[serde(default)]
    pub awb: Option<Value>,
    #[serde(default)]
    pub shipment_id: Option<Value>,
    #[serde(default)]
    pub current_status_code: Option<Value>,
    #[serde(default)]
    pub current_status: Option<Value>,
    #[serde(default)]
    pub courier_name: Option<Value>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub origin: Option<Value>,
    #[serde(default)]
    pub destination: Option<Value>,
    #[serde(default)]
    pub current_timestamp: Option<Value>,
    #[serde(default)]
    pub delivered_date: Option<Value>,
    #[serde(default)]
    pub pickup_scheduled_date: Option<Value>,
}

/// Non-empty text from a string or number field.
fn text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_date(field: &str, value: &Option<Value>) -> Option<DateTime<Utc>> {
    let raw = text(value)?;
    let parsed = parse_carrier_timestamp(&raw);
    if parsed.is_none() {
        warn!(field, value = %raw, "ignoring unparseable carrier date");
    }
    parsed
}

impl RawCarrierEvent {
    pub fn has_identifier(&self) -> bool {
        text(&self.awb).is_some() || text(&self.shipment_id).is_some()
    }

    /// Normalizes the payload. Fails when neither identifier is present or
    /// `current_timestamp` is present but unreadable.
    pub fn into_update(self) -> Result<TrackingUpdate, ServiceError> {
        if !self.has_identifier() {
            return Err(ServiceError::ValidationError(
                "AWB or Shipment ID required".to_string(),
            ));
        }

        // Unknown codes are not an error: they change no status but are
        // still recorded.
        let raw_code = text(&self.current_status_code);
        let status_code = raw_code.as_deref().and_then(parse_status_code);
        let status_text = match status_code {
            Some(code) => Some(code.to_string()),
            None => raw_code,
        };
        if status_code.is_none() {
            if let Some(raw) = &status_text {
                debug!(code = %raw, "unrecognized carrier status code");
            }
        }

        let timestamp = match text(&self.current_timestamp) {
            None => None,
            Some(raw) => Some(parse_carrier_timestamp(&raw).ok_or_else(|| {
                ServiceError::ValidationError(format!("invalid current_timestamp: {}", raw))
            })?),
        };

        Ok(TrackingUpdate {
            awb_code: text(&self.awb),
            shipment_id: text(&self.shipment_id),
            status_code,
            status_text,
            current_status: text(&self.current_status),
            location: text(&self.location),
            origin: text(&self.origin),
            destination: text(&self.destination),
            courier: text(&self.courier_name),
            timestamp,
            delivered_date: optional_date("delivered_date", &self.delivered_date),
            pickup_date: optional_date("pickup_scheduled_date", &self.pickup_scheduled_date),
            tracking_url: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Processed { order_id: Uuid, duplicate: bool },
    /// No order carries the event's waybill or shipment id.
    OrderNotFound,
}

/// Applies carrier webhook deliveries to the order store. Safe to call any
/// number of times with the same payload.
#[derive(Clone)]
pub struct WebhookIngestor {
    store: Arc<dyn OrderStore>,
}

impl WebhookIngestor {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Waybill first, then shipment id.
    async fn resolve(&self, update: &TrackingUpdate) -> Result<Option<Order>, ServiceError> {
        if let Some(awb) = &update.awb_code {
            if let Some(order) = self
                .store
                .find_by_field(&OrderLookup::AwbCode(awb.clone()))
                .await?
            {
                return Ok(Some(order));
            }
        }
        if let Some(shipment_id) = &update.shipment_id {
            return self
                .store
                .find_by_field(&OrderLookup::ShipmentId(shipment_id.clone()))
                .await;
        }
        Ok(None)
    }

    #[instrument(skip(self, event))]
    pub async fn ingest(&self, event: RawCarrierEvent) -> Result<IngestOutcome, ServiceError> {
        let update = event.into_update().map_err(|e| {
            record_outcome("rejected");
            e
        })?;

        let result = self.apply(&update).await;
        match &result {
            Ok(IngestOutcome::Processed { duplicate: true, .. }) => record_outcome("duplicate"),
            Ok(IngestOutcome::Processed { .. }) => record_outcome("processed"),
            Ok(IngestOutcome::OrderNotFound) => record_outcome("not_found"),
            Err(_) => record_outcome("failed"),
        }
        result
    }

    async fn apply(&self, update: &TrackingUpdate) -> Result<IngestOutcome, ServiceError> {
        let Some(order) = self.resolve(update).await? else {
            info!(
                awb = ?update.awb_code,
                shipment_id = ?update.shipment_id,
                "no order for carrier event"
            );
            return Ok(IngestOutcome::OrderNotFound);
        };

        let reconciled = match reconcile(self.store.as_ref(), &order, update).await {
            Ok(reconciled) => reconciled,
            // Deleted between lookup and write.
            Err(ServiceError::NotFound(_)) => return Ok(IngestOutcome::OrderNotFound),
            Err(e) => return Err(e),
        };

        info!(
            order_id = %order.id,
            status = %reconciled.order.status,
            duplicate = reconciled.duplicate,
            "carrier event applied"
        );
        Ok(IngestOutcome::Processed {
            order_id: order.id,
            duplicate: reconciled.duplicate,
        })
    }
}
