//! Order aggregate as the reconciliation engine sees it.
//!
//! Documents serialize in camelCase because the storefront reads them
//! directly (`shipping.awbCode`, `trackingHistory`, ...).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order lifecycle state.
///
/// `delivered` and `cancelled` are terminal for operator actions, but carrier
/// events may still move an order out of them (the carrier is the source of
/// record for shipping state).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Position along the forward path; cancelled sits beside it.
    pub fn progress_rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Processing => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Delivered => Some(3),
            OrderStatus::Cancelled => None,
        }
    }

    /// True when moving to `next` goes backwards along the forward path
    /// or leaves a terminal state.
    pub fn is_regression_to(&self, next: OrderStatus) -> bool {
        if self == &next {
            return false;
        }
        if self.is_terminal() {
            return true;
        }
        match (self.progress_rank(), next.progress_rank()) {
            (Some(from), Some(to)) => to < from,
            _ => false,
        }
    }
}

/// Carrier-facing shipping sub-status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ShippingStatus {
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn pending() -> Self {
        Self {
            status: PaymentStatus::Pending,
            paid_at: None,
        }
    }

    pub fn completed(at: DateTime<Utc>) -> Self {
        Self {
            status: PaymentStatus::Completed,
            paid_at: Some(at),
        }
    }
}

/// One carrier scan. Two events are the same occurrence iff their
/// timestamp and status code match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
}

impl TrackingEvent {
    pub fn is_same_occurrence(&self, other: &TrackingEvent) -> bool {
        self.timestamp == other.timestamp && self.status_code == other.status_code
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    /// Waybill number; only ever present alongside `shipment_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awb_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ShippingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tracking_history: Vec<TrackingEvent>,
}

impl ShippingRecord {
    pub fn contains_occurrence(&self, event: &TrackingEvent) -> bool {
        self.tracking_history
            .iter()
            .any(|existing| existing.is_same_occurrence(event))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<ShippingRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A freshly placed order: `pending`, payment not yet captured, no shipment.
    pub fn placed(
        total_amount: Decimal,
        items: Vec<LineItem>,
        shipping_address: ShippingAddress,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            total_amount,
            items,
            shipping_address,
            payment: Some(PaymentRecord::pending()),
            shipping: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn shipment_id(&self) -> Option<&str> {
        self.shipping.as_ref().and_then(|s| s.shipment_id.as_deref())
    }

    pub fn awb_code(&self) -> Option<&str> {
        self.shipping.as_ref().and_then(|s| s.awb_code.as_deref())
    }

    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment,
            Some(PaymentRecord {
                status: PaymentStatus::Completed,
                ..
            })
        )
    }

    pub fn tracking_history(&self) -> &[TrackingEvent] {
        self.shipping
            .as_ref()
            .map(|s| s.tracking_history.as_slice())
            .unwrap_or(&[])
    }
}
