//! Outbound HTTP clients for the payment gateway and the carrier aggregator.
//!
//! Neither client retries; retry policy belongs to whoever called them.

pub mod carrier;
pub mod payment;

pub use carrier::{
    parse_carrier_timestamp, AwbAssignment, CarrierGateway, ShipmentClient, ShipmentHandle,
    ShipmentRequest, TrackingLookup, TrackingSnapshot,
};
pub use payment::{PaymentGateway, PaymentIntent, PaymentIntentClient};
