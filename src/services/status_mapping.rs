//! Carrier status code → (shipping sub-status, order status).

use crate::models::{OrderStatus, ShippingStatus};

/// Carrier status code for "delivered".
pub const DELIVERED_CODE: i64 = 6;
/// Codes on which the carrier reports the parcel as collected.
pub const PICKUP_CODES: [i64; 2] = [2, 3];

/// Looks up the status pair for a carrier code. `None` means the code is
/// unmapped and neither status field should change.
pub fn map_carrier_status(code: i64) -> Option<(ShippingStatus, OrderStatus)> {
    match code {
        1 | 2 => Some((ShippingStatus::Processing, OrderStatus::Processing)),
        3 | 4 | 5 | 13 | 25 | 38 => Some((ShippingStatus::Shipped, OrderStatus::Shipped)),
        6 => Some((ShippingStatus::Delivered, OrderStatus::Delivered)),
        7..=11 => Some((ShippingStatus::Cancelled, OrderStatus::Cancelled)),
        _ => None,
    }
}

pub fn is_pickup_code(code: i64) -> bool {
    PICKUP_CODES.contains(&code)
}

/// Reads a carrier status code from its text form. Integral floats such as
/// `3.0` count as integers; anything else is an unknown code.
pub fn parse_status_code(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(code) = raw.parse::<i64>() {
        return Some(code);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}
