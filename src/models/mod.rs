pub mod order;

pub use order::{
    LineItem, Order, OrderStatus, PaymentRecord, PaymentStatus, ShippingAddress, ShippingRecord,
    ShippingStatus, TrackingEvent,
};
