// Order placement and payment confirmation
pub mod orders;

// Carrier-driven shipping state
pub mod reconciliation;
pub mod shipments;
pub mod status_mapping;
