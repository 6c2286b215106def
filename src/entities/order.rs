use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row form of [`crate::models::Order`]. Shipping identifiers are flattened
/// into columns so webhook lookups can use an index; line items, the address
/// and the tracking history are JSON.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub status: String,
    pub total_amount: Decimal,
    pub items: Json,
    pub shipping_address: Json,

    pub payment_status: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,

    pub has_shipping: bool,
    pub shipment_id: Option<String>,
    pub awb_code: Option<String>,
    pub courier: Option<String>,
    pub shipping_status: Option<String>,
    pub current_location: Option<String>,
    pub tracking_url: Option<String>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub tracking_history: Json,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
