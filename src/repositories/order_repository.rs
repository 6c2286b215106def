use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{OrderLookup, OrderPatch, OrderStore, UpdateResult};
use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as OrderEntity, Model as OrderModel,
};
use crate::errors::ServiceError;
use crate::models::{
    Order, OrderStatus, PaymentRecord, PaymentStatus, ShippingRecord, ShippingStatus,
};

/// Order store backed by the `orders` table.
#[derive(Debug, Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn corrupt(id: Uuid, what: impl std::fmt::Display) -> ServiceError {
    ServiceError::StoreFailure(format!("order {} has an unreadable row: {}", id, what))
}

impl TryFrom<OrderModel> for Order {
    type Error = ServiceError;

    fn try_from(row: OrderModel) -> Result<Self, Self::Error> {
        let id = row.id;
        let status = OrderStatus::from_str(&row.status).map_err(|e| corrupt(id, e))?;

        let payment = row
            .payment_status
            .as_deref()
            .map(|s| {
                PaymentStatus::from_str(s).map(|status| PaymentRecord {
                    status,
                    paid_at: row.paid_at,
                })
            })
            .transpose()
            .map_err(|e| corrupt(id, e))?;

        let shipping = if row.has_shipping {
            let status = row
                .shipping_status
                .as_deref()
                .map(ShippingStatus::from_str)
                .transpose()
                .map_err(|e| corrupt(id, e))?;
            Some(ShippingRecord {
                shipment_id: row.shipment_id,
                awb_code: row.awb_code,
                courier: row.courier,
                status,
                current_location: row.current_location,
                tracking_url: row.tracking_url,
                picked_up_at: row.picked_up_at,
                delivered_at: row.delivered_at,
                last_update_at: row.last_update_at,
                tracking_history: serde_json::from_value(row.tracking_history)
                    .map_err(|e| corrupt(id, e))?,
            })
        } else {
            None
        };

        Ok(Order {
            id,
            status,
            total_amount: row.total_amount,
            items: serde_json::from_value(row.items).map_err(|e| corrupt(id, e))?,
            shipping_address: serde_json::from_value(row.shipping_address)
                .map_err(|e| corrupt(id, e))?,
            payment,
            shipping,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_active_model(order: &Order) -> Result<OrderActiveModel, ServiceError> {
    let shipping = order.shipping.clone().unwrap_or_default();
    Ok(OrderActiveModel {
        id: Set(order.id),
        status: Set(order.status.to_string()),
        total_amount: Set(order.total_amount),
        items: Set(serde_json::to_value(&order.items)?),
        shipping_address: Set(serde_json::to_value(&order.shipping_address)?),
        payment_status: Set(order.payment.as_ref().map(|p| p.status.to_string())),
        paid_at: Set(order.payment.as_ref().and_then(|p| p.paid_at)),
        has_shipping: Set(order.shipping.is_some()),
        shipment_id: Set(shipping.shipment_id),
        awb_code: Set(shipping.awb_code),
        courier: Set(shipping.courier),
        shipping_status: Set(shipping.status.map(|s| s.to_string())),
        current_location: Set(shipping.current_location),
        tracking_url: Set(shipping.tracking_url),
        picked_up_at: Set(shipping.picked_up_at),
        delivered_at: Set(shipping.delivered_at),
        last_update_at: Set(shipping.last_update_at),
        tracking_history: Set(serde_json::to_value(&shipping.tracking_history)?),
        created_at: Set(order.created_at),
        updated_at: Set(order.updated_at),
    })
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert(&self, order: Order) -> Result<Order, ServiceError> {
        let row = to_active_model(&order)?.insert(self.get_db()).await?;
        Order::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        OrderEntity::find_by_id(id)
            .one(self.get_db())
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_by_field(&self, lookup: &OrderLookup) -> Result<Option<Order>, ServiceError> {
        let filter = match lookup {
            OrderLookup::AwbCode(awb) => Column::AwbCode.eq(awb.as_str()),
            OrderLookup::ShipmentId(id) => Column::ShipmentId.eq(id.as_str()),
        };
        OrderEntity::find()
            .filter(filter)
            .one(self.get_db())
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn list(&self, page: u64, limit: u64) -> Result<(Vec<Order>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .order_by_desc(Column::CreatedAt)
            .paginate(self.get_db(), limit.max(1));

        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        let orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((orders, total))
    }

    /// Read, patch and write inside one transaction. The row is locked with
    /// `FOR UPDATE` on backends that support it; SQLite serializes writers.
    #[instrument(skip(self, patch), fields(order_id = %id))]
    async fn update_atomic(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<Option<UpdateResult>, ServiceError> {
        let txn = self.get_db().begin().await?;

        let mut query = OrderEntity::find_by_id(id);
        if txn.get_database_backend() != DbBackend::Sqlite {
            query = query.lock_exclusive();
        }
        let Some(row) = query.one(&txn).await? else {
            txn.rollback().await?;
            return Ok(None);
        };

        let current = Order::try_from(row)?;
        let result = patch.apply_to(&current, Utc::now())?;
        if result.order != current {
            to_active_model(&result.order)?.update(&txn).await?;
        }
        txn.commit().await?;

        debug!(event_appended = result.event_appended, "order patched");
        Ok(Some(result))
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        self.get_db().ping().await.map_err(ServiceError::from)
    }
}
