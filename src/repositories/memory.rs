use super::{OrderLookup, OrderPatch, OrderStore, UpdateResult};
use crate::errors::ServiceError;
use crate::models::Order;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Process-local order store. The per-shard write lock held by `get_mut`
/// makes each patch atomic with respect to every other patch on the same id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<DashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<Order, ServiceError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(ServiceError::InvalidOperation(format!(
                "order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(order)
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_field(&self, lookup: &OrderLookup) -> Result<Option<Order>, ServiceError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| lookup.matches(entry.value()))
            .map(|entry| entry.value().clone()))
    }

    async fn list(&self, page: u64, limit: u64) -> Result<(Vec<Order>, u64), ServiceError> {
        let mut all: Vec<Order> = self.orders.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as u64;
        let skip = page.saturating_sub(1).saturating_mul(limit) as usize;
        let items = all.into_iter().skip(skip).take(limit as usize).collect();
        Ok((items, total))
    }

    async fn update_atomic(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<Option<UpdateResult>, ServiceError> {
        let Some(mut entry) = self.orders.get_mut(&id) else {
            return Ok(None);
        };
        let result = patch.apply_to(entry.value(), Utc::now())?;
        *entry.value_mut() = result.order.clone();
        debug!(order_id = %id, event_appended = result.event_appended, "order patched");
        Ok(Some(result))
    }
}
