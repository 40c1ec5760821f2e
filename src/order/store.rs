use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{GatewayError, GatewayResult};
use crate::order::types::{OrderSnapshot, OrderUpdate};

/// Seam to the host's order storage. The gateway never owns orders: it
/// reads value-type snapshots and issues single-shot updates.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Look up an order by its numeric id.
    async fn find(&self, id: u64) -> GatewayResult<Option<OrderSnapshot>>;

    /// Look up an order by its opaque order key (deprecated transaction-id
    /// source). Callbacks resolve the order by key first, numeric id second.
    async fn find_by_key(&self, key: &str) -> GatewayResult<Option<OrderSnapshot>>;

    /// Apply one update: set fields, append the audit note if present.
    async fn apply(&self, id: u64, update: OrderUpdate) -> GatewayResult<()>;

    /// Total amount refunded so far through host refund records.
    async fn total_refunded(&self, id: u64) -> GatewayResult<Decimal>;

    /// Create a host refund record for the given amount.
    async fn create_refund(&self, id: u64, amount: Decimal) -> GatewayResult<()>;
}

#[derive(Debug, Clone)]
struct StoredOrder {
    snapshot: OrderSnapshot,
    notes: Vec<String>,
    refunds: Vec<Decimal>,
}

/// In-memory order storage backing the binary and the tests. Real
/// deployments implement [`OrderStore`] over the host shop's database.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<u64, StoredOrder>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, snapshot: OrderSnapshot) {
        let mut orders = self.orders.write().await;
        orders.insert(
            snapshot.id,
            StoredOrder {
                snapshot,
                notes: Vec::new(),
                refunds: Vec::new(),
            },
        );
    }

    /// Audit notes recorded against an order, oldest first.
    pub async fn notes(&self, id: u64) -> Vec<String> {
        let orders = self.orders.read().await;
        orders
            .get(&id)
            .map(|order| order.notes.clone())
            .unwrap_or_default()
    }

    pub async fn refunds(&self, id: u64) -> Vec<Decimal> {
        let orders = self.orders.read().await;
        orders
            .get(&id)
            .map(|order| order.refunds.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find(&self, id: u64) -> GatewayResult<Option<OrderSnapshot>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).map(|order| order.snapshot.clone()))
    }

    async fn find_by_key(&self, key: &str) -> GatewayResult<Option<OrderSnapshot>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|order| order.snapshot.order_key == key)
            .map(|order| order.snapshot.clone()))
    }

    async fn apply(&self, id: u64, update: OrderUpdate) -> GatewayResult<()> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(GatewayError::Store {
            message: format!("order {} not found", id),
        })?;

        if let Some(status) = update.viabill_status {
            order.snapshot.viabill_status = Some(status);
        }
        if let Some(status) = update.host_status {
            order.snapshot.host_status = status;
        }
        if let Some(amount) = update.captured_amount {
            order.snapshot.captured_amount = amount;
        }
        if let Some(flag) = update.in_test_mode {
            order.snapshot.in_test_mode = flag;
        }
        if let Some(note) = update.note {
            order.notes.push(note);
        }

        Ok(())
    }

    async fn total_refunded(&self, id: u64) -> GatewayResult<Decimal> {
        let orders = self.orders.read().await;
        Ok(orders
            .get(&id)
            .map(|order| order.refunds.iter().copied().sum())
            .unwrap_or_default())
    }

    async fn create_refund(&self, id: u64, amount: Decimal) -> GatewayResult<()> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(GatewayError::Store {
            message: format!("order {} not found", id),
        })?;
        order.refunds.push(amount);
        Ok(())
    }
}
