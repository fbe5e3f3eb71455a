//! In-process store. Used by tests and by `store.backend: memory`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::{conflict, OrderStore, RunRecord};
use crate::error::{OrdersError, Result};
use crate::order::StandingOrder;

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, StandingOrder>,
    runs: Vec<RunRecord>,
}

/// Mutex-guarded map; the version check and the write happen under one lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| OrdersError::Store("memory store lock poisoned".into()))
    }
}

impl OrderStore for MemoryStore {
    fn insert(&self, order: &StandingOrder) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.orders.contains_key(&order.id) {
            return Err(OrdersError::Store(format!("duplicate order id: {}", order.id)));
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<StandingOrder>> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    fn commit(
        &self,
        order: &StandingOrder,
        expected_version: u64,
        run: Option<&RunRecord>,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let found = inner
            .orders
            .get(&order.id)
            .map(|o| o.version)
            .ok_or_else(|| OrdersError::NotFound(order.id.to_string()))?;
        if found != expected_version {
            return Err(conflict(order.id, expected_version, found));
        }
        inner.orders.insert(order.id, order.clone());
        if let Some(run) = run {
            inner.runs.push(run.clone());
        }
        Ok(())
    }

    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<StandingOrder>> {
        Ok(self
            .lock()?
            .orders
            .values()
            .filter(|o| o.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<StandingOrder>> {
        Ok(self.lock()?.orders.values().cloned().collect())
    }

    fn runs_for(&self, order_id: Uuid) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .lock()?
            .runs
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.executed_at.cmp(&b.executed_at).then(a.id.cmp(&b.id)));
        Ok(runs)
    }
}
