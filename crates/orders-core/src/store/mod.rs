//! Persistence for standing orders and their run history.
//!
//! Every mutation goes through [`OrderStore::commit`], an atomic
//! compare-and-swap on [`StandingOrder::version`]: the write lands only if the
//! stored version still equals `expected_version`, otherwise the store returns
//! [`OrdersError::Conflict`] and nothing changes. A run record passed to the
//! same commit is written in the same transaction.

pub mod db;
pub mod memory;

pub use db::RedbStore;
pub use memory::MemoryStore;

use crate::error::{OrdersError, Result};
use crate::order::StandingOrder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded execution of a standing order.
///
/// Rows outlive their order: deleting an order tombstones it and leaves its
/// history in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub success: bool,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(order_id: Uuid, success: bool, executed_at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            success,
            executed_at,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }
}

pub trait OrderStore: Send + Sync {
    /// Insert a new order. Fails if the id is already present.
    fn insert(&self, order: &StandingOrder) -> Result<()>;

    /// Fetch an order by id, tombstoned ones included.
    fn get(&self, id: Uuid) -> Result<Option<StandingOrder>>;

    /// Replace the stored order if its version equals `expected_version`,
    /// appending `run` in the same atomic step.
    fn commit(
        &self,
        order: &StandingOrder,
        expected_version: u64,
        run: Option<&RunRecord>,
    ) -> Result<()>;

    /// All orders of one owner, tombstoned ones included, in no particular order.
    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<StandingOrder>>;

    /// Every stored order, tombstoned ones included.
    fn list_all(&self) -> Result<Vec<StandingOrder>>;

    /// Run history for one order, oldest execution first. Runs with the same
    /// execution time are ordered by run id.
    fn runs_for(&self, order_id: Uuid) -> Result<Vec<RunRecord>>;
}

pub(crate) fn conflict(id: Uuid, expected: u64, found: u64) -> OrdersError {
    OrdersError::Conflict {
        id: id.to_string(),
        expected,
        found,
    }
}
