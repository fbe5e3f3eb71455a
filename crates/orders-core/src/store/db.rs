//! Persistent storage for standing orders using redb.
//!
//! # Table design
//!
//! `ORDERS` is keyed by the 16 raw bytes of the order's UUID and holds the
//! JSON-encoded [`StandingOrder`].
//!
//! `RUNS` uses a 40-byte composite key:
//! ```text
//! [ order uuid: 16 bytes | executed_at_ms: u64 big-endian (8 bytes) | run uuid: 16 bytes ]
//! ```
//!
//! Grouping by order id first and timestamp second means a single range scan
//! over one order's prefix returns its history in execution order.
//!
//! redb allows one write transaction at a time, so the version check in
//! [`RedbStore::commit`] and the write that follows cannot interleave with
//! another writer.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use super::{conflict, OrderStore, RunRecord};
use crate::error::{OrdersError, Result};
use crate::order::StandingOrder;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

/// Key: order uuid bytes. Value: JSON-encoded StandingOrder.
const ORDERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("orders");

/// Key: 40-byte composite (order uuid ++ executed_at_ms big-endian ++ run uuid).
/// Value: JSON-encoded RunRecord.
const RUNS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("runs");

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn run_key(order_id: Uuid, executed_at: DateTime<Utc>, run_id: Uuid) -> [u8; 40] {
    let mut key = [0u8; 40];
    let ms = executed_at.timestamp_millis().max(0) as u64;
    key[..16].copy_from_slice(order_id.as_bytes());
    key[16..24].copy_from_slice(&ms.to_be_bytes());
    key[24..].copy_from_slice(run_id.as_bytes());
    key
}

/// Inclusive bounds covering every run key of `order_id`.
fn run_prefix_bounds(order_id: Uuid) -> ([u8; 40], [u8; 40]) {
    let mut lower = [0u8; 40];
    lower[..16].copy_from_slice(order_id.as_bytes());
    let mut upper = [0xffu8; 40];
    upper[..16].copy_from_slice(order_id.as_bytes());
    (lower, upper)
}

fn db_err(e: impl std::fmt::Display) -> OrdersError {
    OrdersError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the redb database at `path`, creating both tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        // Ensure the tables exist before any reads
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(ORDERS).map_err(db_err)?;
        wt.open_table(RUNS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        tracing::debug!(path = %path.display(), "opened order store");
        Ok(Self { db })
    }

    fn scan<F>(&self, mut keep: F) -> Result<Vec<StandingOrder>>
    where
        F: FnMut(&StandingOrder) -> bool,
    {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ORDERS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let order: StandingOrder = serde_json::from_slice(v.value())?;
            if keep(&order) {
                result.push(order);
            }
        }
        Ok(result)
    }
}

impl OrderStore for RedbStore {
    fn insert(&self, order: &StandingOrder) -> Result<()> {
        let value = serde_json::to_vec(order)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(ORDERS).map_err(db_err)?;
            let exists = table
                .get(order.id.as_bytes().as_slice())
                .map_err(db_err)?
                .is_some();
            if exists {
                return Err(OrdersError::Store(format!("duplicate order id: {}", order.id)));
            }
            table
                .insert(order.id.as_bytes().as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<StandingOrder>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ORDERS).map_err(db_err)?;
        let found = table.get(id.as_bytes().as_slice()).map_err(db_err)?;
        match found {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    fn commit(
        &self,
        order: &StandingOrder,
        expected_version: u64,
        run: Option<&RunRecord>,
    ) -> Result<()> {
        let value = serde_json::to_vec(order)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(ORDERS).map_err(db_err)?;
            let found = match table.get(order.id.as_bytes().as_slice()).map_err(db_err)? {
                Some(v) => serde_json::from_slice::<StandingOrder>(v.value())?.version,
                None => return Err(OrdersError::NotFound(order.id.to_string())),
            };
            if found != expected_version {
                // Dropping `wt` without commit aborts the transaction.
                return Err(conflict(order.id, expected_version, found));
            }
            table
                .insert(order.id.as_bytes().as_slice(), value.as_slice())
                .map_err(db_err)?;

            if let Some(run) = run {
                let key = run_key(run.order_id, run.executed_at, run.id);
                let run_value = serde_json::to_vec(run)?;
                let mut runs = wt.open_table(RUNS).map_err(db_err)?;
                runs.insert(key.as_slice(), run_value.as_slice())
                    .map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<StandingOrder>> {
        self.scan(|o| o.owner_id == owner_id)
    }

    fn list_all(&self) -> Result<Vec<StandingOrder>> {
        self.scan(|_| true)
    }

    fn runs_for(&self, order_id: Uuid) -> Result<Vec<RunRecord>> {
        let (lower, upper) = run_prefix_bounds(order_id);
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(RUNS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table
            .range(lower.as_slice()..=upper.as_slice())
            .map_err(db_err)?
        {
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        // Keys only carry milliseconds.
        result.sort_by(|a: &RunRecord, b: &RunRecord| {
            a.executed_at.cmp(&b.executed_at).then(a.id.cmp(&b.id))
        });
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
