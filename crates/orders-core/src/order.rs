//! The standing-order aggregate and its lifecycle transitions.
//!
//! Transitions are methods on [`StandingOrder`] that either apply fully or
//! return an error without touching the order. Persistence, ownership checks,
//! and concurrency control live in [`crate::registry`].
//!
//! ```text
//! inactive ⇄ scheduled → running → scheduled   (success)
//!                                 → failed      (failure; still is_active)
//! ```

use crate::action::ActionStep;
use crate::error::{OrdersError, Result};
use crate::schedule::ScheduleDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Reported state of the most recent (or in-flight) execution.
///
/// Independent of `is_active`, which is the schedule switch. A new order
/// starts `Paused`. Deactivating an order later leaves its status alone, so
/// an order can be `Active` with `is_active == false`, and filtering on
/// `Paused` does not find deactivated orders. Use `is_active` or
/// [`OrderState::Inactive`] to ask whether an order is switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Paused => "paused",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrdersError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(OrderStatus::Active),
            "paused" => Ok(OrderStatus::Paused),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(OrdersError::Validation(format!("unknown status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderState
// ---------------------------------------------------------------------------

/// Lifecycle state derived from `is_active`, `running_since`, and `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Inactive,
    Scheduled,
    Running,
    Failed,
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Inactive => "inactive",
            OrderState::Scheduled => "scheduled",
            OrderState::Running => "running",
            OrderState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// StandingOrder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingOrder {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schedule: ScheduleDescriptor,
    pub actions: Vec<ActionStep>,
    pub is_active: bool,
    pub status: OrderStatus,
    pub run_count: u64,
    /// Fraction of recorded runs that succeeded, in `[0, 1]`.
    pub success_rate: f64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// Set while the executor reports an execution in flight.
    #[serde(default)]
    pub running_since: Option<DateTime<Utc>>,
    /// Bumped on every persisted mutation; the store compares it on update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tombstone. Deleted orders stay in the store for run history but are
    /// never returned to owners.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StandingOrder {
    /// Build an inactive, never-run order. Callers validate inputs first.
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        schedule: ScheduleDescriptor,
        actions: Vec<ActionStep>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: description.into(),
            schedule,
            actions,
            is_active: false,
            status: OrderStatus::Paused,
            run_count: 0,
            success_rate: 0.0,
            last_run: None,
            next_run: None,
            running_since: None,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn state(&self) -> OrderState {
        if !self.is_active {
            OrderState::Inactive
        } else if self.running_since.is_some() {
            OrderState::Running
        } else if self.status == OrderStatus::Failed {
            OrderState::Failed
        } else {
            OrderState::Scheduled
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the executor should pick this order up at `now`.
    ///
    /// Failed orders wait for their owner to re-activate them.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_deleted()
            && self.state() == OrderState::Scheduled
            && self.next_run.is_some_and(|next| next <= now)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Turn the schedule on and compute `next_run` from `now`.
    ///
    /// A failed or paused status is reset to active.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        let schedule = self.schedule.validate()?;
        let next = schedule.next_after(now).ok_or_else(|| {
            OrdersError::Validation("schedule produces no future run".into())
        })?;
        self.is_active = true;
        self.next_run = Some(next);
        if matches!(self.status, OrderStatus::Failed | OrderStatus::Paused) {
            self.status = OrderStatus::Active;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Turn the schedule off. Status and run statistics are kept.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.next_run = None;
        self.running_since = None;
        self.updated_at = now;
    }

    /// Executor signal that a run has started.
    pub fn mark_running(&mut self, started_at: DateTime<Utc>) -> Result<()> {
        if !self.is_active {
            return Err(OrdersError::PreconditionFailed(format!(
                "standing order {} is inactive",
                self.id
            )));
        }
        if let Some(since) = self.running_since {
            return Err(OrdersError::PreconditionFailed(format!(
                "standing order {} is already running since {}",
                self.id,
                since.to_rfc3339()
            )));
        }
        self.running_since = Some(started_at);
        self.updated_at = started_at;
        Ok(())
    }

    /// Fold one execution outcome into the statistics and reschedule from
    /// `executed_at`.
    pub fn record_run_outcome(&mut self, success: bool, executed_at: DateTime<Utc>) -> Result<()> {
        if !self.is_active {
            return Err(OrdersError::PreconditionFailed(format!(
                "cannot record a run for inactive standing order {}",
                self.id
            )));
        }
        let previous = self.run_count as f64;
        self.run_count += 1;
        let hit = if success { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * previous + hit) / self.run_count as f64;
        self.last_run = Some(executed_at);
        self.next_run = crate::schedule::compute_next_run(&self.schedule, executed_at);
        self.status = if success {
            OrderStatus::Completed
        } else {
            OrderStatus::Failed
        };
        self.running_since = None;
        self.updated_at = executed_at;
        Ok(())
    }

    /// Replace the schedule. Only allowed while inactive.
    pub fn set_schedule(&mut self, schedule: ScheduleDescriptor) -> Result<()> {
        self.require_inactive("schedule")?;
        schedule.validate()?;
        self.schedule = schedule;
        Ok(())
    }

    /// Replace the action pipeline. Only allowed while inactive; the caller
    /// validates the pipeline.
    pub fn set_actions(&mut self, actions: Vec<ActionStep>) -> Result<()> {
        self.require_inactive("actions")?;
        self.actions = actions;
        Ok(())
    }

    fn require_inactive(&self, field: &str) -> Result<()> {
        if self.is_active {
            return Err(OrdersError::PreconditionFailed(format!(
                "cannot edit {field} of active standing order {}; deactivate it first",
                self.id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
