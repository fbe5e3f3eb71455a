//! Workflow registry: the service surface over standing orders.
//!
//! Owner-facing operations take the caller's `owner_id` explicitly and treat
//! an order owned by someone else exactly like a missing one. Executor-facing
//! operations (`due`, `mark_running`, `record_run_outcome`) are not
//! owner-scoped.
//!
//! Every mutation is read → transition → compare-and-swap. A lost swap is
//! retried from a fresh read up to `max_conflict_retries` times before
//! [`OrdersError::Conflict`] reaches the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{self, ActionStep};
use crate::config::RegistryConfig;
use crate::error::{OrdersError, Result};
use crate::notify::{Notification, Notifier, Operation, TracingNotifier};
use crate::order::StandingOrder;
use crate::query::OrderQuery;
use crate::schedule::ScheduleDescriptor;
use crate::store::{OrderStore, RunRecord};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schedule: ScheduleDescriptor,
    pub actions: Vec<ActionStep>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewOrder {
    pub fn new(
        name: impl Into<String>,
        schedule: ScheduleDescriptor,
        actions: Vec<ActionStep>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            schedule,
            actions,
            active: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Fields to change; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schedule: Option<ScheduleDescriptor>,
    #[serde(default)]
    pub actions: Option<Vec<ActionStep>>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.schedule.is_none()
            && self.actions.is_none()
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// Who may see an order during a mutation.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Owner(&'a str),
    /// Like `Owner`, but tombstoned orders are still visible (idempotent delete).
    OwnerWithDeleted(&'a str),
    Executor,
}

/// What a transition wants persisted.
enum Write {
    Unchanged,
    Order,
    WithRun(RunRecord),
}

fn not_found(id: Uuid) -> OrdersError {
    OrdersError::NotFound(id.to_string())
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(OrdersError::Validation("name must not be empty".into()));
    }
    Ok(name.to_string())
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct Registry {
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    config: RegistryConfig,
    clock: Clock,
}

impl Registry {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            notifier: Arc::new(TracingNotifier),
            config: RegistryConfig::default(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // -----------------------------------------------------------------------
    // Owner operations
    // -----------------------------------------------------------------------

    /// Validate and persist a new order. Active by default, in which case the
    /// first `next_run` is computed from now.
    pub fn create(&self, owner_id: &str, new: NewOrder) -> Result<StandingOrder> {
        match self.try_create(owner_id, new) {
            Ok(order) => {
                tracing::info!(order = %order.id, owner = %owner_id, "created standing order");
                self.notifier.notify(&Notification::succeeded(
                    Operation::Create,
                    owner_id,
                    order.id,
                    format!("Created '{}'", order.name),
                ));
                Ok(order)
            }
            Err(e) => {
                self.notifier
                    .notify(&Notification::failed(Operation::Create, owner_id, None, &e));
                Err(e)
            }
        }
    }

    fn try_create(&self, owner_id: &str, new: NewOrder) -> Result<StandingOrder> {
        let name = validate_name(&new.name)?;
        new.schedule.validate()?;
        let mut actions = new.actions;
        action::assign_missing_ids(&mut actions);
        action::validate_pipeline(&actions, self.config.max_actions)?;

        let now = self.now();
        let mut order =
            StandingOrder::new(owner_id, name, new.description, new.schedule, actions, now);
        if new.active {
            order.activate(now)?;
        }
        self.store.insert(&order)?;
        Ok(order)
    }

    pub fn get(&self, id: Uuid, owner_id: &str) -> Result<StandingOrder> {
        self.load(id, Scope::Owner(owner_id))
    }

    /// The owner's live orders, filtered and sorted by `query`.
    pub fn list_by_owner(&self, owner_id: &str, query: &OrderQuery) -> Result<Vec<StandingOrder>> {
        let orders = self
            .store
            .list_by_owner(owner_id)?
            .into_iter()
            .filter(|o| !o.is_deleted())
            .collect();
        Ok(query.apply(orders))
    }

    /// Apply `patch`. Schedule and action changes require the order to be
    /// inactive; name and description can change at any time.
    pub fn update(&self, id: Uuid, owner_id: &str, patch: OrderPatch) -> Result<StandingOrder> {
        let result = self.try_update(id, owner_id, patch);
        self.report(Operation::Update, owner_id, id, result, |o| {
            format!("Updated '{}'", o.name)
        })
    }

    fn try_update(&self, id: Uuid, owner_id: &str, patch: OrderPatch) -> Result<StandingOrder> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        if let Some(schedule) = &patch.schedule {
            schedule.validate()?;
        }
        let actions = match patch.actions {
            Some(mut actions) => {
                action::assign_missing_ids(&mut actions);
                action::validate_pipeline(&actions, self.config.max_actions)?;
                Some(actions)
            }
            None => None,
        };

        self.mutate(id, Scope::Owner(owner_id), |order, now| {
            if let Some(schedule) = &patch.schedule {
                order.set_schedule(schedule.clone())?;
            }
            if let Some(actions) = &actions {
                order.set_actions(actions.clone())?;
            }
            if let Some(name) = &name {
                order.name = name.clone();
            }
            if let Some(description) = &patch.description {
                order.description = description.clone();
            }
            order.updated_at = now;
            Ok(Write::Order)
        })
    }

    /// Flip `is_active`: activation computes `next_run`, deactivation clears it.
    pub fn toggle_active(&self, id: Uuid, owner_id: &str) -> Result<StandingOrder> {
        let result = self.mutate(id, Scope::Owner(owner_id), |order, now| {
            if order.is_active {
                order.deactivate(now);
            } else {
                order.activate(now)?;
            }
            Ok(Write::Order)
        });
        if let Ok(order) = &result {
            tracing::info!(order = %id, active = order.is_active, "toggled standing order");
        }
        self.report(Operation::Toggle, owner_id, id, result, |o| {
            let verb = if o.is_active { "Activated" } else { "Paused" };
            format!("{verb} '{}'", o.name)
        })
    }

    /// Tombstone the order. Deleting an already-deleted order of the same
    /// owner succeeds without doing anything.
    pub fn delete(&self, id: Uuid, owner_id: &str) -> Result<()> {
        let result = self.mutate(id, Scope::OwnerWithDeleted(owner_id), |order, now| {
            if order.is_deleted() {
                return Ok(Write::Unchanged);
            }
            order.deactivate(now);
            order.deleted_at = Some(now);
            Ok(Write::Order)
        });
        if result.is_ok() {
            tracing::info!(order = %id, owner = %owner_id, "deleted standing order");
        }
        self.report(Operation::Delete, owner_id, id, result, |o| {
            format!("Deleted '{}'", o.name)
        })
        .map(|_| ())
    }

    /// Run history, oldest first.
    pub fn runs(&self, id: Uuid, owner_id: &str) -> Result<Vec<RunRecord>> {
        let order = self.load(id, Scope::Owner(owner_id))?;
        self.store.runs_for(order.id)
    }

    // -----------------------------------------------------------------------
    // Executor operations
    // -----------------------------------------------------------------------

    /// Orders the executor should run at `now`, earliest `next_run` first.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<StandingOrder>> {
        let mut due: Vec<StandingOrder> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|o| o.is_due(now))
            .collect();
        due.sort_by(|a, b| a.next_run.cmp(&b.next_run).then_with(|| a.id.cmp(&b.id)));
        Ok(due)
    }

    pub fn mark_running(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<StandingOrder> {
        let order = self.mutate(id, Scope::Executor, |order, _| {
            order.mark_running(started_at)?;
            Ok(Write::Order)
        })?;
        tracing::debug!(order = %id, "standing order running");
        Ok(order)
    }

    /// Fold an execution outcome into the order and append it to the run
    /// history. Fails with `PreconditionFailed` if the order is inactive.
    pub fn record_run_outcome(
        &self,
        id: Uuid,
        success: bool,
        executed_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<StandingOrder> {
        let order = self.mutate(id, Scope::Executor, |order, now| {
            order.record_run_outcome(success, executed_at)?;
            let mut run = RunRecord::new(order.id, success, executed_at, duration_ms);
            run.recorded_at = now;
            Ok(Write::WithRun(run))
        })?;
        if success {
            tracing::info!(order = %id, duration_ms, run_count = order.run_count, "run succeeded");
        } else {
            tracing::warn!(order = %id, duration_ms, run_count = order.run_count, "run failed");
        }
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn load(&self, id: Uuid, scope: Scope<'_>) -> Result<StandingOrder> {
        let order = self.store.get(id)?.ok_or_else(|| not_found(id))?;
        let visible = match scope {
            Scope::Owner(owner) => order.owner_id == owner && !order.is_deleted(),
            Scope::OwnerWithDeleted(owner) => order.owner_id == owner,
            Scope::Executor => !order.is_deleted(),
        };
        if visible {
            Ok(order)
        } else {
            Err(not_found(id))
        }
    }

    /// Read, transition, compare-and-swap; re-read and retry on conflict.
    fn mutate<F>(&self, id: Uuid, scope: Scope<'_>, mut apply: F) -> Result<StandingOrder>
    where
        F: FnMut(&mut StandingOrder, DateTime<Utc>) -> Result<Write>,
    {
        let mut attempt = 0;
        loop {
            let mut order = self.load(id, scope)?;
            let expected = order.version;
            let run = match apply(&mut order, self.now())? {
                Write::Unchanged => return Ok(order),
                Write::Order => None,
                Write::WithRun(run) => Some(run),
            };
            order.version = expected + 1;

            match self.store.commit(&order, expected, run.as_ref()) {
                Ok(()) => return Ok(order),
                Err(OrdersError::Conflict { .. }) if attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    tracing::debug!(order = %id, attempt, "lost update race; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn report<F>(
        &self,
        op: Operation,
        owner_id: &str,
        id: Uuid,
        result: Result<StandingOrder>,
        title: F,
    ) -> Result<StandingOrder>
    where
        F: FnOnce(&StandingOrder) -> String,
    {
        let notification = match &result {
            Ok(order) => Notification::succeeded(op, owner_id, id, title(order)),
            Err(e) => Notification::failed(op, owner_id, Some(id), e),
        };
        self.notifier.notify(&notification);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{parse_pipeline, ActionKind, NotificationConfig};
    use crate::notify::{NotificationLog, Outcome};
    use crate::order::{OrderState, OrderStatus};
    use crate::query::SortKey;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
    }

    struct Fixture {
        registry: Registry,
        store: Arc<MemoryStore>,
        log: Arc<NotificationLog>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(NotificationLog::default());
        let registry = Registry::new(store.clone())
            .with_notifier(log.clone())
            .with_clock(t0);
        Fixture {
            registry,
            store,
            log,
        }
    }

    fn notify_step() -> Vec<ActionStep> {
        parse_pipeline(r#"[{"type":"notification","config":{}}]"#).unwrap()
    }

    fn hourly(name: &str) -> NewOrder {
        NewOrder::new(name, ScheduleDescriptor::hourly(), notify_step())
    }

    #[test]
    fn create_hourly_then_record_success() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Pulse")).unwrap();
        assert!(order.is_active);
        assert!(order.next_run.is_some());
        assert_eq!(order.run_count, 0);
        assert_eq!(order.actions[0].id, "step-1");

        let t = t0() + Duration::minutes(42);
        let order = f.registry.record_run_outcome(order.id, true, t, 1200).unwrap();
        assert_eq!(order.run_count, 1);
        assert_eq!(order.success_rate, 1.0);
        assert_eq!(order.last_run, Some(t));
        assert_eq!(order.next_run, Some(t + Duration::hours(1)));
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn success_then_failure_halves_rate() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Pulse")).unwrap();
        f.registry.record_run_outcome(order.id, true, t0(), 10).unwrap();
        let order = f
            .registry
            .record_run_outcome(order.id, false, t0() + Duration::hours(1), 10)
            .unwrap();
        assert_eq!(order.run_count, 2);
        assert_eq!(order.success_rate, 0.5);
        assert_eq!(order.status, OrderStatus::Failed);

        let runs = f.registry.runs(order.id, "alice").unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].success && !runs[1].success);
        assert_eq!(runs[0].recorded_at, t0());
    }

    #[test]
    fn create_rejects_bad_input_without_storing() {
        let f = fixture();
        let empty = NewOrder::new("x", ScheduleDescriptor::hourly(), Vec::new());
        assert!(matches!(
            f.registry.create("alice", empty),
            Err(OrdersError::Validation(_))
        ));

        let mut contradictory = ScheduleDescriptor::daily("09:00");
        contradictory.interval = Some("5m".into());
        let bad = NewOrder::new("x", contradictory, notify_step());
        assert!(matches!(
            f.registry.create("alice", bad),
            Err(OrdersError::Validation(_))
        ));

        assert!(matches!(
            f.registry.create("alice", hourly("   ")),
            Err(OrdersError::Validation(_))
        ));

        assert!(f.store.list_all().unwrap().is_empty());
        assert_eq!(f.log.len(), 3);
        assert!(f.log.history().iter().all(|n| !n.is_success()));
    }

    #[test]
    fn create_respects_max_actions() {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::new(store).with_config(RegistryConfig {
            max_actions: 1,
            ..Default::default()
        });
        let two = vec![ActionStep::notification("a"), ActionStep::notification("b")];
        let err = registry
            .create("alice", NewOrder::new("x", ScheduleDescriptor::hourly(), two))
            .unwrap_err();
        assert!(err.to_string().contains("limit is 1"));
    }

    #[test]
    fn create_inactive_is_paused() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Later").inactive()).unwrap();
        assert!(!order.is_active);
        assert!(order.next_run.is_none());
        assert_eq!(order.status, OrderStatus::Paused);
    }

    #[test]
    fn toggle_flips_and_recomputes() {
        let f = fixture();
        let order = f
            .registry
            .create(
                "alice",
                NewOrder::new("Digest", ScheduleDescriptor::daily("09:00"), notify_step()),
            )
            .unwrap();
        assert_eq!(order.next_run, Some(t0() + Duration::hours(1)));

        let off = f.registry.toggle_active(order.id, "alice").unwrap();
        assert!(!off.is_active);
        assert!(off.next_run.is_none());
        assert_eq!(off.version, 1);

        let on = f.registry.toggle_active(order.id, "alice").unwrap();
        assert!(on.is_active);
        assert_eq!(on.next_run, Some(t0() + Duration::hours(1)));

        let titles: Vec<_> = f.log.history().into_iter().map(|n| n.title).collect();
        assert_eq!(
            titles,
            ["Created 'Digest'", "Paused 'Digest'", "Activated 'Digest'"]
        );
    }

    #[test]
    fn foreign_and_unknown_ids_look_the_same() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Mine")).unwrap();
        let unknown = Uuid::new_v4();

        let foreign = f.registry.toggle_active(order.id, "mallory").unwrap_err();
        let missing = f.registry.toggle_active(unknown, "mallory").unwrap_err();
        assert_eq!(foreign.kind(), "not_found");
        assert_eq!(missing.kind(), "not_found");
        assert_eq!(
            foreign.to_string().replace(&order.id.to_string(), "<id>"),
            missing.to_string().replace(&unknown.to_string(), "<id>")
        );
        assert!(f.registry.get(order.id, "alice").unwrap().is_active);
    }

    #[test]
    fn delete_twice_is_a_noop() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Gone")).unwrap();
        f.registry.delete(order.id, "alice").unwrap();
        f.registry.delete(order.id, "alice").unwrap();

        assert!(matches!(
            f.registry.get(order.id, "alice"),
            Err(OrdersError::NotFound(_))
        ));
        assert!(f
            .registry
            .list_by_owner("alice", &OrderQuery::default())
            .unwrap()
            .is_empty());
        // Tombstoned, not removed.
        let stored = f.store.get(order.id).unwrap().unwrap();
        assert!(stored.is_deleted());
        assert!(!stored.is_active);
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn delete_of_foreign_or_unknown_is_not_found() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Mine")).unwrap();
        assert!(matches!(
            f.registry.delete(order.id, "mallory"),
            Err(OrdersError::NotFound(_))
        ));
        assert!(matches!(
            f.registry.delete(Uuid::new_v4(), "alice"),
            Err(OrdersError::NotFound(_))
        ));
        f.registry.delete(order.id, "alice").unwrap();
        assert!(matches!(
            f.registry.delete(order.id, "mallory"),
            Err(OrdersError::NotFound(_))
        ));
    }

    #[test]
    fn deleted_order_keeps_history_but_rejects_outcomes() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Audit")).unwrap();
        f.registry.record_run_outcome(order.id, true, t0(), 5).unwrap();
        f.registry.delete(order.id, "alice").unwrap();

        assert_eq!(f.store.runs_for(order.id).unwrap().len(), 1);
        assert!(matches!(
            f.registry.record_run_outcome(order.id, true, t0(), 5),
            Err(OrdersError::NotFound(_))
        ));
        assert!(matches!(
            f.registry.runs(order.id, "alice"),
            Err(OrdersError::NotFound(_))
        ));
    }

    #[test]
    fn editing_actions_of_active_order_fails_and_keeps_actions() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Locked")).unwrap();
        let patch = OrderPatch {
            actions: Some(vec![ActionStep::notification("replacement")]),
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let err = f.registry.update(order.id, "alice", patch).unwrap_err();
        assert!(matches!(err, OrdersError::PreconditionFailed(_)));

        let stored = f.registry.get(order.id, "alice").unwrap();
        assert_eq!(stored.actions, order.actions);
        assert_eq!(stored.name, "Locked");
        assert_eq!(stored.version, order.version);
    }

    #[test]
    fn editing_inactive_order_applies_patch() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Draft").inactive()).unwrap();
        let patch = OrderPatch {
            schedule: Some(ScheduleDescriptor::custom("15m")),
            actions: Some(vec![ActionStep::new(
                "",
                ActionKind::Notification(NotificationConfig {
                    channel: Some("email".into()),
                    message: None,
                }),
            )]),
            description: Some("every quarter hour".into()),
            ..Default::default()
        };
        let updated = f.registry.update(order.id, "alice", patch).unwrap();
        assert_eq!(updated.schedule, ScheduleDescriptor::custom("15m"));
        assert_eq!(updated.actions[0].id, "step-1");
        assert_eq!(updated.description, "every quarter hour");

        let on = f.registry.toggle_active(order.id, "alice").unwrap();
        assert_eq!(on.next_run, Some(t0() + Duration::minutes(15)));
    }

    #[test]
    fn rename_allowed_while_active() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Old")).unwrap();
        let patch = OrderPatch {
            name: Some(" New ".into()),
            ..Default::default()
        };
        assert_eq!(f.registry.update(order.id, "alice", patch).unwrap().name, "New");
    }

    #[test]
    fn outcome_on_inactive_order_is_precondition_failed() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Off").inactive()).unwrap();
        let err = f
            .registry
            .record_run_outcome(order.id, true, t0(), 1)
            .unwrap_err();
        assert!(matches!(err, OrdersError::PreconditionFailed(_)));
        assert!(f.store.runs_for(order.id).unwrap().is_empty());
    }

    #[test]
    fn due_lists_scheduled_orders_in_next_run_order() {
        let f = fixture();
        let soon = f
            .registry
            .create("alice", NewOrder::new("soon", ScheduleDescriptor::custom("5m"), notify_step()))
            .unwrap();
        let later = f.registry.create("bob", hourly("later")).unwrap();
        f.registry.create("alice", hourly("off").inactive()).unwrap();

        assert!(f.registry.due(t0()).unwrap().is_empty());
        let due = f.registry.due(t0() + Duration::hours(2)).unwrap();
        let ids: Vec<_> = due.iter().map(|o| o.id).collect();
        assert_eq!(ids, [soon.id, later.id]);

        f.registry.mark_running(soon.id, t0()).unwrap();
        let due = f.registry.due(t0() + Duration::hours(2)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(
            f.registry.get(soon.id, "alice").unwrap().state(),
            OrderState::Running
        );
    }

    #[test]
    fn failed_order_is_not_due_until_reactivated() {
        let f = fixture();
        let order = f.registry.create("alice", hourly("Flaky")).unwrap();
        f.registry.record_run_outcome(order.id, false, t0(), 1).unwrap();
        assert!(f.registry.due(t0() + Duration::days(1)).unwrap().is_empty());

        f.registry.toggle_active(order.id, "alice").unwrap();
        f.registry.toggle_active(order.id, "alice").unwrap();
        assert_eq!(f.registry.due(t0() + Duration::days(1)).unwrap().len(), 1);
    }

    #[test]
    fn list_by_owner_filters_and_sorts() {
        let f = fixture();
        f.registry.create("alice", hourly("beta")).unwrap();
        f.registry.create("alice", hourly("Alpha").inactive()).unwrap();
        f.registry.create("bob", hourly("aardvark")).unwrap();

        let all = f
            .registry
            .list_by_owner("alice", &OrderQuery::default())
            .unwrap();
        let names: Vec<_> = all.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "beta"]);

        let active = f
            .registry
            .list_by_owner(
                "alice",
                &OrderQuery {
                    active: Some(true),
                    sort: SortKey::NextRun,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "beta");
    }

    /// Store whose commits always lose the race.
    struct AlwaysConflicts {
        inner: MemoryStore,
        commits: AtomicU32,
    }

    impl OrderStore for AlwaysConflicts {
        fn insert(&self, order: &StandingOrder) -> Result<()> {
            self.inner.insert(order)
        }
        fn get(&self, id: Uuid) -> Result<Option<StandingOrder>> {
            self.inner.get(id)
        }
        fn commit(&self, order: &StandingOrder, expected: u64, _: Option<&RunRecord>) -> Result<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Err(crate::store::conflict(order.id, expected, expected + 1))
        }
        fn list_by_owner(&self, owner_id: &str) -> Result<Vec<StandingOrder>> {
            self.inner.list_by_owner(owner_id)
        }
        fn list_all(&self) -> Result<Vec<StandingOrder>> {
            self.inner.list_all()
        }
        fn runs_for(&self, order_id: Uuid) -> Result<Vec<RunRecord>> {
            self.inner.runs_for(order_id)
        }
    }

    #[test]
    fn conflict_surfaces_after_retries() {
        let store = Arc::new(AlwaysConflicts {
            inner: MemoryStore::new(),
            commits: AtomicU32::new(0),
        });
        let registry = Registry::new(store.clone()).with_config(RegistryConfig {
            max_conflict_retries: 2,
            ..Default::default()
        });
        let order = registry.create("alice", hourly("Contended")).unwrap();

        let err = registry.toggle_active(order.id, "alice").unwrap_err();
        assert!(matches!(err, OrdersError::Conflict { .. }));
        assert_eq!(store.commits.load(Ordering::SeqCst), 3);
        assert!(store.get(order.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn concurrent_outcomes_are_all_counted() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(Registry::new(store).with_config(RegistryConfig {
            max_conflict_retries: 1_000,
            ..Default::default()
        }));
        let order = registry.create("alice", hourly("Busy")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..5 {
                        let at = t0() + Duration::minutes(i * 5 + j);
                        registry
                            .record_run_outcome(order.id, j % 2 == 0, at, 1)
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let done = registry.get(order.id, "alice").unwrap();
        assert_eq!(done.run_count, 40);
        assert_eq!(done.version, 40);
        // 3 of every 5 outcomes per thread succeed.
        assert!((done.success_rate - 24.0 / 40.0).abs() < 1e-9);
        assert_eq!(registry.runs(order.id, "alice").unwrap().len(), 40);
    }

    #[test]
    fn failed_operations_are_reported() {
        let f = fixture();
        let _ = f.registry.delete(Uuid::new_v4(), "alice");
        let history = f.log.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].operation, Operation::Delete);
        assert!(matches!(
            &history[0].outcome,
            Outcome::Failed { kind, .. } if kind == "not_found"
        ));
    }
}
