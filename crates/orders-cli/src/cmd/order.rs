use crate::cmd::{open_registry, require_owner, ScheduleArgs};
use crate::output::{fmt_rate, fmt_schedule, fmt_time, print_json, print_table};
use anyhow::Context;
use clap::Args;
use orders_core::{
    action::{self, ActionStep},
    query::{OrderQuery, SortDirection, SortKey},
    NewOrder, OrderPatch, OrderStatus, StandingOrder,
};
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Argument groups
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
pub struct ActionArgs {
    /// Action pipeline as a JSON array, e.g. '[{"type":"notification"}]'
    #[arg(long, conflicts_with = "actions_file")]
    pub actions: Option<String>,
    /// Read the action pipeline JSON from a file
    #[arg(long)]
    pub actions_file: Option<PathBuf>,
}

impl ActionArgs {
    fn pipeline(&self) -> anyhow::Result<Option<Vec<ActionStep>>> {
        let json = match (&self.actions, &self.actions_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => return Ok(None),
        };
        Ok(Some(action::parse_pipeline(&json)?))
    }
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only active orders
    #[arg(long, conflicts_with = "inactive")]
    pub active: bool,
    /// Only inactive orders
    #[arg(long)]
    pub inactive: bool,
    /// Only orders with this status (active, paused, completed, failed)
    #[arg(long)]
    pub status: Option<String>,
    /// Case-insensitive text matched against name and description
    #[arg(long)]
    pub search: Option<String>,
    /// Sort key: name, status, last-run, next-run
    #[arg(long, default_value = "name")]
    pub sort: String,
    /// Sort descending
    #[arg(long)]
    pub desc: bool,
}

impl ListArgs {
    fn query(&self) -> anyhow::Result<OrderQuery> {
        let active = match (self.active, self.inactive) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        let status = self
            .status
            .as_deref()
            .map(str::parse::<OrderStatus>)
            .transpose()?;
        Ok(OrderQuery {
            active,
            status,
            text: self.search.clone(),
            sort: self.sort.parse::<SortKey>()?,
            direction: if self.desc {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            },
        })
    }
}

pub struct CreateInput {
    pub name: String,
    pub description: String,
    pub schedule: ScheduleArgs,
    pub actions: ActionArgs,
    pub inactive: bool,
}

pub struct EditInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub schedule: ScheduleArgs,
    pub actions: ActionArgs,
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

pub fn create(
    root: &Path,
    owner: Option<&str>,
    input: CreateInput,
    json: bool,
) -> anyhow::Result<()> {
    let owner = require_owner(owner)?;
    let schedule = input.schedule.require_descriptor()?;
    let actions = input
        .actions
        .pipeline()?
        .context("--actions or --actions-file is required")?;

    let new = NewOrder {
        name: input.name,
        description: input.description,
        schedule,
        actions,
        active: !input.inactive,
    };
    let registry = open_registry(root)?;
    let order = registry
        .create(owner, new)
        .context("failed to create standing order")?;

    if json {
        print_json(&order)?;
    } else {
        println!("Created standing order {} ({})", order.id, order.name);
        match order.next_run {
            Some(_) => println!("Next run: {}", fmt_time(order.next_run)),
            None => println!("Inactive. Activate with: orders toggle {}", order.id),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

pub fn list(root: &Path, owner: Option<&str>, args: ListArgs, json: bool) -> anyhow::Result<()> {
    let owner = require_owner(owner)?;
    let query = args.query()?;
    let registry = open_registry(root)?;
    let orders = registry
        .list_by_owner(owner, &query)
        .context("failed to list standing orders")?;

    if json {
        print_json(&orders)?;
        return Ok(());
    }

    if orders.is_empty() {
        println!("No standing orders.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = orders
        .iter()
        .map(|o| {
            vec![
                o.id.to_string(),
                o.name.clone(),
                fmt_schedule(&o.schedule),
                o.state().to_string(),
                o.status.to_string(),
                o.run_count.to_string(),
                fmt_rate(o.success_rate, o.run_count),
                fmt_time(o.next_run),
            ]
        })
        .collect();
    print_table(
        &[
            "ID", "NAME", "SCHEDULE", "STATE", "STATUS", "RUNS", "SUCCESS", "NEXT RUN",
        ],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

pub fn show(root: &Path, owner: Option<&str>, id: Uuid, json: bool) -> anyhow::Result<()> {
    let owner = require_owner(owner)?;
    let registry = open_registry(root)?;
    let order = registry.get(id, owner)?;

    if json {
        print_json(&order)?;
        return Ok(());
    }
    print_order(&order);
    Ok(())
}

fn print_order(order: &StandingOrder) {
    println!("Order:    {} ({})", order.name, order.id);
    if !order.description.is_empty() {
        println!("Desc:     {}", order.description);
    }
    println!("Schedule: {}", fmt_schedule(&order.schedule));
    println!("State:    {} [{}]", order.state(), order.status);
    println!(
        "Runs:     {} (success {})",
        order.run_count,
        fmt_rate(order.success_rate, order.run_count)
    );
    println!("Last run: {}", fmt_time(order.last_run));
    println!("Next run: {}", fmt_time(order.next_run));

    println!("\nActions ({}):", order.actions.len());
    for step in &order.actions {
        println!("  [{}] {}", step.id, step.kind.type_tag());
    }
}

// ---------------------------------------------------------------------------
// edit
// ---------------------------------------------------------------------------

pub fn edit(
    root: &Path,
    owner: Option<&str>,
    id: Uuid,
    input: EditInput,
    json: bool,
) -> anyhow::Result<()> {
    let owner = require_owner(owner)?;
    let patch = OrderPatch {
        name: input.name,
        description: input.description,
        schedule: input.schedule.descriptor()?,
        actions: input.actions.pipeline()?,
    };
    if patch.is_empty() {
        anyhow::bail!("nothing to change: pass --name, --description, --frequency, or --actions");
    }

    let registry = open_registry(root)?;
    let order = registry
        .update(id, owner, patch)
        .with_context(|| format!("failed to edit standing order {id}"))?;

    if json {
        print_json(&order)?;
    } else {
        println!("Updated standing order {} ({})", order.id, order.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// toggle / delete
// ---------------------------------------------------------------------------

pub fn toggle(root: &Path, owner: Option<&str>, id: Uuid, json: bool) -> anyhow::Result<()> {
    let owner = require_owner(owner)?;
    let registry = open_registry(root)?;
    let order = registry.toggle_active(id, owner)?;

    if json {
        print_json(&serde_json::json!({
            "id": order.id,
            "is_active": order.is_active,
            "status": order.status,
            "next_run": order.next_run,
        }))?;
    } else if order.is_active {
        println!("Activated '{}'. Next run: {}", order.name, fmt_time(order.next_run));
    } else {
        println!("Deactivated '{}'", order.name);
    }
    Ok(())
}

pub fn delete(root: &Path, owner: Option<&str>, id: Uuid, json: bool) -> anyhow::Result<()> {
    let owner = require_owner(owner)?;
    let registry = open_registry(root)?;
    registry.delete(id, owner)?;

    if json {
        print_json(&serde_json::json!({ "id": id, "deleted": true }))?;
    } else {
        println!("Deleted standing order {id}");
    }
    Ok(())
}
