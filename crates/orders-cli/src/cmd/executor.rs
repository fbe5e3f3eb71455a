//! Commands an external executor uses to drive standing orders.

use crate::cmd::{open_registry, parse_at, require_owner};
use crate::output::{fmt_rate, fmt_time, print_json, print_table};
use anyhow::Context;
use std::path::Path;
use uuid::Uuid;

pub fn start(root: &Path, id: Uuid, at: Option<&str>, json: bool) -> anyhow::Result<()> {
    let started_at = parse_at(at)?;
    let registry = open_registry(root)?;
    let order = registry
        .mark_running(id, started_at)
        .with_context(|| format!("cannot start standing order {id}"))?;

    if json {
        print_json(&order)?;
    } else {
        println!("Running '{}' since {}", order.name, fmt_time(Some(started_at)));
    }
    Ok(())
}

pub fn record(
    root: &Path,
    id: Uuid,
    success: bool,
    at: Option<&str>,
    duration_ms: u64,
    json: bool,
) -> anyhow::Result<()> {
    let executed_at = parse_at(at)?;
    let registry = open_registry(root)?;
    let order = registry
        .record_run_outcome(id, success, executed_at, duration_ms)
        .with_context(|| format!("cannot record run for standing order {id}"))?;

    if json {
        print_json(&order)?;
    } else {
        let outcome = if success { "success" } else { "failure" };
        println!(
            "Recorded {outcome} for '{}': {} runs, {} successful. Next run: {}",
            order.name,
            order.run_count,
            fmt_rate(order.success_rate, order.run_count),
            fmt_time(order.next_run)
        );
    }
    Ok(())
}

pub fn due(root: &Path, at: Option<&str>, json: bool) -> anyhow::Result<()> {
    let now = parse_at(at)?;
    let registry = open_registry(root)?;
    let orders = registry.due(now).context("failed to list due orders")?;

    if json {
        print_json(&orders)?;
        return Ok(());
    }

    if orders.is_empty() {
        println!("Nothing due at {}.", fmt_time(Some(now)));
        return Ok(());
    }

    let rows: Vec<Vec<String>> = orders
        .iter()
        .map(|o| {
            vec![
                o.id.to_string(),
                o.owner_id.clone(),
                o.name.clone(),
                fmt_time(o.next_run),
                o.actions.len().to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "OWNER", "NAME", "NEXT RUN", "STEPS"], rows);
    Ok(())
}

pub fn runs(root: &Path, owner: Option<&str>, id: Uuid, json: bool) -> anyhow::Result<()> {
    let owner = require_owner(owner)?;
    let registry = open_registry(root)?;
    let runs = registry.runs(id, owner)?;

    if json {
        print_json(&runs)?;
        return Ok(());
    }

    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = runs
        .iter()
        .map(|r| {
            vec![
                fmt_time(Some(r.executed_at)),
                if r.success { "ok" } else { "failed" }.to_string(),
                format!("{}ms", r.duration_ms),
            ]
        })
        .collect();
    print_table(&["EXECUTED", "OUTCOME", "DURATION"], rows);
    Ok(())
}
