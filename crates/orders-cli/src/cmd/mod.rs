pub mod config;
pub mod executor;
pub mod init;
pub mod next_run;
pub mod order;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use orders_core::{
    config::{Config, StoreBackend},
    store::{MemoryStore, OrderStore, RedbStore},
    Frequency, Registry, ScheduleDescriptor,
};
use std::path::Path;
use std::sync::Arc;

/// Schedule flags shared by `create`, `edit`, and `next-run`.
#[derive(Args, Debug, Default)]
pub struct ScheduleArgs {
    /// hourly, daily, weekly, monthly, or custom
    #[arg(long)]
    pub frequency: Option<String>,
    /// Time of day, HH:MM (daily, weekly, monthly)
    #[arg(long)]
    pub time: Option<String>,
    /// Weekday (weekly) or day of month 1-31 (monthly)
    #[arg(long)]
    pub day: Option<String>,
    /// Interval such as 15m, 2h, or 1d (custom)
    #[arg(long)]
    pub interval: Option<String>,
}

impl ScheduleArgs {
    /// `None` when no schedule flag was given at all.
    pub fn descriptor(&self) -> anyhow::Result<Option<ScheduleDescriptor>> {
        let Some(frequency) = &self.frequency else {
            if self.time.is_some() || self.day.is_some() || self.interval.is_some() {
                anyhow::bail!("--time, --day, and --interval need --frequency");
            }
            return Ok(None);
        };
        let frequency: Frequency = frequency.parse()?;
        Ok(Some(ScheduleDescriptor {
            frequency,
            time: self.time.clone(),
            day: self.day.clone(),
            interval: self.interval.clone(),
        }))
    }

    pub fn require_descriptor(&self) -> anyhow::Result<ScheduleDescriptor> {
        self.descriptor()?
            .context("--frequency is required")
    }
}

pub fn require_owner(owner: Option<&str>) -> anyhow::Result<&str> {
    match owner.map(str::trim) {
        Some(o) if !o.is_empty() => Ok(o),
        _ => anyhow::bail!("no owner given: pass --owner or set ORDERS_OWNER"),
    }
}

/// Parse an optional RFC 3339 timestamp, defaulting to now.
pub fn parse_at(at: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match at {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid timestamp '{s}' (expected RFC 3339)"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// Open the configured store and build a registry over it.
pub fn open_registry(root: &Path) -> anyhow::Result<Registry> {
    let config = Config::load(root).context("failed to load config (run `orders init` first)")?;
    let store: Arc<dyn OrderStore> = match config.store.backend {
        StoreBackend::Redb => {
            let path = config.db_path(root);
            Arc::new(
                RedbStore::open(&path)
                    .with_context(|| format!("failed to open {}", path.display()))?,
            )
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(Registry::new(store).with_config(config.registry))
}
