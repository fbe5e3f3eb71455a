//! Filtering and sorting for order listings.

use crate::error::{OrdersError, Result};
use crate::order::{OrderStatus, StandingOrder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Status,
    LastRun,
    NextRun,
}

impl FromStr for SortKey {
    type Err = OrdersError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "name" => Ok(SortKey::Name),
            "status" => Ok(SortKey::Status),
            "last_run" => Ok(SortKey::LastRun),
            "next_run" => Ok(SortKey::NextRun),
            other => Err(OrdersError::Validation(format!(
                "unknown sort key '{other}' (expected name, status, last_run, or next_run)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Listing options for [`crate::registry::Registry::list_by_owner`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderQuery {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring matched against name and description.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderQuery {
    pub fn matches(&self, order: &StandingOrder) -> bool {
        if self.active.is_some_and(|a| a != order.is_active) {
            return false;
        }
        if self.status.is_some_and(|s| s != order.status) {
            return false;
        }
        match self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                order.name.to_lowercase().contains(&needle)
                    || order.description.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }

    /// Filter and sort. Ties (and the direction flip) never affect the `id`
    /// tie-break, which is always ascending.
    pub fn apply(&self, orders: Vec<StandingOrder>) -> Vec<StandingOrder> {
        let mut out: Vec<StandingOrder> = orders.into_iter().filter(|o| self.matches(o)).collect();
        out.sort_by(|a, b| {
            let primary = match self.sort {
                SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortKey::Status => a.status.cmp(&b.status),
                SortKey::LastRun => missing_last(a.last_run, b.last_run),
                SortKey::NextRun => missing_last(a.next_run, b.next_run),
            };
            let primary = match self.direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });
        out
    }
}

/// Ascending timestamps with `None` after every `Some`.
fn missing_last(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
