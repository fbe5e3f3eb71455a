//! User-feedback notifications for owner operations.
//!
//! The registry reports every create/update/toggle/delete, successful or not,
//! to a [`Notifier`]. What happens next (a toast, a log line, a push message)
//! is up to the implementation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrdersError;

/// Default capacity of [`NotificationLog`].
pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Toggle,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Toggle => "toggle",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub operation: Operation,
    pub owner_id: String,
    /// Missing when the operation failed before an order was identified.
    pub order_id: Option<Uuid>,
    pub title: String,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn succeeded(
        operation: Operation,
        owner_id: &str,
        order_id: Uuid,
        title: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            owner_id: owner_id.to_string(),
            order_id: Some(order_id),
            title: title.into(),
            outcome: Outcome::Succeeded,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        operation: Operation,
        owner_id: &str,
        order_id: Option<Uuid>,
        error: &OrdersError,
    ) -> Self {
        Self {
            operation,
            owner_id: owner_id.to_string(),
            order_id,
            title: format!("{operation} failed"),
            outcome: Outcome::Failed {
                kind: error.kind().to_string(),
                message: error.to_string(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Writes each notification to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: &Notification) {
        match &n.outcome {
            Outcome::Succeeded => tracing::info!(
                operation = %n.operation,
                owner = %n.owner_id,
                order = ?n.order_id,
                "{}",
                n.title
            ),
            Outcome::Failed { kind, message } => tracing::warn!(
                operation = %n.operation,
                owner = %n.owner_id,
                order = ?n.order_id,
                kind = %kind,
                "{message}"
            ),
        }
    }
}

/// Bounded in-memory history; the oldest entry is dropped once full.
pub struct NotificationLog {
    capacity: usize,
    history: Mutex<VecDeque<Notification>>,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot of the history, oldest first.
    pub fn history(&self) -> Vec<Notification> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: &Notification) {
        if let Ok(mut history) = self.history.lock() {
            history.push_back(notification.clone());
            while history.len() > self.capacity {
                history.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded() {
        let log = NotificationLog::new(2);
        for i in 0..3 {
            log.notify(&Notification::succeeded(
                Operation::Create,
                "o",
                Uuid::new_v4(),
                format!("n{i}"),
            ));
        }
        let titles: Vec<_> = log.history().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, ["n1", "n2"]);
    }

    #[test]
    fn failure_carries_error_kind() {
        let err = OrdersError::NotFound("x".into());
        let n = Notification::failed(Operation::Delete, "o", None, &err);
        assert!(!n.is_success());
        match n.outcome {
            Outcome::Failed { kind, message } => {
                assert_eq!(kind, "not_found");
                assert!(message.contains("not found"));
            }
            Outcome::Succeeded => panic!("expected failure"),
        }
    }
}
