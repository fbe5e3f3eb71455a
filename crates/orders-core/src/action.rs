//! Action pipeline: the ordered steps a standing order asks the executor to run.
//!
//! Steps travel as `{ "id", "type", "config" }`. Known `type` tags map to a
//! typed [`ActionKind`] variant; any other tag is kept verbatim as
//! [`ActionKind::Unknown`] so newer executors can add step kinds without a
//! schema change here.

use crate::error::{OrdersError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Step configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataCollectionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiAnalysisConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Branch to other steps of the same pipeline by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalConfig {
    #[serde(default)]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_true: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_false: Vec<String>,
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    DataCollection(DataCollectionConfig),
    AiAnalysis(AiAnalysisConfig),
    Notification(NotificationConfig),
    Conditional(ConditionalConfig),
    /// A step type this crate does not know; config is passed through untouched.
    Unknown {
        kind: String,
        config: serde_json::Value,
    },
}

impl ActionKind {
    pub fn type_tag(&self) -> &str {
        match self {
            ActionKind::DataCollection(_) => "data_collection",
            ActionKind::AiAnalysis(_) => "ai_analysis",
            ActionKind::Notification(_) => "notification",
            ActionKind::Conditional(_) => "conditional",
            ActionKind::Unknown { kind, .. } => kind,
        }
    }

    fn from_parts(kind: String, config: serde_json::Value) -> Result<Self> {
        // `{}` and `null` both mean "no options" for the known kinds.
        let config = if config.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            config
        };
        let typed = |e: serde_json::Error| {
            OrdersError::Validation(format!("invalid config for '{kind}' step: {e}"))
        };
        Ok(match kind.as_str() {
            "data_collection" => {
                ActionKind::DataCollection(serde_json::from_value(config).map_err(typed)?)
            }
            "ai_analysis" => ActionKind::AiAnalysis(serde_json::from_value(config).map_err(typed)?),
            "notification" => {
                ActionKind::Notification(serde_json::from_value(config).map_err(typed)?)
            }
            "conditional" => {
                ActionKind::Conditional(serde_json::from_value(config).map_err(typed)?)
            }
            "" => return Err(OrdersError::Validation("step type must not be empty".into())),
            _ => ActionKind::Unknown {
                kind: kind.clone(),
                config,
            },
        })
    }

    fn config_value(&self) -> serde_json::Value {
        let value = match self {
            ActionKind::DataCollection(c) => serde_json::to_value(c),
            ActionKind::AiAnalysis(c) => serde_json::to_value(c),
            ActionKind::Notification(c) => serde_json::to_value(c),
            ActionKind::Conditional(c) => serde_json::to_value(c),
            ActionKind::Unknown { config, .. } => return config.clone(),
        };
        // Plain structs of strings always serialize.
        value.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// ActionStep
// ---------------------------------------------------------------------------

/// One step of an action pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct ActionStep {
    /// Unique within the owning pipeline. Empty until the registry assigns one.
    pub id: String,
    pub kind: ActionKind,
}

#[derive(Serialize, Deserialize)]
struct RawStep {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: serde_json::Value,
}

impl TryFrom<RawStep> for ActionStep {
    type Error = OrdersError;

    fn try_from(raw: RawStep) -> Result<Self> {
        Ok(Self {
            id: raw.id,
            kind: ActionKind::from_parts(raw.kind, raw.config)?,
        })
    }
}

impl From<ActionStep> for RawStep {
    fn from(step: ActionStep) -> Self {
        RawStep {
            config: step.kind.config_value(),
            kind: step.kind.type_tag().to_string(),
            id: step.id,
        }
    }
}

impl ActionStep {
    pub fn new(id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn notification(id: impl Into<String>) -> Self {
        Self::new(id, ActionKind::Notification(NotificationConfig::default()))
    }
}

// ---------------------------------------------------------------------------
// Pipeline operations
// ---------------------------------------------------------------------------

/// Parse a JSON array of steps, e.g. `[{"type":"notification","config":{}}]`.
pub fn parse_pipeline(json: &str) -> Result<Vec<ActionStep>> {
    serde_json::from_str(json).map_err(|e| OrdersError::Validation(format!("invalid actions: {e}")))
}

/// Give every id-less step the id `step-<position>` (1-based). When that id
/// is already taken by another step, the number is bumped until it is free.
pub fn assign_missing_ids(steps: &mut [ActionStep]) {
    let mut taken: HashSet<String> = steps
        .iter()
        .filter(|s| !s.id.trim().is_empty())
        .map(|s| s.id.clone())
        .collect();

    for (i, step) in steps.iter_mut().enumerate() {
        if !step.id.trim().is_empty() {
            continue;
        }
        let mut n = i + 1;
        while taken.contains(&format!("step-{n}")) {
            n += 1;
        }
        step.id = format!("step-{n}");
        taken.insert(step.id.clone());
    }
}

/// Check a pipeline: non-empty, at most `max_len` steps, unique ids, and
/// conditionals with a condition whose branches point at other steps of the
/// same pipeline.
pub fn validate_pipeline(steps: &[ActionStep], max_len: usize) -> Result<()> {
    if steps.is_empty() {
        return Err(OrdersError::Validation(
            "action pipeline must contain at least one step".into(),
        ));
    }
    if steps.len() > max_len {
        return Err(OrdersError::Validation(format!(
            "action pipeline has {} steps; the limit is {max_len}",
            steps.len()
        )));
    }

    let mut seen = HashSet::new();
    for step in steps {
        if step.id.trim().is_empty() {
            return Err(OrdersError::Validation("step id must not be empty".into()));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(OrdersError::Validation(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
    }

    for step in steps {
        if let ActionKind::Conditional(cond) = &step.kind {
            if cond.condition.trim().is_empty() {
                return Err(OrdersError::Validation(format!(
                    "conditional step '{}' needs a condition",
                    step.id
                )));
            }
            for target in cond.on_true.iter().chain(&cond.on_false) {
                if target == &step.id {
                    return Err(OrdersError::Validation(format!(
                        "conditional step '{}' cannot branch to itself",
                        step.id
                    )));
                }
                if !seen.contains(target.as_str()) {
                    return Err(OrdersError::Validation(format!(
                        "conditional step '{}' references unknown step '{target}'",
                        step.id
                    )));
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
