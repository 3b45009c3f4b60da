//! Pre-execution plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Ordered description of the steps an `apply` would run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub workflow_name: String,
    pub created_at: DateTime<Utc>,
    /// Variables the plan was built against (sensitive values redacted).
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub planned_steps: Vec<PlannedStep>,
    #[serde(default)]
    pub warnings: Vec<PlanWarning>,
}

impl Plan {
    /// Sum of per-step estimates.
    pub fn estimated_duration(&self) -> Duration {
        self.planned_steps.iter().map(|step| step.estimated_duration).sum()
    }
}

/// One step in dependency order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub name: String,
    pub plugin: String,
    pub action: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Estimate from history when available, 30 seconds otherwise.
    pub estimated_duration: Duration,
}

/// Non-fatal issue surfaced while planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWarning {
    /// Step the warning concerns, when step-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub message: String,
}

impl PlanWarning {
    pub fn for_step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            message: message.into(),
        }
    }

    pub fn workflow(message: impl Into<String>) -> Self {
        Self {
            step: None,
            message: message.into(),
        }
    }
}
