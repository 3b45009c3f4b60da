//! Execution records persisted by the state store.
//!
//! An [`ExecutionState`] is created when a workflow run starts and written
//! once the run reaches a terminal status. Loop iterations are recorded as
//! synthetic per-iteration [`StepState`]s named `<step>[<index>]` plus a
//! summary record under the original step name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Terminal and intermediate states of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal; terminal states are immutable.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

/// Status of a single step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
    Cancelled,
}

/// What the engine was asked to do for this execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Registry and state preparation only; no steps execute.
    Init,
    /// Planner only.
    Plan,
    /// Full step execution.
    #[default]
    Apply,
}

/// Record of one executed (or skipped/cancelled) step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    /// Step name; loop iterations use `<step>[<index>]`.
    pub name: String,
    pub status: StepStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Outputs returned by the plugin, plus any exported aliases.
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Number of attempts consumed; zero when the step never ran.
    #[serde(default)]
    pub attempts: u32,
}

impl StepState {
    /// A step record in its initial `pending` shape.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            outputs: HashMap::new(),
            error_message: None,
            attempts: 0,
        }
    }
}

/// One run of a workflow, identified by `id`.
///
/// The serialized form carries `error_message` only; there is no separate
/// non-serialized error handle to reconstruct on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Globally unique execution id.
    pub id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<StepState>,
    /// Resolved variables, defaults included. Sensitive values are redacted
    /// before this record is persisted.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Collected workflow outputs.
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// What started this execution: `cli`, `dependency`, or `trigger`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_workflow_id: Option<String>,
    #[serde(default)]
    pub child_workflow_ids: Vec<String>,
    /// Variables imported from dependency workflows before this run started.
    #[serde(default)]
    pub imported_variables: HashMap<String, Value>,
    /// Opaque state carried across steps for plugins that request it.
    #[serde(default)]
    pub persistent_state: HashMap<String, Value>,
}

impl ExecutionState {
    /// Fresh execution record in `pending` status.
    pub fn new(id: impl Into<String>, workflow_name: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            id: id.into(),
            workflow_name: workflow_name.into(),
            status: ExecutionStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            steps: Vec::new(),
            variables: HashMap::new(),
            outputs: HashMap::new(),
            error_message: None,
            triggered_by: None,
            execution_mode: mode,
            parent_workflow_id: None,
            child_workflow_ids: Vec::new(),
            imported_variables: HashMap::new(),
            persistent_state: HashMap::new(),
        }
    }

    /// Find the recorded state for a step by name.
    pub fn step(&self, name: &str) -> Option<&StepState> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Duration of the run when it has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Compact listing row for `list_executions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub step_count: usize,
}

impl From<&ExecutionState> for ExecutionSummary {
    fn from(state: &ExecutionState) -> Self {
        Self {
            id: state.id.clone(),
            workflow_name: state.workflow_name.clone(),
            status: state.status,
            start_time: state.start_time,
            end_time: state.end_time,
            step_count: state.steps.len(),
        }
    }
}

/// Latest successful outputs of a workflow, keyed by workflow name.
///
/// Overwritten on each successful run that produced outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutput {
    pub workflow_name: String,
    pub outputs: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowOutput {
    pub fn new(workflow_name: impl Into<String>, outputs: HashMap<String, Value>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            outputs,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execution_state_round_trips_through_json() {
        let mut state = ExecutionState::new("exec-1", "deploy", ExecutionMode::Apply);
        state.status = ExecutionStatus::Failure;
        state.error_message = Some("step 'build' failed".into());
        state.variables.insert("env".into(), json!("staging"));
        state.steps.push(StepState {
            name: "build".into(),
            status: StepStatus::Failure,
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            outputs: HashMap::new(),
            error_message: Some("boom".into()),
            attempts: 3,
        });

        let encoded = serde_json::to_string(&state).expect("serialize");
        let decoded: ExecutionState = serde_json::from_str(&encoded).expect("deserialize");

        assert_eq!(decoded.id, state.id);
        assert_eq!(decoded.status, ExecutionStatus::Failure);
        assert_eq!(decoded.error_message.as_deref(), Some("step 'build' failed"));
        assert_eq!(decoded.steps.len(), 1);
        assert_eq!(decoded.steps[0].attempts, 3);
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&ExecutionStatus::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&StepStatus::Skipped).unwrap(), "\"skipped\"");
        assert_eq!(serde_json::to_string(&ExecutionMode::Apply).unwrap(), "\"apply\"");
    }

    #[test]
    fn terminal_statuses_are_recognized() {
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Failure.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
    }
}
