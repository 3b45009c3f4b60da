//! Cross-workflow orchestration.
//!
//! Before a workflow runs, its declared dependencies execute (with variable
//! import); after it reaches a terminal status, its triggers fire (with
//! variable export). Both sides may recurse, so the orchestrator carries the
//! set of workflow names on the current execution path and treats a revisit
//! as a fatal cycle.

use crate::error::EngineError;
use crate::model::Workflow;
use crate::parser;
use crate::resolver::{resolve_param, EvalContext};
use crate::WorkflowEngine;
use corynth_state::StateBackend;
use corynth_types::{ExecutionMode, ExecutionState, ExecutionStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Executes chains of workflows: dependencies, the entry workflow, triggers.
pub struct Orchestrator {
    engine: Arc<WorkflowEngine>,
    store: Arc<dyn StateBackend>,
}

impl Orchestrator {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        let store = engine.store();
        Self { engine, store }
    }

    /// Execute a workflow file together with its dependency and trigger
    /// relations.
    pub async fn execute_chain(
        &self,
        cancel: &CancellationToken,
        workflow_file: &Path,
        variables: HashMap<String, Value>,
    ) -> Result<ExecutionState, EngineError> {
        let mut path = Vec::new();
        self.run_chain(cancel, workflow_file.to_path_buf(), variables, &mut path, "cli").await
    }

    /// Recursive chain step; boxed because dependencies and triggers recurse.
    fn run_chain<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        workflow_file: PathBuf,
        variables: HashMap<String, Value>,
        path: &'a mut Vec<String>,
        triggered_by: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionState, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let workflow = parser::load_workflow_file(&workflow_file).await?;
            if path.contains(&workflow.name) {
                let chain = format!("{} -> {}", path.join(" -> "), workflow.name);
                return Err(EngineError::workflow_cycle(chain));
            }

            path.push(workflow.name.clone());
            let outcome = self
                .run_loaded(cancel, &workflow, &workflow_file, variables, path, triggered_by)
                .await;
            path.pop();
            outcome
        })
    }

    async fn run_loaded(
        &self,
        cancel: &CancellationToken,
        workflow: &Workflow,
        workflow_file: &Path,
        mut variables: HashMap<String, Value>,
        path: &mut Vec<String>,
        triggered_by: &str,
    ) -> Result<ExecutionState, EngineError> {
        let base_dir = workflow_file.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut child_ids = Vec::new();
        let mut imported = HashMap::new();

        for dependency in &workflow.dependencies {
            let dependency_file = base_dir.join(&dependency.workflow_file);
            let mut dependency_vars = variables.clone();
            apply_overrides(&mut dependency_vars, &dependency.variables, &variables);

            info!(
                workflow = %workflow.name,
                dependency = %dependency.workflow_file,
                required = dependency.required,
                "executing dependency workflow"
            );
            match self
                .run_chain(cancel, dependency_file, dependency_vars, path, "dependency")
                .await
            {
                Ok(state) if state.status == ExecutionStatus::Success => {
                    child_ids.push(state.id.clone());
                    self.import_outputs(dependency, &state, &mut variables, &mut imported).await?;
                }
                Ok(state) => {
                    if dependency.required {
                        return Err(EngineError::dependency(
                            &dependency.workflow_file,
                            format!("terminal status {:?}", state.status),
                        ));
                    }
                    warn!(dependency = %dependency.workflow_file, status = ?state.status, "optional dependency did not succeed");
                    child_ids.push(state.id.clone());
                }
                // Cycles abort the whole chain regardless of `required`.
                Err(EngineError::WorkflowCycle { chain }) => {
                    return Err(EngineError::WorkflowCycle { chain });
                }
                Err(error) => {
                    if dependency.required {
                        return Err(EngineError::dependency(&dependency.workflow_file, error.to_string()));
                    }
                    warn!(dependency = %dependency.workflow_file, %error, "optional dependency failed");
                }
            }
        }

        let mut state = self
            .engine
            .execute(cancel, workflow, variables.clone(), ExecutionMode::Apply)
            .await?;
        let succeeded = state.status == ExecutionStatus::Success;

        for trigger in &workflow.triggers {
            if !trigger.fires_for(succeeded) {
                continue;
            }

            let mut trigger_vars = HashMap::new();
            if trigger.export_all {
                for (key, value) in &state.outputs {
                    trigger_vars.insert(key.clone(), value.clone());
                }
                for (key, value) in &state.variables {
                    trigger_vars.entry(key.clone()).or_insert_with(|| value.clone());
                }
            } else {
                for key in &trigger.export_vars {
                    if let Some(value) = state.outputs.get(key).or_else(|| state.variables.get(key)) {
                        trigger_vars.insert(key.clone(), value.clone());
                    }
                }
            }
            apply_overrides(&mut trigger_vars, &trigger.variables, &variables);

            let trigger_file = base_dir.join(&trigger.workflow_file);
            info!(workflow = %workflow.name, trigger = %trigger.workflow_file, "firing trigger workflow");
            match self.run_chain(cancel, trigger_file, trigger_vars, path, "trigger").await {
                Ok(trigger_state) => {
                    if trigger_state.status != ExecutionStatus::Success {
                        warn!(trigger = %trigger.workflow_file, status = ?trigger_state.status, "trigger workflow did not succeed");
                    }
                    child_ids.push(trigger_state.id);
                }
                Err(error) => {
                    warn!(trigger = %trigger.workflow_file, %error, "trigger workflow failed; parent status unchanged");
                }
            }
        }

        // Stamp the parent/child relation both ways now that every id is
        // known; dependency records exist before their parent's.
        for child_id in &child_ids {
            if let Ok(mut child) = self.store.load_execution(child_id).await {
                child.parent_workflow_id = Some(state.id.clone());
                if let Err(error) = self.store.save_execution(&child).await {
                    warn!(child = %child_id, %error, "failed to record parent link");
                }
            }
        }

        state.triggered_by = Some(triggered_by.to_string());
        state.child_workflow_ids = child_ids;
        state.imported_variables = imported;
        self.store.save_execution(&state).await?;
        Ok(state)
    }

    /// Merge a successful dependency's latest outputs into the parent's
    /// variables; dependency values overwrite parent keys on conflict.
    async fn import_outputs(
        &self,
        dependency: &crate::model::WorkflowDependency,
        state: &ExecutionState,
        variables: &mut HashMap<String, Value>,
        imported: &mut HashMap<String, Value>,
    ) -> Result<(), EngineError> {
        if !dependency.import_all && dependency.import_vars.is_empty() {
            return Ok(());
        }

        let latest = match self.store.load_workflow_output(&state.workflow_name).await {
            Ok(latest) => latest,
            Err(error) => {
                if dependency.required {
                    return Err(EngineError::dependency(
                        &dependency.workflow_file,
                        format!("no outputs recorded: {error}"),
                    ));
                }
                warn!(dependency = %dependency.workflow_file, %error, "dependency has no outputs to import");
                return Ok(());
            }
        };

        if dependency.import_all {
            for (key, value) in latest.outputs {
                imported.insert(key.clone(), value.clone());
                variables.insert(key, value);
            }
        } else {
            for key in &dependency.import_vars {
                if let Some(value) = latest.outputs.get(key) {
                    imported.insert(key.clone(), value.clone());
                    variables.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

/// Overlay raw override strings, interpolating against the parent's
/// variables.
fn apply_overrides(
    target: &mut HashMap<String, Value>,
    overrides: &indexmap::IndexMap<String, String>,
    parent_variables: &HashMap<String, Value>,
) {
    if overrides.is_empty() {
        return;
    }
    let mut ctx = EvalContext::default();
    ctx.variables = parent_variables
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (key, raw) in overrides {
        target.insert(key.clone(), resolve_param(raw, &ctx));
    }
}
