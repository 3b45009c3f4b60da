//! Per-execution runtime.
//!
//! Drives one workflow run: variable merge, dependency-ordered execution,
//! parallel groups, hook phases, output collection, and persistence.

use crate::dag;
use crate::dispatch::ActionDispatcher;
use crate::error::EngineError;
use crate::model::{Step, Workflow};
use crate::plan::build_plan;
use crate::resolver::{resolve_param, EvalContext};
use crate::step_exec::{run_step, StepRun};
use crate::vars::{merge_variables, redact_outputs, redact_variables, MergedVariables};
use chrono::Utc;
use corynth_state::StateBackend;
use corynth_types::{ExecutionMode, ExecutionState, ExecutionStatus, Plan, StepState, StepStatus, WorkflowOutput};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Output keys never merged into workflow outputs.
const RESERVED_OUTPUT_KEYS: [&str; 3] = ["stdout", "stderr", "exit_code"];

/// The workflow execution engine.
pub struct WorkflowEngine {
    dispatcher: Arc<dyn ActionDispatcher>,
    store: Arc<dyn StateBackend>,
}

impl WorkflowEngine {
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>, store: Arc<dyn StateBackend>) -> Self {
        Self { dispatcher, store }
    }

    pub fn store(&self) -> Arc<dyn StateBackend> {
        self.store.clone()
    }

    /// Build a plan without executing anything.
    pub async fn plan(&self, workflow: &Workflow, variables: HashMap<String, Value>) -> Result<Plan, EngineError> {
        let merged = merge_variables(workflow, variables)?;
        build_plan(workflow, &merged.ctx, self.dispatcher.as_ref(), self.store.as_ref()).await
    }

    /// Run a workflow to a terminal state and persist the result.
    ///
    /// Parse and validation problems return an error without creating an
    /// execution record; step failures produce a `failure` record.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        workflow: &Workflow,
        variables: HashMap<String, Value>,
        mode: ExecutionMode,
    ) -> Result<ExecutionState, EngineError> {
        let merged = merge_variables(workflow, variables)?;
        let plan_steps = workflow.plan_steps();
        let ordered = dag::order_steps(&plan_steps)?;

        let mut state = ExecutionState::new(Uuid::new_v4().to_string(), &workflow.name, mode);
        state.status = ExecutionStatus::Running;
        state.variables = merged.ctx.variables.clone().into_iter().collect();
        info!(workflow = %workflow.name, execution = %state.id, ?mode, "execution started");

        match mode {
            ExecutionMode::Init => {
                finish(&mut state, ExecutionStatus::Success, None);
                self.persist(&mut state, &merged, false).await?;
                return Ok(state);
            }
            ExecutionMode::Plan => {
                let plan = build_plan(workflow, &merged.ctx, self.dispatcher.as_ref(), self.store.as_ref()).await?;
                for warning in &plan.warnings {
                    warn!(workflow = %workflow.name, step = ?warning.step, "{}", warning.message);
                }
                finish(&mut state, ExecutionStatus::Success, None);
                self.persist(&mut state, &merged, false).await?;
                return Ok(state);
            }
            ExecutionMode::Apply => {}
        }

        let mut ctx = merged.ctx.clone();
        let mut failure: Option<String> = None;
        let mut cancelled = false;

        'batches: for batch in batch_steps(workflow, &ordered) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let runs = if batch.len() == 1 {
                let step = batch[0];
                vec![(step, run_step(step, &ctx, self.dispatcher.clone(), cancel).await)]
            } else {
                self.run_parallel_batch(&batch, &ctx, cancel).await
            };

            for (step, run) in runs {
                let succeeded = run.succeeded();
                if succeeded {
                    ctx.insert_step_outputs(&step.name, &run.outputs);
                }
                if run.cancelled {
                    cancelled = true;
                }
                if run.halt && !run.cancelled && failure.is_none() {
                    failure = run
                        .records
                        .iter()
                        .rev()
                        .find_map(|record| record.error_message.clone())
                        .or_else(|| Some(format!("step '{}' failed", step.name)));
                }
                state.steps.extend(run.records);
            }

            if cancelled || failure.is_some() {
                break 'batches;
            }
        }

        if cancelled {
            // Hook steps do not run on cancellation.
            mark_pending_cancelled(&mut state, &ordered);
            finish(&mut state, ExecutionStatus::Cancelled, Some("execution cancelled".into()));
        } else if let Some(message) = failure {
            self.run_hooks(workflow, &workflow.on_failure, &ctx, cancel, &mut state).await;
            finish(&mut state, ExecutionStatus::Failure, Some(message));
        } else {
            self.run_hooks(workflow, &workflow.on_success, &ctx, cancel, &mut state).await;
            state.outputs = collect_outputs(workflow, &ctx, &state);
            finish(&mut state, ExecutionStatus::Success, None);
        }

        let write_outputs = state.status == ExecutionStatus::Success && !state.outputs.is_empty();
        self.persist(&mut state, &merged, write_outputs).await?;
        info!(workflow = %workflow.name, execution = %state.id, status = ?state.status, "execution finished");
        Ok(state)
    }

    async fn run_parallel_batch<'a>(
        &self,
        batch: &[&'a Step],
        ctx: &EvalContext,
        cancel: &CancellationToken,
    ) -> Vec<(&'a Step, StepRun)> {
        let mut join = JoinSet::new();
        for step in batch {
            let step_owned = (*step).clone();
            let task_ctx = ctx.clone();
            let dispatcher = self.dispatcher.clone();
            let cancel = cancel.clone();
            join.spawn(async move {
                let run = run_step(&step_owned, &task_ctx, dispatcher, &cancel).await;
                (step_owned.name, run)
            });
        }

        let mut by_name: HashMap<String, StepRun> = HashMap::new();
        while let Some(joined) = join.join_next().await {
            if let Ok((name, run)) = joined {
                by_name.insert(name, run);
            }
        }

        // Report in declaration order regardless of completion order.
        batch
            .iter()
            .filter_map(|step| by_name.remove(&step.name).map(|run| (*step, run)))
            .collect()
    }

    /// Run hook steps in declaration order; their outcome is recorded but
    /// never propagates to the execution status.
    async fn run_hooks(
        &self,
        workflow: &Workflow,
        hooks: &[String],
        ctx: &EvalContext,
        cancel: &CancellationToken,
        state: &mut ExecutionState,
    ) {
        for name in hooks {
            let Some(step) = workflow.step(name) else { continue };
            info!(step = %name, "running hook step");
            let run = run_step(step, ctx, self.dispatcher.clone(), cancel).await;
            if !run.succeeded() {
                warn!(step = %name, "hook step did not succeed");
            }
            state.steps.extend(run.records);
        }
    }

    async fn persist(
        &self,
        state: &mut ExecutionState,
        merged: &MergedVariables,
        write_outputs: bool,
    ) -> Result<(), EngineError> {
        redact_variables(&mut state.variables, &merged.sensitive);
        redact_outputs(&mut state.outputs, &merged.sensitive, &merged.ctx.variables);
        self.store.save_execution(state).await?;
        if write_outputs {
            self.store
                .save_workflow_output(&WorkflowOutput::new(&state.workflow_name, state.outputs.clone()))
                .await?;
        }
        Ok(())
    }
}

fn finish(state: &mut ExecutionState, status: ExecutionStatus, error_message: Option<String>) {
    state.status = status;
    state.end_time = Some(Utc::now());
    state.error_message = error_message;
}

/// Record a `cancelled` step state for every planned step that never ran.
fn mark_pending_cancelled(state: &mut ExecutionState, ordered: &[&Step]) {
    let recorded: HashSet<String> = state.steps.iter().map(|record| record.name.clone()).collect();
    for step in ordered {
        if recorded.contains(&step.name) {
            continue;
        }
        let mut record = StepState::pending(&step.name);
        record.status = StepStatus::Cancelled;
        record.end_time = Some(Utc::now());
        state.steps.push(record);
    }
}

/// Collapse consecutive members of the same parallel group into one batch
/// when nothing inside the batch depends on another member.
fn batch_steps<'a>(workflow: &Workflow, ordered: &[&'a Step]) -> Vec<Vec<&'a Step>> {
    let mut batches: Vec<(Option<String>, Vec<&'a Step>)> = Vec::new();
    for &step in ordered {
        let group = workflow.parallel_group_of(&step.name).map(|group| group.name.clone());
        if group.is_some()
            && let Some((last_group, members)) = batches.last_mut()
            && *last_group == group
            && !step.depends_on.iter().any(|dependency| members.iter().any(|member| member.name == *dependency))
        {
            members.push(step);
            continue;
        }
        batches.push((group, vec![step]));
    }
    batches.into_iter().map(|(_, steps)| steps).collect()
}

/// Workflow outputs: declared `output` blocks win; otherwise merge the
/// exported aliases of successful plan steps, excluding reserved keys.
fn collect_outputs(workflow: &Workflow, ctx: &EvalContext, state: &ExecutionState) -> HashMap<String, Value> {
    if !workflow.outputs.is_empty() {
        return workflow
            .outputs
            .iter()
            .map(|(name, declaration)| (name.clone(), resolve_param(&declaration.value, ctx)))
            .collect();
    }

    let mut merged = HashMap::new();
    for step in workflow.plan_steps() {
        let Some(record) = state.step(&step.name) else { continue };
        if record.status != StepStatus::Success {
            continue;
        }
        for alias in step.outputs.keys() {
            if RESERVED_OUTPUT_KEYS.contains(&alias.as_str()) {
                continue;
            }
            if let Some(value) = record.outputs.get(alias) {
                merged.insert(alias.clone(), value.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_workflow;
    use async_trait::async_trait;
    use corynth_plugin::PluginError;
    use corynth_state::LocalStateStore;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Echoes `{"out": "v"}` and records invocation order.
    struct EchoDispatcher {
        calls: Mutex<Vec<String>>,
    }

    impl EchoDispatcher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ActionDispatcher for EchoDispatcher {
        async fn execute(
            &self,
            _plugin: &str,
            action: &str,
            _params: HashMap<String, Value>,
            _timeout: Option<Duration>,
            _cancel: &CancellationToken,
        ) -> Result<HashMap<String, Value>, PluginError> {
            self.calls.lock().expect("lock").push(action.to_string());
            let mut outputs = HashMap::new();
            outputs.insert("out".to_string(), json!("v"));
            Ok(outputs)
        }
    }

    /// Always reports `success=false, error="boom"`.
    struct FailingDispatcher {
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl ActionDispatcher for FailingDispatcher {
        async fn execute(
            &self,
            plugin: &str,
            action: &str,
            _params: HashMap<String, Value>,
            _timeout: Option<Duration>,
            _cancel: &CancellationToken,
        ) -> Result<HashMap<String, Value>, PluginError> {
            *self.attempts.lock().expect("lock") += 1;
            Err(PluginError::execution(plugin, action, "boom"))
        }
    }

    async fn store() -> (tempfile::TempDir, Arc<LocalStateStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStateStore::open(dir.path()).await.expect("open");
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn linear_chain_runs_in_dependency_order() {
        let workflow = parse_workflow(
            r#"
workflow "chain" {
  step "a" {
    plugin = "stub"
    action = "a"
  }
  step "b" {
    plugin     = "stub"
    action     = "b"
    depends_on = ["a"]
  }
  step "c" {
    plugin     = "stub"
    action     = "c"
    depends_on = ["b"]
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let dispatcher = Arc::new(EchoDispatcher::new());
        let engine = WorkflowEngine::new(dispatcher.clone(), store.clone());

        let state = engine
            .execute(&CancellationToken::new(), &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Success);
        assert_eq!(*dispatcher.calls.lock().expect("lock"), vec!["a", "b", "c"]);
        assert!(state.steps.iter().all(|step| step.status == StepStatus::Success));
        assert!(state.outputs.is_empty());

        // The record round-trips through the store.
        let loaded = store.load_execution(&state.id).await.expect("load");
        assert_eq!(loaded.steps.len(), 3);
        for (x, y) in [("a", "b"), ("b", "c")] {
            let first = loaded.step(x).expect(x);
            let second = loaded.step(y).expect(y);
            assert!(second.start_time >= first.end_time.expect("end"));
        }
    }

    #[tokio::test]
    async fn retry_exhaustion_counts_attempts_and_sleeps() {
        let workflow = parse_workflow(
            r#"
workflow "retrying" {
  step "flaky" {
    plugin = "stub"
    action = "run"
    retry {
      max_attempts = 3
      delay        = "10ms"
      backoff      = "fixed"
    }
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let dispatcher = Arc::new(FailingDispatcher {
            attempts: Mutex::new(0),
        });
        let engine = WorkflowEngine::new(dispatcher.clone(), store);

        let started = Instant::now();
        let state = engine
            .execute(&CancellationToken::new(), &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Failure);
        let record = state.step("flaky").expect("record");
        assert_eq!(record.status, StepStatus::Failure);
        assert_eq!(record.attempts, 3);
        assert_eq!(*dispatcher.attempts.lock().expect("lock"), 3);
        // Two sleeps of ~10ms between three attempts.
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(state.error_message.as_deref().unwrap_or_default().contains("boom"));
    }

    #[tokio::test]
    async fn continue_on_error_proceeds_past_failures() {
        let workflow = parse_workflow(
            r#"
workflow "tolerant" {
  step "flaky" {
    plugin = "stub"
    action = "run"
    continue_on {
      error = true
    }
  }
  step "after" {
    plugin     = "stub"
    action     = "after"
    depends_on = ["flaky"]
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;

        struct FailFirst;
        #[async_trait]
        impl ActionDispatcher for FailFirst {
            async fn execute(
                &self,
                plugin: &str,
                action: &str,
                _params: HashMap<String, Value>,
                _timeout: Option<Duration>,
                _cancel: &CancellationToken,
            ) -> Result<HashMap<String, Value>, PluginError> {
                if action == "run" {
                    return Err(PluginError::execution(plugin, action, "boom"));
                }
                Ok(HashMap::new())
            }
        }

        let engine = WorkflowEngine::new(Arc::new(FailFirst), store);
        let state = engine
            .execute(&CancellationToken::new(), &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Success);
        let flaky = state.step("flaky").expect("flaky");
        assert_eq!(flaky.status, StepStatus::Failure);
        // No retry block means exactly one attempt.
        assert_eq!(flaky.attempts, 1);
        assert_eq!(state.step("after").expect("after").status, StepStatus::Success);
    }

    #[tokio::test]
    async fn falsy_condition_skips_and_on_failure_hooks_run() {
        let workflow = parse_workflow(
            r#"
workflow "hooks" {
  variable "flag" {
    type    = string
    default = "0"
  }

  on_failure = ["cleanup"]

  step "gated" {
    plugin    = "stub"
    action    = "gated"
    condition = "${var.flag}"
  }
  step "explode" {
    plugin = "stub"
    action = "run"
  }
  step "cleanup" {
    plugin = "stub"
    action = "cleanup"
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;

        struct FailRun {
            calls: Mutex<Vec<String>>,
        }
        #[async_trait]
        impl ActionDispatcher for FailRun {
            async fn execute(
                &self,
                plugin: &str,
                action: &str,
                _params: HashMap<String, Value>,
                _timeout: Option<Duration>,
                _cancel: &CancellationToken,
            ) -> Result<HashMap<String, Value>, PluginError> {
                self.calls.lock().expect("lock").push(action.to_string());
                if action == "run" {
                    return Err(PluginError::execution(plugin, action, "boom"));
                }
                Ok(HashMap::new())
            }
        }

        let dispatcher = Arc::new(FailRun {
            calls: Mutex::new(Vec::new()),
        });
        let engine = WorkflowEngine::new(dispatcher.clone(), store);
        let state = engine
            .execute(&CancellationToken::new(), &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Failure);
        assert_eq!(state.step("gated").expect("gated").status, StepStatus::Skipped);
        assert_eq!(state.step("explode").expect("explode").status, StepStatus::Failure);
        assert_eq!(state.step("cleanup").expect("cleanup").status, StepStatus::Success);
        assert_eq!(*dispatcher.calls.lock().expect("lock"), vec!["run", "cleanup"]);
    }

    #[tokio::test]
    async fn declared_outputs_resolve_and_persist() {
        let workflow = parse_workflow(
            r#"
workflow "emitter" {
  step "produce" {
    plugin = "stub"
    action = "run"
    outputs = {
      shared_value = "out"
    }
  }

  output "shared_value" {
    value = "${produce.shared_value}"
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let engine = WorkflowEngine::new(Arc::new(EchoDispatcher::new()), store.clone());
        let state = engine
            .execute(&CancellationToken::new(), &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Success);
        assert_eq!(state.outputs["shared_value"], json!("v"));

        let latest = store.load_workflow_output("emitter").await.expect("outputs");
        assert_eq!(latest.outputs["shared_value"], json!("v"));
    }

    #[tokio::test]
    async fn step_outputs_flow_into_later_steps() {
        let workflow = parse_workflow(
            r#"
workflow "piped" {
  step "first" {
    plugin = "stub"
    action = "run"
  }
  step "second" {
    plugin     = "stub"
    action     = "use"
    depends_on = ["first"]
    params = {
      incoming = "${first.out}"
    }
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;

        struct CaptureParams {
            seen: Mutex<Option<Value>>,
        }
        #[async_trait]
        impl ActionDispatcher for CaptureParams {
            async fn execute(
                &self,
                _plugin: &str,
                action: &str,
                params: HashMap<String, Value>,
                _timeout: Option<Duration>,
                _cancel: &CancellationToken,
            ) -> Result<HashMap<String, Value>, PluginError> {
                if action == "use" {
                    *self.seen.lock().expect("lock") = params.get("incoming").cloned();
                }
                let mut outputs = HashMap::new();
                outputs.insert("out".to_string(), json!("v"));
                Ok(outputs)
            }
        }

        let dispatcher = Arc::new(CaptureParams { seen: Mutex::new(None) });
        let engine = WorkflowEngine::new(dispatcher.clone(), store);
        let state = engine
            .execute(&CancellationToken::new(), &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Success);
        assert_eq!(dispatcher.seen.lock().expect("lock").clone(), Some(json!("v")));
    }

    #[tokio::test]
    async fn cancellation_marks_pending_steps_and_skips_hooks() {
        let workflow = parse_workflow(
            r#"
workflow "cancelled" {
  on_failure = ["never"]

  step "first" {
    plugin = "stub"
    action = "run"
  }
  step "second" {
    plugin     = "stub"
    action     = "run"
    depends_on = ["first"]
  }
  step "never" {
    plugin = "stub"
    action = "hook"
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let cancel = CancellationToken::new();

        struct CancelAfterFirst {
            cancel: CancellationToken,
        }
        #[async_trait]
        impl ActionDispatcher for CancelAfterFirst {
            async fn execute(
                &self,
                _plugin: &str,
                _action: &str,
                _params: HashMap<String, Value>,
                _timeout: Option<Duration>,
                _cancel: &CancellationToken,
            ) -> Result<HashMap<String, Value>, PluginError> {
                self.cancel.cancel();
                Ok(HashMap::new())
            }
        }

        let engine = WorkflowEngine::new(
            Arc::new(CancelAfterFirst { cancel: cancel.clone() }),
            store,
        );
        let state = engine
            .execute(&cancel, &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Cancelled);
        assert_eq!(state.step("first").expect("first").status, StepStatus::Success);
        assert_eq!(state.step("second").expect("second").status, StepStatus::Cancelled);
        // The on_failure hook does not run on cancellation.
        assert!(state.step("never").is_none());
    }

    #[tokio::test]
    async fn parallel_group_members_all_run() {
        let workflow = parse_workflow(
            r#"
workflow "grouped" {
  parallel_group "fanout" {
    steps = ["left", "right"]
  }

  step "left" {
    plugin = "stub"
    action = "left"
  }
  step "right" {
    plugin = "stub"
    action = "right"
  }
  step "join" {
    plugin     = "stub"
    action     = "join"
    depends_on = ["left", "right"]
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let dispatcher = Arc::new(EchoDispatcher::new());
        let engine = WorkflowEngine::new(dispatcher.clone(), store);
        let state = engine
            .execute(&CancellationToken::new(), &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Success);
        let calls = dispatcher.calls.lock().expect("lock").clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], "join");
        assert!(calls[..2].contains(&"left".to_string()));
        assert!(calls[..2].contains(&"right".to_string()));
    }

    #[tokio::test]
    async fn init_and_plan_modes_do_not_run_steps() {
        let workflow = parse_workflow(
            r#"
workflow "modes" {
  step "only" {
    plugin = "stub"
    action = "run"
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let dispatcher = Arc::new(EchoDispatcher::new());
        let engine = WorkflowEngine::new(dispatcher.clone(), store);

        for mode in [ExecutionMode::Init, ExecutionMode::Plan] {
            let state = engine
                .execute(&CancellationToken::new(), &workflow, HashMap::new(), mode)
                .await
                .expect("execute");
            assert_eq!(state.status, ExecutionStatus::Success);
            assert!(state.steps.is_empty());
        }
        assert!(dispatcher.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn sensitive_variables_are_redacted_in_persisted_state() {
        let workflow = parse_workflow(
            r#"
workflow "secretive" {
  variable "token" {
    type      = string
    required  = true
    sensitive = true
  }

  step "use" {
    plugin = "stub"
    action = "run"
    params = {
      auth = "${var.token}"
    }
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let engine = WorkflowEngine::new(Arc::new(EchoDispatcher::new()), store.clone());
        let mut variables = HashMap::new();
        variables.insert("token".to_string(), json!("hunter2"));
        let state = engine
            .execute(&CancellationToken::new(), &workflow, variables, ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.variables["token"], json!("<sensitive>"));
        let loaded = store.load_execution(&state.id).await.expect("load");
        assert_eq!(loaded.variables["token"], json!("<sensitive>"));
    }

    #[tokio::test]
    async fn templated_outputs_embedding_secrets_are_redacted() {
        let workflow = parse_workflow(
            r#"
workflow "leaky" {
  variable "token" {
    type      = string
    required  = true
    sensitive = true
  }

  step "produce" {
    plugin = "stub"
    action = "run"
  }

  output "connection" {
    value = "token=${var.token};host=db"
  }

  output "plain" {
    value = "host=db"
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let engine = WorkflowEngine::new(Arc::new(EchoDispatcher::new()), store.clone());
        let mut variables = HashMap::new();
        variables.insert("token".to_string(), json!("hunter2"));
        let state = engine
            .execute(&CancellationToken::new(), &workflow, variables, ExecutionMode::Apply)
            .await
            .expect("execute");

        assert_eq!(state.status, ExecutionStatus::Success);
        // The secret is embedded in a larger string, not equal to it; the
        // persisted record and the latest-outputs record both mask it.
        assert_eq!(state.outputs["connection"], json!("<sensitive>"));
        assert_eq!(state.outputs["plain"], json!("host=db"));

        let loaded = store.load_execution(&state.id).await.expect("load");
        assert_eq!(loaded.outputs["connection"], json!("<sensitive>"));

        let latest = store.load_workflow_output("leaky").await.expect("outputs");
        assert_eq!(latest.outputs["connection"], json!("<sensitive>"));
        assert_eq!(latest.outputs["plain"], json!("host=db"));
    }

    #[tokio::test]
    async fn missing_required_variable_creates_no_state() {
        let workflow = parse_workflow(
            r#"
workflow "strict" {
  variable "needed" {
    type     = string
    required = true
  }

  step "only" {
    plugin = "stub"
    action = "run"
  }
}
"#,
        )
        .expect("parse");

        let (_dir, store) = store().await;
        let engine = WorkflowEngine::new(Arc::new(EchoDispatcher::new()), store.clone());
        let error = engine
            .execute(&CancellationToken::new(), &workflow, HashMap::new(), ExecutionMode::Apply)
            .await
            .expect_err("should fail");
        assert!(matches!(error, EngineError::Validation { .. }));
        assert!(store.list_executions().await.expect("list").is_empty());
    }
}
