//! Plan builder.
//!
//! Produces the ordered step list an `apply` would run, with duration
//! estimates taken from execution history when available and non-fatal
//! warnings for things worth knowing before running.

use crate::dag;
use crate::dispatch::ActionDispatcher;
use crate::error::EngineError;
use crate::model::Workflow;
use crate::resolver::EvalContext;
use chrono::Utc;
use corynth_state::StateBackend;
use corynth_types::{Plan, PlanWarning, PlannedStep, StepStatus};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Estimate used when history has nothing to say about a step.
const DEFAULT_STEP_ESTIMATE: Duration = Duration::from_secs(30);

/// Build a pre-execution plan for a workflow.
pub async fn build_plan(
    workflow: &Workflow,
    ctx: &EvalContext,
    dispatcher: &dyn ActionDispatcher,
    store: &dyn StateBackend,
) -> Result<Plan, EngineError> {
    let ordered = dag::order_steps(&workflow.plan_steps())?;
    let history = historical_estimates(workflow, store).await;

    let mut warnings = Vec::new();
    let mut planned_steps = Vec::with_capacity(ordered.len());
    for step in &ordered {
        if !dispatcher.has_plugin(&step.plugin).await {
            warnings.push(PlanWarning::for_step(
                &step.name,
                format!("plugin '{}' is not installed; it will be fetched on first use", step.plugin),
            ));
        }
        planned_steps.push(PlannedStep {
            name: step.name.clone(),
            plugin: step.plugin.clone(),
            action: step.action.clone(),
            dependencies: step.depends_on.clone(),
            estimated_duration: history.get(&step.name).copied().unwrap_or(DEFAULT_STEP_ESTIMATE),
        });
    }

    for group in &workflow.parallel_groups {
        for member in &group.steps {
            let Some(step) = workflow.step(member) else { continue };
            if step.depends_on.iter().any(|dependency| group.steps.contains(dependency)) {
                warnings.push(PlanWarning::for_step(
                    member,
                    format!(
                        "step depends on another member of parallel group '{}'; the group cannot fully parallelize",
                        group.name
                    ),
                ));
            }
        }
    }

    Ok(Plan {
        id: Uuid::new_v4().to_string(),
        workflow_name: workflow.name.clone(),
        created_at: Utc::now(),
        variables: ctx.variables.clone().into_iter().collect(),
        planned_steps,
        warnings,
    })
}

/// Average observed duration per step name from prior executions.
async fn historical_estimates(workflow: &Workflow, store: &dyn StateBackend) -> HashMap<String, Duration> {
    let Ok(states) = store.find_states_by_workflow(&workflow.name).await else {
        return HashMap::new();
    };

    let mut sums: HashMap<String, (Duration, u32)> = HashMap::new();
    for state in states {
        for step in state.steps {
            if step.status != StepStatus::Success {
                continue;
            }
            let Some(end) = step.end_time else { continue };
            let Ok(elapsed) = (end - step.start_time).to_std() else { continue };
            let entry = sums.entry(step.name).or_insert((Duration::ZERO, 0));
            entry.0 += elapsed;
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .map(|(name, (total, count))| (name, total / count.max(1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_workflow;
    use async_trait::async_trait;
    use corynth_plugin::PluginError;
    use corynth_state::LocalStateStore;
    use serde_json::Value;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    struct KnownPlugins(Vec<&'static str>);

    #[async_trait]
    impl ActionDispatcher for KnownPlugins {
        async fn has_plugin(&self, plugin: &str) -> bool {
            self.0.contains(&plugin)
        }

        async fn execute(
            &self,
            _plugin: &str,
            _action: &str,
            _params: HashMap<String, Value>,
            _timeout: Option<std::time::Duration>,
            _cancel: &CancellationToken,
        ) -> Result<HashMap<String, Value>, PluginError> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn plan_orders_steps_and_defaults_estimates() {
        let workflow = parse_workflow(
            r#"
workflow "planned" {
  step "second" {
    plugin     = "shell"
    action     = "exec"
    depends_on = ["first"]
  }
  step "first" {
    plugin = "shell"
    action = "exec"
  }
}
"#,
        )
        .expect("parse");

        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStateStore::open(dir.path()).await.expect("open");
        let dispatcher = KnownPlugins(vec!["shell"]);
        let ctx = EvalContext::for_workflow(&workflow);

        let plan = build_plan(&workflow, &ctx, &dispatcher, &store).await.expect("plan");
        let names: Vec<&str> = plan.planned_steps.iter().map(|step| step.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(plan.planned_steps[0].estimated_duration, DEFAULT_STEP_ESTIMATE);
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.estimated_duration(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn plan_warns_about_unknown_plugins() {
        let workflow = parse_workflow(
            r#"
workflow "planned" {
  step "only" {
    plugin = "exotic"
    action = "run"
  }
}
"#,
        )
        .expect("parse");

        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStateStore::open(dir.path()).await.expect("open");
        let dispatcher = KnownPlugins(vec!["shell"]);
        let ctx = EvalContext::for_workflow(&workflow);

        let plan = build_plan(&workflow, &ctx, &dispatcher, &store).await.expect("plan");
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].message.contains("plugin 'exotic'"));
    }
}
