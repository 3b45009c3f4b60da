//! Loop step execution.
//!
//! The loop's sequence is evaluated once, each element runs the single-step
//! path under a synthetic name `<step>[<index>]`, and a summary record lands
//! under the original step name with outputs `{results, count}`. Parallel
//! loops bound concurrency with a semaphore; iteration failures follow the
//! parent step's `continue_on` policy.

use crate::dispatch::ActionDispatcher;
use crate::model::Step;
use crate::resolver::{evaluate_sequence, EvalContext};
use crate::step_exec::{run_plugin_step, StepOutcome, StepRun};
use chrono::Utc;
use corynth_types::{StepState, StepStatus};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(crate) async fn run_loop(
    step: &Step,
    ctx: &EvalContext,
    dispatcher: Arc<dyn ActionDispatcher>,
    cancel: &CancellationToken,
) -> StepRun {
    let spec = step.loop_spec.as_ref().expect("caller checked loop_spec");

    let elements = match evaluate_sequence(&spec.over, ctx) {
        Ok(elements) => elements,
        Err(error) => {
            warn!(step = %step.name, %error, "loop sequence evaluation failed");
            let mut record = StepState::pending(&step.name);
            record.status = StepStatus::Failure;
            record.end_time = Some(Utc::now());
            record.error_message = Some(error.to_string());
            return StepRun {
                records: vec![record],
                outputs: HashMap::new(),
                halt: !step.continue_on.proceeds(),
                cancelled: false,
            };
        }
    };

    let count = elements.len();
    info!(step = %step.name, count, parallel = spec.parallel, "loop started");

    // The per-iteration body is the step without its loop and condition.
    let body = Step {
        loop_spec: None,
        condition: None,
        ..step.clone()
    };

    let mut outcomes: Vec<Option<StepOutcome>> = Vec::with_capacity(count);
    outcomes.resize_with(count, || None);
    let mut cancelled = false;

    if spec.parallel {
        let semaphore = Arc::new(Semaphore::new(spec.max_workers));
        let mut join = JoinSet::new();
        for (index, element) in elements.iter().enumerate() {
            let mut iteration = body.clone();
            iteration.name = format!("{}[{}]", step.name, index);
            let child_ctx = ctx.with_loop(&spec.variable, element.clone(), index, count);
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();
            join.spawn(async move {
                let _permit = semaphore.acquire().await;
                (index, run_plugin_step(iteration, child_ctx, dispatcher, cancel).await)
            });
        }
        while let Some(joined) = join.join_next().await {
            if let Ok((index, outcome)) = joined {
                outcomes[index] = Some(outcome);
            }
        }
    } else {
        for (index, element) in elements.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let mut iteration = body.clone();
            iteration.name = format!("{}[{}]", step.name, index);
            let child_ctx = ctx.with_loop(&spec.variable, element.clone(), index, count);
            let outcome = run_plugin_step(iteration, child_ctx, dispatcher.clone(), cancel.clone()).await;
            let stop = outcome.cancelled || (outcome.record.status == StepStatus::Failure && !step.continue_on.proceeds());
            cancelled |= outcome.cancelled;
            outcomes[index] = Some(outcome);
            if stop {
                break;
            }
        }
    }

    // Fold iteration outcomes in index order.
    let mut records = Vec::with_capacity(count + 1);
    let mut results = Vec::with_capacity(count);
    let mut first_error = None;
    for outcome in outcomes.into_iter().flatten() {
        cancelled |= outcome.cancelled;
        if outcome.record.status == StepStatus::Failure && first_error.is_none() {
            first_error = outcome.record.error_message.clone();
        }
        results.push(Value::Object(Map::from_iter(outcome.record.outputs.clone())));
        records.push(outcome.record);
    }

    let failed = first_error.is_some();
    let halted = failed && !step.continue_on.proceeds();

    let mut summary = StepState::pending(&step.name);
    summary.attempts = records.len() as u32;
    summary.end_time = Some(Utc::now());
    summary.status = if cancelled {
        StepStatus::Cancelled
    } else if halted {
        StepStatus::Failure
    } else {
        StepStatus::Success
    };
    if halted {
        summary.error_message = first_error;
    }

    let mut outputs = HashMap::new();
    outputs.insert("results".to_string(), Value::Array(results));
    outputs.insert("count".to_string(), Value::from(count));
    summary.outputs = outputs.clone();

    records.push(summary);
    StepRun {
        records,
        outputs,
        halt: halted || cancelled,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContinueOn, LoopSpec};
    use async_trait::async_trait;
    use corynth_plugin::PluginError;
    use serde_json::json;
    use std::time::Duration;

    /// Fails whenever the resolved `item` parameter equals "b".
    struct FailOnB;

    #[async_trait]
    impl ActionDispatcher for FailOnB {
        async fn execute(
            &self,
            _plugin: &str,
            _action: &str,
            params: HashMap<String, Value>,
            _timeout: Option<Duration>,
            _cancel: &CancellationToken,
        ) -> Result<HashMap<String, Value>, PluginError> {
            if params.get("item") == Some(&json!("b")) {
                return Err(PluginError::execution("stub", "run", "boom"));
            }
            let mut outputs = HashMap::new();
            outputs.insert("item".to_string(), params.get("item").cloned().unwrap_or(Value::Null));
            Ok(outputs)
        }
    }

    fn loop_step(parallel: bool, continue_on_error: bool) -> Step {
        Step {
            name: "fan".into(),
            plugin: "stub".into(),
            action: "run".into(),
            params: indexmap::indexmap! { "item".to_string() => "${i}".to_string() },
            loop_spec: Some(LoopSpec {
                over: "[\"a\", \"b\", \"c\"]".into(),
                variable: "i".into(),
                parallel,
                max_workers: 3,
            }),
            continue_on: ContinueOn {
                error: continue_on_error,
                failure: false,
            },
            ..Step::default()
        }
    }

    #[tokio::test]
    async fn parallel_loop_with_partial_failure_continues() {
        let step = loop_step(true, true);
        let ctx = EvalContext::default();
        let run = run_loop(&step, &ctx, Arc::new(FailOnB), &CancellationToken::new()).await;

        assert!(!run.halt);
        assert_eq!(run.records.len(), 4);
        assert_eq!(run.records[0].name, "fan[0]");
        assert_eq!(run.records[0].status, StepStatus::Success);
        assert_eq!(run.records[1].name, "fan[1]");
        assert_eq!(run.records[1].status, StepStatus::Failure);
        assert_eq!(run.records[2].name, "fan[2]");
        assert_eq!(run.records[2].status, StepStatus::Success);

        let summary = &run.records[3];
        assert_eq!(summary.name, "fan");
        assert_eq!(summary.status, StepStatus::Success);
        assert_eq!(summary.outputs["count"], json!(3));
        let results = summary.outputs["results"].as_array().expect("results");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["item"], json!("a"));
    }

    #[tokio::test]
    async fn sequential_loop_aborts_on_failure_without_continue_on() {
        let step = loop_step(false, false);
        let ctx = EvalContext::default();
        let run = run_loop(&step, &ctx, Arc::new(FailOnB), &CancellationToken::new()).await;

        assert!(run.halt);
        // a succeeded, b failed, c never ran; summary is failed.
        assert_eq!(run.records.len(), 3);
        assert_eq!(run.records[0].status, StepStatus::Success);
        assert_eq!(run.records[1].status, StepStatus::Failure);
        let summary = &run.records[2];
        assert_eq!(summary.status, StepStatus::Failure);
        assert_eq!(summary.outputs["count"], json!(3));
        assert!(summary.error_message.as_deref().unwrap_or_default().contains("boom"));
    }

    #[tokio::test]
    async fn empty_sequence_produces_a_successful_summary() {
        let mut step = loop_step(false, false);
        step.loop_spec.as_mut().expect("loop").over = "[]".into();
        let ctx = EvalContext::default();
        let run = run_loop(&step, &ctx, Arc::new(FailOnB), &CancellationToken::new()).await;

        assert_eq!(run.records.len(), 1);
        let summary = &run.records[0];
        assert_eq!(summary.status, StepStatus::Success);
        assert_eq!(summary.outputs["count"], json!(0));
        assert_eq!(summary.outputs["results"], json!([]));
        assert!(run.succeeded());
    }

    #[tokio::test]
    async fn unresolvable_sequence_fails_the_step() {
        let mut step = loop_step(false, false);
        step.loop_spec.as_mut().expect("loop").over = "var.not_a_list".into();
        let ctx = EvalContext::default();
        let run = run_loop(&step, &ctx, Arc::new(FailOnB), &CancellationToken::new()).await;

        assert!(run.halt);
        assert_eq!(run.records.len(), 1);
        assert_eq!(run.records[0].status, StepStatus::Failure);
    }
}
