//! Single-step execution with retry semantics.

use crate::dispatch::ActionDispatcher;
use crate::model::{Backoff, Step};
use crate::resolver::{eval_condition, resolve_param, EvalContext};
use chrono::Utc;
use corynth_plugin::PluginError;
use corynth_types::{StepState, StepStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of driving one step (or one loop) to completion.
pub(crate) struct StepRun {
    /// Iteration records first, the step's own record last.
    pub records: Vec<StepState>,
    /// Outputs exposed to subsequent steps on success.
    pub outputs: HashMap<String, Value>,
    /// Stop the execution after recording this step.
    pub halt: bool,
    pub cancelled: bool,
}

impl StepRun {
    pub fn succeeded(&self) -> bool {
        self.records
            .last()
            .map(|record| record.status == StepStatus::Success)
            .unwrap_or(false)
    }
}

/// Result of one plugin-backed step attempt chain.
pub(crate) struct StepOutcome {
    pub record: StepState,
    pub outputs: HashMap<String, Value>,
    pub halt: bool,
    pub cancelled: bool,
}

impl From<StepOutcome> for StepRun {
    fn from(outcome: StepOutcome) -> Self {
        Self {
            records: vec![outcome.record],
            outputs: outcome.outputs,
            halt: outcome.halt,
            cancelled: outcome.cancelled,
        }
    }
}

/// Execute a step: condition gate, then loop or single invocation.
pub(crate) async fn run_step(
    step: &Step,
    ctx: &EvalContext,
    dispatcher: Arc<dyn ActionDispatcher>,
    cancel: &CancellationToken,
) -> StepRun {
    if let Some(condition) = &step.condition
        && !eval_condition(condition, ctx)
    {
        info!(step = %step.name, "step skipped by condition");
        let mut record = StepState::pending(&step.name);
        record.status = StepStatus::Skipped;
        record.end_time = Some(Utc::now());
        return StepRun {
            records: vec![record],
            outputs: HashMap::new(),
            halt: false,
            cancelled: false,
        };
    }

    // Sub-workflow composition is expressed through the orchestrator's
    // dependency mechanism; a bare `subworkflow` step has nothing to invoke.
    if let Some(subworkflow) = &step.subworkflow {
        info!(step = %step.name, %subworkflow, "subworkflow step skipped; declare it via depends_on_workflow");
        let mut record = StepState::pending(&step.name);
        record.status = StepStatus::Skipped;
        record.end_time = Some(Utc::now());
        return StepRun {
            records: vec![record],
            outputs: HashMap::new(),
            halt: false,
            cancelled: false,
        };
    }

    if step.loop_spec.is_some() {
        return crate::loop_exec::run_loop(step, ctx, dispatcher, cancel).await;
    }

    run_plugin_step(step.clone(), ctx.clone(), dispatcher, cancel.clone())
        .await
        .into()
}

/// Resolve params and invoke the plugin, applying the retry policy.
///
/// Takes owned arguments so parallel loop iterations and parallel groups can
/// move it into tasks.
pub(crate) async fn run_plugin_step(
    step: Step,
    ctx: EvalContext,
    dispatcher: Arc<dyn ActionDispatcher>,
    cancel: CancellationToken,
) -> StepOutcome {
    let mut record = StepState::pending(&step.name);
    record.status = StepStatus::Running;

    let mut params = HashMap::new();
    for (key, raw) in &step.params {
        params.insert(key.clone(), resolve_param(raw, &ctx));
    }

    let retry = step.retry.clone().unwrap_or_default();
    let mut delay = retry.delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return cancelled_outcome(record, attempt.saturating_sub(1));
        }

        match dispatcher
            .execute(&step.plugin, &step.action, params.clone(), step.timeout, &cancel)
            .await
        {
            Ok(mut outputs) => {
                for (alias, key) in &step.outputs {
                    if let Some(value) = outputs.get(key).cloned() {
                        outputs.insert(alias.clone(), value);
                    }
                }
                info!(step = %step.name, attempts = attempt, "step succeeded");
                record.status = StepStatus::Success;
                record.attempts = attempt;
                record.end_time = Some(Utc::now());
                record.outputs = outputs.clone();
                return StepOutcome {
                    record,
                    outputs,
                    halt: false,
                    cancelled: false,
                };
            }
            Err(PluginError::Cancelled { .. }) => {
                return cancelled_outcome(record, attempt);
            }
            Err(error) if attempt < retry.max_attempts && error.is_retryable() => {
                warn!(step = %step.name, attempt, %error, "attempt failed; retrying");
                tokio::time::sleep(delay).await;
                delay = next_delay(retry.backoff, delay, retry.delay);
            }
            Err(error) => {
                warn!(step = %step.name, attempts = attempt, %error, "step failed");
                record.status = StepStatus::Failure;
                record.attempts = attempt;
                record.end_time = Some(Utc::now());
                record.error_message = Some(error.to_string());
                return StepOutcome {
                    record,
                    outputs: HashMap::new(),
                    halt: !step.continue_on.proceeds(),
                    cancelled: false,
                };
            }
        }
    }
}

fn cancelled_outcome(mut record: StepState, attempts: u32) -> StepOutcome {
    record.status = StepStatus::Cancelled;
    record.attempts = attempts;
    record.end_time = Some(Utc::now());
    StepOutcome {
        record,
        outputs: HashMap::new(),
        halt: true,
        cancelled: true,
    }
}

/// Delay for the next attempt under the configured strategy.
fn next_delay(backoff: Backoff, current: Duration, base: Duration) -> Duration {
    match backoff {
        Backoff::Exponential => current * 2,
        Backoff::Linear => current + base,
        Backoff::Fixed => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_progressions() {
        let base = Duration::from_millis(10);
        assert_eq!(next_delay(Backoff::Fixed, base, base), base);
        assert_eq!(next_delay(Backoff::Linear, Duration::from_millis(20), base), Duration::from_millis(30));
        assert_eq!(
            next_delay(Backoff::Exponential, Duration::from_millis(20), base),
            Duration::from_millis(40)
        );
    }
}
