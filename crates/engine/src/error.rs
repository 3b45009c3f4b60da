//! Engine error kinds.

use corynth_plugin::PluginError;
use corynth_state::StateStoreError;
use thiserror::Error;

/// Everything the engine and orchestrator can fail with.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Workflow file syntax is invalid.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The workflow parsed but is semantically broken: missing required
    /// variable, unknown step reference, invalid duration, and so on.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Step dependency cycle.
    #[error("cycle detected in workflow steps involving: {steps}")]
    Cycle { steps: String },

    /// Inter-workflow dependency cycle.
    #[error("workflow dependency cycle: {chain}")]
    WorkflowCycle { chain: String },

    /// A required dependency workflow failed or could not be loaded.
    #[error("required dependency '{workflow}' failed: {reason}")]
    Dependency { workflow: String, reason: String },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    State(#[from] StateStoreError),
}

impl EngineError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn cycle(steps: impl Into<String>) -> Self {
        Self::Cycle { steps: steps.into() }
    }

    pub fn workflow_cycle(chain: impl Into<String>) -> Self {
        Self::WorkflowCycle { chain: chain.into() }
    }

    pub fn dependency(workflow: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dependency {
            workflow: workflow.into(),
            reason: reason.into(),
        }
    }
}
