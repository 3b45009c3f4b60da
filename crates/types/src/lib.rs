//! Shared data model for the Corynth workflow engine.
//!
//! Everything that crosses a crate boundary or is persisted to disk lives
//! here: execution records, latest-output records, plans, configuration, and
//! the duration grammar used by workflow files.

pub mod config;
pub mod duration;
pub mod execution;
pub mod plan;

pub use config::{Config, RepositoryConfig};
pub use duration::parse_duration;
pub use execution::{
    ExecutionMode, ExecutionState, ExecutionStatus, ExecutionSummary, StepState, StepStatus, WorkflowOutput,
};
pub use plan::{Plan, PlanWarning, PlannedStep};
