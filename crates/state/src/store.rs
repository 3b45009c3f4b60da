//! Backend abstraction.

use crate::StateStoreError;
use async_trait::async_trait;
use corynth_types::{ExecutionState, ExecutionSummary, WorkflowOutput};
use std::time::Duration;

/// Persistence backend for execution records and latest-output records.
///
/// Implementations own their concurrency. Saves must be atomic with respect
/// to readers; concurrent saves to the same latest-output key serialize with
/// last-writer-wins.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Create or overwrite an execution record.
    async fn save_execution(&self, state: &ExecutionState) -> Result<(), StateStoreError>;

    /// Load an execution record by id.
    async fn load_execution(&self, id: &str) -> Result<ExecutionState, StateStoreError>;

    /// Summaries of every stored execution, newest first.
    async fn list_executions(&self) -> Result<Vec<ExecutionSummary>, StateStoreError>;

    /// Remove an execution record; missing ids are an error.
    async fn delete_execution(&self, id: &str) -> Result<(), StateStoreError>;

    /// Create or overwrite the latest-outputs record for a workflow.
    async fn save_workflow_output(&self, output: &WorkflowOutput) -> Result<(), StateStoreError>;

    /// Load the latest-outputs record for a workflow.
    async fn load_workflow_output(&self, workflow_name: &str) -> Result<WorkflowOutput, StateStoreError>;

    /// All execution records for a workflow, newest first.
    async fn find_states_by_workflow(&self, workflow_name: &str) -> Result<Vec<ExecutionState>, StateStoreError>;

    /// Remove finished execution records older than `max_age`; returns the
    /// number removed. Latest-output records are preserved regardless of age.
    async fn cleanup(&self, max_age: Duration) -> Result<usize, StateStoreError>;
}
