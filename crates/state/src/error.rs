//! State store errors.

use thiserror::Error;

/// Persistence failures surfaced by any backend.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// I/O failure while reading or writing a record.
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No execution record with the given id.
    #[error("execution not found: {id}")]
    ExecutionNotFound { id: String },

    /// No latest-outputs record for the given workflow.
    #[error("no outputs recorded for workflow '{workflow_name}'")]
    OutputNotFound { workflow_name: String },
}

impl StateStoreError {
    pub fn execution_not_found(id: impl Into<String>) -> Self {
        Self::ExecutionNotFound { id: id.into() }
    }

    pub fn output_not_found(workflow_name: impl Into<String>) -> Self {
        Self::OutputNotFound {
            workflow_name: workflow_name.into(),
        }
    }
}
