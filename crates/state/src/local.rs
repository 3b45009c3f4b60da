//! Local JSON-file backend.
//!
//! Directory layout:
//!
//! ```text
//! <root>/executions/<id>.json
//! <root>/outputs/<workflow_name>.json
//! ```
//!
//! Writes go to a temp file in the target directory and are renamed into
//! place, so readers never observe a partial record.

use crate::{StateBackend, StateStoreError};
use async_trait::async_trait;
use chrono::Utc;
use corynth_types::{ExecutionState, ExecutionSummary, WorkflowOutput};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const EXECUTIONS_DIR: &str = "executions";
const OUTPUTS_DIR: &str = "outputs";

/// JSON-file state store rooted at a directory.
pub struct LocalStateStore {
    root: PathBuf,
    /// Serializes same-key writes so last-writer-wins is well defined.
    write_guard: Mutex<()>,
}

impl LocalStateStore {
    /// Open (and create if needed) a store at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StateStoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(EXECUTIONS_DIR)).await?;
        fs::create_dir_all(root.join(OUTPUTS_DIR)).await?;
        Ok(Self {
            root,
            write_guard: Mutex::new(()),
        })
    }

    fn execution_path(&self, id: &str) -> PathBuf {
        self.root.join(EXECUTIONS_DIR).join(format!("{}.json", sanitize_key(id)))
    }

    fn output_path(&self, workflow_name: &str) -> PathBuf {
        self.root.join(OUTPUTS_DIR).join(format!("{}.json", sanitize_key(workflow_name)))
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StateStoreError> {
        let _guard = self.write_guard.lock().await;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_executions(&self) -> Result<Vec<ExecutionState>, StateStoreError> {
        let mut states = Vec::new();
        let mut entries = fs::read_dir(self.root.join(EXECUTIONS_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|extension| extension.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<ExecutionState>(&bytes) {
                Ok(state) => states.push(state),
                Err(error) => warn!(path = %path.display(), %error, "skipping unreadable execution record"),
            }
        }
        states.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(states)
    }
}

#[async_trait]
impl StateBackend for LocalStateStore {
    async fn save_execution(&self, state: &ExecutionState) -> Result<(), StateStoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        self.write_atomic(&self.execution_path(&state.id), &bytes).await?;
        debug!(execution = %state.id, workflow = %state.workflow_name, "saved execution record");
        Ok(())
    }

    async fn load_execution(&self, id: &str) -> Result<ExecutionState, StateStoreError> {
        let path = self.execution_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateStoreError::execution_not_found(id));
            }
            Err(error) => return Err(error.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionSummary>, StateStoreError> {
        Ok(self.read_executions().await?.iter().map(ExecutionSummary::from).collect())
    }

    async fn delete_execution(&self, id: &str) -> Result<(), StateStoreError> {
        let path = self.execution_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(StateStoreError::execution_not_found(id))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn save_workflow_output(&self, output: &WorkflowOutput) -> Result<(), StateStoreError> {
        let bytes = serde_json::to_vec_pretty(output)?;
        self.write_atomic(&self.output_path(&output.workflow_name), &bytes).await?;
        debug!(workflow = %output.workflow_name, "saved latest outputs");
        Ok(())
    }

    async fn load_workflow_output(&self, workflow_name: &str) -> Result<WorkflowOutput, StateStoreError> {
        let path = self.output_path(workflow_name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateStoreError::output_not_found(workflow_name));
            }
            Err(error) => return Err(error.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn find_states_by_workflow(&self, workflow_name: &str) -> Result<Vec<ExecutionState>, StateStoreError> {
        Ok(self
            .read_executions()
            .await?
            .into_iter()
            .filter(|state| state.workflow_name == workflow_name)
            .collect())
    }

    async fn cleanup(&self, max_age: Duration) -> Result<usize, StateStoreError> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::MAX);
        let cutoff = Utc::now() - max_age;
        let mut removed = 0usize;
        for state in self.read_executions().await? {
            let Some(end_time) = state.end_time else { continue };
            if end_time < cutoff {
                match fs::remove_file(self.execution_path(&state.id)).await {
                    Ok(()) => removed += 1,
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }
        debug!(removed, "state cleanup finished");
        Ok(removed)
    }
}

/// Keep record keys filesystem-safe.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | '.') {
                character
            } else {
                '_'
            }
        })
        .collect()
}
