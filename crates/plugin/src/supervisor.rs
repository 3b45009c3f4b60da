//! Plugin process supervision.
//!
//! One supervised process per plugin identity. The handle owns the process
//! for the engine's lifetime and exposes the typed RPC facade; a crash
//! between calls surfaces on the next call as a transport error without
//! affecting other plugins.

use crate::PluginError;
use corynth_protocol::pb::{
    ActionSpec, ActionsRequest, ExecuteRequest, HealthRequest, Metadata, MetadataRequest, ValidateRequest,
};
use corynth_protocol::{decode_outputs, encode_params, Handshake, PluginClient};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

/// Budget for handshake, dial, and the first health check combined.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// A supervised plugin process with a connected RPC client.
pub struct PluginHandle {
    name: String,
    executable: PathBuf,
    endpoint: String,
    metadata: Metadata,
    actions: Vec<ActionSpec>,
    client: PluginClient<Channel>,
    child: Mutex<Option<Child>>,
}

impl PluginHandle {
    /// Spawn `executable serve`, read the handshake line, dial the endpoint,
    /// and gate on the first health check.
    pub async fn start(name: &str, executable: &Path) -> Result<Self, PluginError> {
        let deadline = Instant::now() + STARTUP_TIMEOUT;

        let mut child = Command::new(executable)
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| PluginError::process(name, format!("failed to spawn {}: {error}", executable.display())))?;

        forward_stderr(name, &mut child);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginError::process(name, "plugin stdout was not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let line = match timeout_at(deadline, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                return Err(abort_start(name, child, "plugin exited before printing a handshake line").await);
            }
            Ok(Err(error)) => {
                return Err(abort_start(name, child, format!("failed to read handshake line: {error}")).await);
            }
            Err(_) => {
                return Err(abort_start(name, child, "no handshake line within 10s").await);
            }
        };

        let handshake = match Handshake::parse(&line) {
            Ok(handshake) => handshake,
            Err(error) => return Err(abort_start(name, child, error.to_string()).await),
        };
        debug!(plugin = name, endpoint = %handshake.endpoint, "plugin handshake accepted");

        let endpoint = match Endpoint::from_shared(handshake.dial_uri()) {
            Ok(endpoint) => endpoint,
            Err(error) => return Err(abort_start(name, child, format!("invalid endpoint: {error}")).await),
        };
        let channel = match timeout_at(deadline, endpoint.connect()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(error)) => {
                let _ = child.kill().await;
                return Err(PluginError::transport(name, format!("failed to dial {}: {error}", handshake.endpoint)));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(PluginError::transport(name, "dial timed out"));
            }
        };

        let mut client = PluginClient::new(channel);

        let healthy = match timeout_at(deadline, client.health(HealthRequest {})).await {
            Ok(Ok(response)) => response.into_inner().healthy,
            Ok(Err(status)) => {
                let _ = child.kill().await;
                return Err(PluginError::transport(name, format!("health check failed: {status}")));
            }
            Err(_) => false,
        };
        if !healthy {
            let _ = child.kill().await;
            return Err(PluginError::unhealthy(name));
        }

        let metadata = client
            .get_metadata(MetadataRequest {})
            .await
            .map_err(|status| PluginError::transport(name, format!("GetMetadata failed: {status}")))?
            .into_inner();
        let actions = client
            .get_actions(ActionsRequest {})
            .await
            .map_err(|status| PluginError::transport(name, format!("GetActions failed: {status}")))?
            .into_inner()
            .actions;

        info!(
            plugin = name,
            version = %metadata.version,
            actions = actions.len(),
            "plugin started"
        );

        Ok(Self {
            name: name.to_string(),
            executable: executable.to_path_buf(),
            endpoint: handshake.endpoint,
            metadata,
            actions,
            client,
            child: Mutex::new(Some(child)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Metadata cached at startup.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Actions cached at startup.
    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    /// Ask the plugin to validate a parameter map; an empty list means valid.
    pub async fn validate(&self, params: &HashMap<String, Value>) -> Result<Vec<String>, PluginError> {
        let request = ValidateRequest {
            params: encode_params(params),
        };
        let response = self
            .client
            .clone()
            .validate_params(request)
            .await
            .map_err(|status| PluginError::transport(&self.name, format!("ValidateParams failed: {status}")))?
            .into_inner();
        if response.valid { Ok(Vec::new()) } else { Ok(response.errors) }
    }

    /// Invoke an action. The deadline bounds this single attempt; the
    /// cancellation token aborts the in-flight RPC.
    pub async fn execute(
        &self,
        action: &str,
        params: &HashMap<String, Value>,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Value>, PluginError> {
        let request = ExecuteRequest {
            action: action.to_string(),
            params: encode_params(params),
        };
        let mut client = self.client.clone();
        let call = client.execute(request);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(PluginError::cancelled(&self.name, action)),
            outcome = async {
                match deadline {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .map_err(|_| PluginError::timeout(&self.name, action, limit.as_millis() as u64))?,
                    None => call.await,
                }
                .map_err(|status| PluginError::transport(&self.name, format!("Execute failed: {status}")))
            } => outcome?,
        };

        let response = response.into_inner();
        if !response.success {
            let reason = if response.error.is_empty() {
                "plugin reported failure".to_string()
            } else {
                response.error
            };
            return Err(PluginError::execution(&self.name, action, reason));
        }
        Ok(decode_outputs(&response.outputs))
    }

    /// Current liveness as reported by the plugin.
    pub async fn health(&self) -> bool {
        match self.client.clone().health(HealthRequest {}).await {
            Ok(response) => response.into_inner().healthy,
            Err(status) => {
                warn!(plugin = %self.name, %status, "health check failed");
                false
            }
        }
    }

    /// Close the RPC channel and terminate the process. Idempotent.
    pub async fn close(&self) {
        let mut slot = self.child.lock().await;
        if let Some(mut child) = slot.take() {
            if let Err(error) = child.kill().await {
                warn!(plugin = %self.name, %error, "failed to kill plugin process");
            }
            let _ = child.wait().await;
            info!(plugin = %self.name, "plugin stopped");
        }
    }
}

async fn abort_start(name: &str, mut child: Child, reason: impl Into<String>) -> PluginError {
    let _ = child.kill().await;
    PluginError::handshake(name, reason)
}

/// Stream plugin stderr into the engine log at debug level.
fn forward_stderr(name: &str, child: &mut Child) {
    let Some(stderr) = child.stderr.take() else { return };
    let plugin = name.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(plugin = %plugin, "{line}");
        }
    });
}
