//! Plugin invocation seam.
//!
//! The engine calls plugins through [`ActionDispatcher`] so execution
//! semantics can be tested against in-process stubs. The production
//! implementation routes registry → supervisor → RPC.

use async_trait::async_trait;
use corynth_plugin::{PluginError, PluginRegistry};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How the engine reaches plugin actions.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Whether the plugin is known; used for plan warnings only.
    async fn has_plugin(&self, plugin: &str) -> bool {
        let _ = plugin;
        true
    }

    /// Pre-flight parameter validation; an empty list means valid.
    async fn validate(&self, plugin: &str, params: &HashMap<String, Value>) -> Result<Vec<String>, PluginError> {
        let _ = (plugin, params);
        Ok(Vec::new())
    }

    /// Invoke one action. The timeout bounds a single attempt; cancellation
    /// must propagate into the call.
    async fn execute(
        &self,
        plugin: &str,
        action: &str,
        params: HashMap<String, Value>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Value>, PluginError>;
}

/// Production dispatcher backed by the plugin registry.
pub struct PluginDispatcher {
    registry: Arc<PluginRegistry>,
}

impl PluginDispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ActionDispatcher for PluginDispatcher {
    async fn has_plugin(&self, plugin: &str) -> bool {
        self.registry.list().await.iter().any(|row| row.name == plugin)
    }

    async fn validate(&self, plugin: &str, params: &HashMap<String, Value>) -> Result<Vec<String>, PluginError> {
        let handle = self.registry.ensure(plugin).await?;
        handle.validate(params).await
    }

    async fn execute(
        &self,
        plugin: &str,
        action: &str,
        params: HashMap<String, Value>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Value>, PluginError> {
        let handle = self.registry.ensure(plugin).await?;
        handle.execute(action, &params, timeout, cancel).await
    }
}
