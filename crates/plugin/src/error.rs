//! Plugin lifecycle and invocation errors.

use thiserror::Error;

/// Everything that can go wrong between the engine and a plugin process.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin not found: {name}")]
    NotFound { name: String },

    #[error("plugin process error: {name} - {reason}")]
    Process { name: String, reason: String },

    #[error("plugin handshake failed: {name} - {reason}")]
    Handshake { name: String, reason: String },

    #[error("plugin unhealthy: {name}")]
    Unhealthy { name: String },

    #[error("plugin transport error: {name} - {reason}")]
    Transport { name: String, reason: String },

    #[error("plugin '{name}' action '{action}' failed: {reason}")]
    Execution { name: String, action: String, reason: String },

    #[error("plugin '{name}' action '{action}' timed out after {timeout_ms}ms")]
    Timeout { name: String, action: String, timeout_ms: u64 },

    #[error("plugin '{name}' action '{action}' cancelled")]
    Cancelled { name: String, action: String },

    #[error("plugin install failed: {name} - {reason}")]
    Install { name: String, reason: String },
}

impl PluginError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn process(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Process {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn handshake(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handshake {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn unhealthy(name: impl Into<String>) -> Self {
        Self::Unhealthy { name: name.into() }
    }

    pub fn transport(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(name: impl Into<String>, action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            name: name.into(),
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(name: impl Into<String>, action: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            name: name.into(),
            action: action.into(),
            timeout_ms,
        }
    }

    pub fn cancelled(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Cancelled {
            name: name.into(),
            action: action.into(),
        }
    }

    pub fn install(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Install {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry policy is allowed to absorb this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Execution { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(PluginError::transport("shell", "broken pipe").is_retryable());
        assert!(PluginError::execution("shell", "exec", "boom").is_retryable());
        assert!(PluginError::timeout("shell", "exec", 1000).is_retryable());
        assert!(!PluginError::cancelled("shell", "exec").is_retryable());
        assert!(!PluginError::not_found("shell").is_retryable());
    }
}
