//! Typed runtime configuration.
//!
//! Config file parsing lives at the CLI boundary; the core only sees this
//! struct.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration with usable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for execution and latest-output records.
    pub state_dir: PathBuf,
    /// Directories scanned for plugin executables.
    pub plugin_dirs: Vec<PathBuf>,
    /// Remote plugin repositories, consulted in ascending `priority` order.
    pub repositories: Vec<RepositoryConfig>,
    /// Retention window for `state clean`, in days.
    pub retention_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".corynth/state"),
            plugin_dirs: vec![PathBuf::from(".corynth/plugins")],
            repositories: Vec::new(),
            retention_days: 30,
        }
    }
}

impl Config {
    /// Repositories sorted by ascending priority.
    pub fn repositories_by_priority(&self) -> Vec<&RepositoryConfig> {
        let mut ordered: Vec<&RepositoryConfig> = self.repositories.iter().collect();
        ordered.sort_by_key(|repository| repository.priority);
        ordered
    }
}

/// One remote plugin repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    /// Base URL; the installer fetches `<url>/<plugin-name>`.
    pub url: String,
    /// Lower numbers are tried first.
    #[serde(default)]
    pub priority: u32,
}
