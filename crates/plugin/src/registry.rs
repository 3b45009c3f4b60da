//! Plugin registry: name → plugin lookup, local discovery, repository install.
//!
//! Discovery registers lazy entries; the process is started on first `get`.
//! The map is guarded by a reader-writer lock since reads dominate and
//! writes only happen during install or removal.

use crate::{PluginError, PluginHandle};
use corynth_types::RepositoryConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Listing row for a known plugin.
#[derive(Debug, Clone)]
pub struct PluginSummary {
    pub name: String,
    pub path: PathBuf,
    pub running: bool,
    pub version: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Registry over configured plugin directories and repositories.
pub struct PluginRegistry {
    plugin_dirs: Vec<PathBuf>,
    repositories: Vec<RepositoryConfig>,
    discovered: RwLock<HashMap<String, PathBuf>>,
    running: RwLock<HashMap<String, Arc<PluginHandle>>>,
    http: reqwest::Client,
}

impl PluginRegistry {
    pub fn new(plugin_dirs: Vec<PathBuf>, repositories: Vec<RepositoryConfig>) -> Self {
        let mut repositories = repositories;
        repositories.sort_by_key(|repository| repository.priority);
        Self {
            plugin_dirs,
            repositories,
            discovered: RwLock::new(HashMap::new()),
            running: RwLock::new(HashMap::new()),
            http: reqwest::Client::new(),
        }
    }

    /// Scan plugin directories and register every executable that matches the
    /// naming convention: `<dir>/<name>` or `<dir>/<name>/<name>`.
    pub async fn load_local(&self) -> Result<usize, PluginError> {
        let mut found = HashMap::new();
        for dir in &self.plugin_dirs {
            let mut entries = match fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
                Err(error) => return Err(PluginError::process("registry", format!("scan {}: {error}", dir.display()))),
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let candidate = if path.is_dir() { path.join(&name) } else { path };
                if is_executable(&candidate).await {
                    debug!(plugin = %name, path = %candidate.display(), "discovered plugin");
                    found.insert(name, candidate);
                }
            }
        }
        let count = found.len();
        let mut discovered = self.discovered.write().await;
        discovered.extend(found);
        Ok(count)
    }

    /// Resolve a plugin by name, starting its process on first use.
    pub async fn get(&self, name: &str) -> Result<Arc<PluginHandle>, PluginError> {
        if let Some(handle) = self.running.read().await.get(name) {
            return Ok(handle.clone());
        }

        let executable = self
            .discovered
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::not_found(name))?;

        let mut running = self.running.write().await;
        // A concurrent caller may have raced us to the start.
        if let Some(handle) = running.get(name) {
            return Ok(handle.clone());
        }
        let handle = Arc::new(PluginHandle::start(name, &executable).await?);
        running.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Resolve a plugin, installing it from a repository when unknown.
    pub async fn ensure(&self, name: &str) -> Result<Arc<PluginHandle>, PluginError> {
        match self.get(name).await {
            Err(PluginError::NotFound { .. }) => {
                self.install_from_repository(name).await?;
                self.load_local().await?;
                self.get(name).await
            }
            outcome => outcome,
        }
    }

    /// Fetch a plugin executable from the configured repositories in
    /// ascending priority order. Partial downloads are removed on failure;
    /// reinstalling an already-present plugin is a no-op overwrite.
    pub async fn install_from_repository(&self, name: &str) -> Result<PathBuf, PluginError> {
        let target_dir = self
            .plugin_dirs
            .first()
            .ok_or_else(|| PluginError::install(name, "no plugin directory configured"))?;
        if self.repositories.is_empty() {
            return Err(PluginError::install(name, "no repositories configured"));
        }
        fs::create_dir_all(target_dir)
            .await
            .map_err(|error| PluginError::install(name, error.to_string()))?;

        let mut failures = Vec::new();
        for repository in &self.repositories {
            let url = format!("{}/{}", repository.url.trim_end_matches('/'), name);
            match self.download(name, &url, target_dir).await {
                Ok(path) => {
                    info!(plugin = %name, repository = %repository.name, "plugin installed");
                    return Ok(path);
                }
                Err(error) => {
                    warn!(plugin = %name, repository = %repository.name, %error, "repository install failed");
                    failures.push(format!("{}: {error}", repository.name));
                }
            }
        }
        Err(PluginError::install(name, failures.join("; ")))
    }

    async fn download(&self, name: &str, url: &str, target_dir: &Path) -> Result<PathBuf, PluginError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| PluginError::install(name, error.to_string()))?;
        if !response.status().is_success() {
            return Err(PluginError::install(name, format!("{url} returned {}", response.status())));
        }

        let partial = target_dir.join(format!("{name}.partial"));
        let finished = target_dir.join(name);
        let outcome = async {
            let bytes = response.bytes().await.map_err(|error| PluginError::install(name, error.to_string()))?;
            fs::write(&partial, &bytes)
                .await
                .map_err(|error| PluginError::install(name, error.to_string()))?;
            mark_executable(&partial)
                .await
                .map_err(|error| PluginError::install(name, error.to_string()))?;
            fs::rename(&partial, &finished)
                .await
                .map_err(|error| PluginError::install(name, error.to_string()))?;
            Ok(finished.clone())
        }
        .await;

        if outcome.is_err() {
            let _ = fs::remove_file(&partial).await;
        }
        outcome
    }

    /// Known plugins, discovered and running alike.
    pub async fn list(&self) -> Vec<PluginSummary> {
        let discovered = self.discovered.read().await;
        let running = self.running.read().await;
        let mut rows: Vec<PluginSummary> = discovered
            .iter()
            .map(|(name, path)| {
                let handle = running.get(name);
                PluginSummary {
                    name: name.clone(),
                    path: path.clone(),
                    running: handle.is_some(),
                    version: handle.map(|handle| handle.metadata().version.clone()),
                    description: handle.map(|handle| handle.metadata().description.clone()),
                    tags: handle.map(|handle| handle.metadata().tags.clone()).unwrap_or_default(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    /// Filter known plugins by a name/description substring and tag set.
    pub async fn search(&self, query: &str, tags: &[String]) -> Vec<PluginSummary> {
        let query = query.to_lowercase();
        self.list()
            .await
            .into_iter()
            .filter(|row| {
                let matches_query = query.is_empty()
                    || row.name.to_lowercase().contains(&query)
                    || row
                        .description
                        .as_deref()
                        .is_some_and(|description| description.to_lowercase().contains(&query));
                let matches_tags = tags.iter().all(|tag| row.tags.contains(tag));
                matches_query && matches_tags
            })
            .collect()
    }

    /// Stop a plugin if running and delete its executable.
    pub async fn remove(&self, name: &str) -> Result<(), PluginError> {
        if let Some(handle) = self.running.write().await.remove(name) {
            handle.close().await;
        }
        let path = self
            .discovered
            .write()
            .await
            .remove(name)
            .ok_or_else(|| PluginError::not_found(name))?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(PluginError::process(name, format!("remove {}: {error}", path.display()))),
        }
    }

    /// Close every running plugin process.
    pub async fn close_all(&self) {
        let mut running = self.running.write().await;
        for (_, handle) in running.drain() {
            handle.close().await;
        }
    }
}

async fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path).await else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

async fn mark_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fs::metadata(path).await?.permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(path, permissions).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn write_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, b"#!/bin/sh\nexit 0\n").expect("write");
        let mut permissions = std::fs::metadata(path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(path, permissions).expect("chmod");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn discovers_both_naming_conventions() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_executable(&dir.path().join("shell"));
        std::fs::create_dir(dir.path().join("http")).expect("mkdir");
        write_executable(&dir.path().join("http").join("http"));
        // A plain data file must not register.
        std::fs::write(dir.path().join("README.md"), b"docs").expect("write");

        let registry = PluginRegistry::new(vec![dir.path().to_path_buf()], vec![]);
        let count = registry.load_local().await.expect("scan");
        assert_eq!(count, 2);

        let rows = registry.list().await;
        let names: Vec<&str> = rows.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["http", "shell"]);
        assert!(rows.iter().all(|row| !row.running));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rescan_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_executable(&dir.path().join("shell"));

        let registry = PluginRegistry::new(vec![dir.path().to_path_buf()], vec![]);
        registry.load_local().await.expect("scan");
        registry.load_local().await.expect("rescan");
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_plugin_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = PluginRegistry::new(vec![dir.path().to_path_buf()], vec![]);
        registry.load_local().await.expect("scan");

        assert!(matches!(
            registry.get("missing").await,
            Err(PluginError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn install_without_repositories_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = PluginRegistry::new(vec![dir.path().to_path_buf()], vec![]);
        assert!(matches!(
            registry.install_from_repository("shell").await,
            Err(PluginError::Install { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn remove_deletes_the_executable() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_executable(&dir.path().join("shell"));

        let registry = PluginRegistry::new(vec![dir.path().to_path_buf()], vec![]);
        registry.load_local().await.expect("scan");
        registry.remove("shell").await.expect("remove");

        assert!(!dir.path().join("shell").exists());
        assert!(registry.list().await.is_empty());
    }
}
