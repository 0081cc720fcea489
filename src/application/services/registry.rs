//! Application registry — the owned map of per-application managers.
//!
//! At most one manager exists per application name; managers are created
//! here and dropped on removal.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tracing::info;

use crate::application::ports::{AppRunner, RepositorySync, WorkingCopy};
use crate::application::services::deploy::AppManager;
use crate::domain::app::name_from_url;
use crate::domain::error::RegistryError;

/// Construction parameters for a registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root directory holding per-application repos and instances.
    pub data_dir: PathBuf,
    /// Host name used when constructing reachable URLs.
    pub host: String,
    /// Remote the working copies fetch from.
    pub remote: String,
    /// Console ring capacity, in lines.
    pub console_log_lines: usize,
}

/// Owned map from application name to its deployment manager.
pub struct AppRegistry<S: RepositorySync, R> {
    sync: S,
    config: RegistryConfig,
    apps: Mutex<HashMap<String, Arc<AppManager<S::Copy, R>>>>,
}

impl<S: RepositorySync, R: AppRunner> AppRegistry<S, R> {
    #[must_use]
    pub fn new(sync: S, config: RegistryConfig) -> Self {
        Self {
            sync,
            config,
            apps: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new application from its repository URL: derive its name,
    /// lay out `<data_dir>/apps/<name>/{repo,instances}`, open or clone the
    /// working copy, and persist the remote.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL yields no name, the name is already
    /// registered, the directories cannot be created, or the repository
    /// cannot be opened, cloned, or re-pointed.
    pub async fn register(&self, repo_url: &str) -> Result<Arc<AppManager<S::Copy, R>>> {
        let name = name_from_url(repo_url)?;
        if self.lock().contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name).into());
        }

        let app_root = self.config.data_dir.join("apps").join(&name);
        let repo_dir = app_root.join("repo");
        let instances_root = app_root.join("instances");
        std::fs::create_dir_all(&repo_dir)
            .with_context(|| format!("creating {}", repo_dir.display()))?;
        std::fs::create_dir_all(&instances_root)
            .with_context(|| format!("creating {}", instances_root.display()))?;

        let work = self
            .sync
            .open_or_clone(repo_url, &repo_dir)
            .await
            .with_context(|| format!("opening or cloning the repo for app '{name}'"))?;
        work.set_remote(&self.config.remote, repo_url)
            .await
            .with_context(|| format!("persisting the remote url for app '{name}'"))?;

        let manager = Arc::new(AppManager::new(
            name.clone(),
            repo_url,
            self.config.host.clone(),
            self.config.remote.clone(),
            work,
            instances_root,
            self.config.console_log_lines,
        ));

        match self.lock().entry(name.clone()) {
            // Lost a race against a concurrent registration of the same name.
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(name).into()),
            Entry::Vacant(slot) => {
                info!(app = %name, url = %repo_url, "registered application");
                Ok(Arc::clone(slot.insert(manager)))
            }
        }
    }

    /// Look up a manager by application name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<AppManager<S::Copy, R>>> {
        self.lock().get(name).cloned()
    }

    /// All registered application names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove an application, stopping its running instance first.
    ///
    /// # Errors
    ///
    /// Returns an error when no application with that name is registered.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let manager = self
            .lock()
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))?;
        manager.stop_app().await?;
        info!(app = %name, "removed application");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<AppManager<S::Copy, R>>>> {
        self.apps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
