//! Settings persistence: JSON under the data directory, defaults when the
//! file is absent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::services::deploy::DEFAULT_REMOTE;
use crate::application::services::logs::DEFAULT_CONSOLE_CAPACITY;
use crate::application::services::registry::RegistryConfig;

/// Tunable settings for the deployment manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory holding per-application repos and instances.
    pub data_dir: PathBuf,
    /// Host name used when constructing reachable URLs.
    pub host: String,
    /// Remote the working copies fetch from.
    pub remote: String,
    /// Console ring capacity, in lines.
    pub console_log_lines: usize,
    /// Overall bound on one readiness wait, in seconds.
    pub ready_timeout_secs: u64,
    /// Delay between readiness probes, in milliseconds.
    pub ready_poll_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            host: "localhost".to_owned(),
            remote: DEFAULT_REMOTE.to_owned(),
            console_log_lines: DEFAULT_CONSOLE_CAPACITY,
            ready_timeout_secs: 120,
            ready_poll_millis: 500,
        }
    }
}

/// Default data directory: `~/.handover`, falling back to a relative
/// directory when no home is known.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".handover"), |home| home.join(".handover"))
}

impl Settings {
    /// Default on-disk location: `<data_dir>/settings.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        default_data_dir().join("settings.json")
    }

    /// Load settings from `path`, falling back to defaults when the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }

    /// Persist settings to `path`, creating parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("serializing settings")?;
        std::fs::write(path, content)
            .with_context(|| format!("writing settings file {}", path.display()))
    }

    /// Registry construction parameters derived from these settings.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            data_dir: self.data_dir.clone(),
            host: self.host.clone(),
            remote: self.remote.clone(),
            console_log_lines: self.console_log_lines,
        }
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    #[must_use]
    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_millis)
    }
}
