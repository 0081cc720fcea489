//! Git adapter: opens, clones, and fetches working copies by shelling out to
//! the `git` binary through the command-runner port.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::application::ports::{RepositorySync, WorkingCopy};
use crate::infra::command_runner::{CommandRunner, DEFAULT_GIT_TIMEOUT, TokioCommandRunner};

/// Repository-sync adapter generic over the command runner so tests can
/// inject canned git outputs.
pub struct GitCli<R: CommandRunner> {
    runner: Arc<R>,
}

impl GitCli<TokioCommandRunner> {
    /// Production adapter with the default git timeout.
    #[must_use]
    pub fn default_runner() -> Self {
        Self::new(TokioCommandRunner::new(DEFAULT_GIT_TIMEOUT))
    }
}

impl<R: CommandRunner> GitCli<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }
}

impl<R: CommandRunner + Send + Sync> RepositorySync for GitCli<R> {
    type Copy = GitWorkingCopy<R>;

    async fn open_or_clone(&self, remote_url: &str, local_path: &Path) -> Result<Self::Copy> {
        if local_path.join(".git").exists() {
            debug!(path = %local_path.display(), "opening existing working copy");
        } else {
            info!(url = %remote_url, path = %local_path.display(), "cloning repository");
            let path = path_str(local_path)?;
            let output = self
                .runner
                .run("git", &["clone", remote_url, path])
                .await
                .context("running git clone")?;
            ensure_success("git clone", &output)?;
        }
        Ok(GitWorkingCopy {
            runner: Arc::clone(&self.runner),
            root: local_path.to_path_buf(),
        })
    }
}

/// One open working copy, addressed with `git -C`.
pub struct GitWorkingCopy<R: CommandRunner> {
    runner: Arc<R>,
    root: PathBuf,
}

impl<R: CommandRunner + Send + Sync> WorkingCopy for GitWorkingCopy<R> {
    async fn set_remote(&self, remote: &str, remote_url: &str) -> Result<()> {
        let root = path_str(&self.root)?;
        let set = self
            .runner
            .run("git", &["-C", root, "remote", "set-url", remote, remote_url])
            .await
            .context("running git remote set-url")?;
        if set.status.success() {
            return Ok(());
        }
        // set-url fails when the remote does not exist yet (fresh clones
        // always have origin; locally initialized copies may not).
        let add = self
            .runner
            .run("git", &["-C", root, "remote", "add", remote, remote_url])
            .await
            .context("running git remote add")?;
        ensure_success("git remote add", &add)
    }

    async fn fetch_and_merge(&self, remote: &str) -> Result<()> {
        let root = path_str(&self.root)?;
        let output = self
            .runner
            .run("git", &["-C", root, "pull", remote])
            .await
            .context("running git pull")?;
        ensure_success("git pull", &output)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("path {} is not valid UTF-8", path.display()))
}

fn ensure_success(what: &str, output: &Output) -> Result<()> {
    anyhow::ensure!(
        output.status.success(),
        "{what} failed: {}",
        String::from_utf8_lossy(&output.stderr).trim()
    );
    Ok(())
}
