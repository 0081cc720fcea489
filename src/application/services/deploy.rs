//! Deployment orchestration — the per-application manager and its update
//! protocol.
//!
//! Imports only from `crate::domain` and `crate::application`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::application::ports::{
    AppRunner, DeployListener, LineSink, PortAllocator, ReadinessGate, RunnerFactory, WorkingCopy,
};
use crate::application::services::logs::{
    BuildLog, BuildLogSink, ConsoleBuffer, ConsoleSink, DetachableForward,
};
use crate::application::services::provision::provision_instance;
use crate::domain::app::{app_env_vars, reachable_url};

/// Remote the working copy is fetched from when none is configured.
pub const DEFAULT_REMOTE: &str = "origin";

/// Per-application deployment manager.
///
/// Owns the current runner handle and the two log surfaces. `update` and
/// `stop_app` serialize on one async mutex held across the whole sequence;
/// the log accessors take only the log locks and stay responsive while a
/// deployment blocks on fetch, copy, or readiness.
pub struct AppManager<W, R> {
    name: String,
    repo_url: String,
    host: String,
    remote: String,
    work: W,
    instances_root: PathBuf,
    listeners: Mutex<Vec<Box<dyn DeployListener>>>,
    build_log: Arc<BuildLog>,
    console: Arc<ConsoleBuffer>,
    current: tokio::sync::Mutex<Option<R>>,
}

impl<W: WorkingCopy, R: AppRunner> AppManager<W, R> {
    /// Build a manager around an already-open working copy. Managers are
    /// normally created through the registry, which also lays out the
    /// per-application directories.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        repo_url: impl Into<String>,
        host: impl Into<String>,
        remote: impl Into<String>,
        work: W,
        instances_root: PathBuf,
        console_capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            repo_url: repo_url.into(),
            host: host.into(),
            remote: remote.into(),
            work,
            instances_root,
            listeners: Mutex::new(Vec::new()),
            build_log: Arc::new(BuildLog::new()),
            console: Arc::new(ConsoleBuffer::new(console_capacity)),
            current: tokio::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    /// Register a listener. Listeners are notified synchronously, in
    /// registration order, once per successful deployment.
    pub fn add_listener(&self, listener: Box<dyn DeployListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Transcript of the most recent deployment attempt. Frozen once the
    /// attempt completes; empty after `clear_logs`.
    #[must_use]
    pub fn latest_build_log(&self) -> String {
        self.build_log.snapshot()
    }

    /// Rolling transcript of the running instance's output.
    #[must_use]
    pub fn latest_console_log(&self) -> String {
        self.console.snapshot()
    }

    /// Reset both log surfaces. Independent of any in-flight update.
    pub fn clear_logs(&self) {
        self.build_log.clear();
        self.console.clear();
    }

    /// Whether an instance is currently running.
    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Run one full deployment: fetch, provision, start the new instance,
    /// wait for it to answer, swap it in, notify listeners, retire the old
    /// instance. Concurrent calls block until the prior deployment finishes.
    ///
    /// # Errors
    ///
    /// Returns an error when the fetch, provisioning, or start step fails;
    /// in every failure case the previously running instance keeps serving
    /// and no listener is notified.
    pub async fn update<P>(&self, runtime: &P, progress: Arc<dyn LineSink>) -> Result<()>
    where
        P: RunnerFactory<Runner = R> + PortAllocator + ReadinessGate,
    {
        let mut current = self.current.lock().await;

        self.clear_logs();
        let build = Arc::new(BuildLogSink::new(progress, Arc::clone(&self.build_log)));
        let forward = Arc::new(DetachableForward::attached(
            Arc::clone(&build) as Arc<dyn LineSink>
        ));
        let console: Arc<dyn LineSink> = Arc::new(ConsoleSink::new(
            Arc::clone(&forward),
            Arc::clone(&self.console),
        ));

        build.line("Fetching latest changes from git...");
        self.work
            .fetch_and_merge(&self.remote)
            .await
            .with_context(|| format!("fetching latest changes for app '{}'", self.name))?;

        let instance_dir = provision_instance(self.work.root(), &self.instances_root)
            .with_context(|| format!("provisioning a new instance of app '{}'", self.name))?;
        build.line(&format!("Created new instance in {}", instance_dir.display()));

        let port = runtime
            .allocate_port()
            .with_context(|| format!("allocating a port for app '{}'", self.name))?;
        let env = app_env_vars(port, &self.name);

        let waiter = runtime
            .acquire(&self.name, port)
            .with_context(|| format!("acquiring a readiness waiter for app '{}'", self.name))?;
        let new_runner = runtime
            .start(
                &self.name,
                &instance_dir,
                Arc::clone(&build) as Arc<dyn LineSink>,
                console,
                &env,
                waiter,
            )
            .await
            .with_context(|| {
                format!(
                    "starting app '{}' in {}",
                    self.name,
                    instance_dir.display()
                )
            })?;

        let old = current.replace(new_runner);
        forward.detach();
        info!(app = %self.name, port, "new instance is ready");

        let url = reachable_url(&self.host, port, &self.name);
        self.notify_listeners(&url);

        if let Some(mut old) = old {
            build.line("Shutting down previous version");
            info!(app = %self.name, "shutting down previous instance");
            if let Err(e) = old.shutdown().await {
                warn!(app = %self.name, error = %e, "previous instance did not shut down cleanly");
            }
            // TODO: retire the previous instance directory here once a
            // retention policy is decided; directories accumulate until then.
        }
        build.line("Deployment complete.");
        Ok(())
    }

    /// Stop the running instance, if any. Serialized against `update` and
    /// other `stop_app` calls; a no-op when nothing is running.
    ///
    /// # Errors
    ///
    /// Currently infallible — shutdown failures are logged and the runner
    /// reference is cleared regardless.
    pub async fn stop_app(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        if let Some(mut runner) = current.take() {
            info!(app = %self.name, "stopping");
            if let Err(e) = runner.shutdown().await {
                warn!(app = %self.name, error = %e, "instance did not shut down cleanly");
            }
        }
        Ok(())
    }

    fn notify_listeners(&self, url: &str) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for (index, listener) in listeners.iter().enumerate() {
            if let Err(e) = listener.on_app_started(&self.name, url) {
                warn!(app = %self.name, listener = index, error = %e, "deploy listener failed");
            }
        }
    }
}
