//! Port trait definitions for the application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

// ── Log sinks and listeners ───────────────────────────────────────────────────

/// Consumer of one output line. Sync and dyn-safe so a single sink can be
/// shared between the orchestrator and a runner's output pumps.
///
/// Build-phase consumers receive terminator-free lines; console consumers
/// receive raw lines including their trailing terminator.
pub trait LineSink: Send + Sync {
    /// Accept one line.
    fn line(&self, line: &str);
}

/// Callback fired once per successful deployment, after the new instance is
/// confirmed ready and before the previous one is retired.
pub trait DeployListener: Send + Sync {
    /// # Errors
    ///
    /// A failing listener is logged and skipped; later listeners are still
    /// notified and the deployment still succeeds.
    fn on_app_started(&self, name: &str, url: &str) -> Result<()>;
}

// ── Repository sync ───────────────────────────────────────────────────────────

/// Opens or clones working copies of remote repositories.
#[allow(async_fn_in_trait)]
pub trait RepositorySync {
    type Copy: WorkingCopy;

    /// Open the working copy at `local_path`, cloning `remote_url` when none
    /// exists there yet.
    ///
    /// # Errors
    ///
    /// Returns an error when neither open nor clone succeeds.
    async fn open_or_clone(&self, remote_url: &str, local_path: &Path) -> Result<Self::Copy>;
}

/// Handle to one open working copy.
#[allow(async_fn_in_trait)]
pub trait WorkingCopy: Send + Sync {
    /// Re-point `remote` at `remote_url`, persistently.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote cannot be persisted.
    async fn set_remote(&self, remote: &str, remote_url: &str) -> Result<()>;

    /// Fetch the latest changes from `remote` and merge them into the
    /// working tree.
    ///
    /// # Errors
    ///
    /// Returns an error when the fetch or merge fails; the working tree is
    /// left as it was.
    async fn fetch_and_merge(&self, remote: &str) -> Result<()>;

    /// Root directory of the working tree.
    fn root(&self) -> &Path;
}

// ── Runner adapter ────────────────────────────────────────────────────────────

/// Handle to one running instance of the application.
#[allow(async_fn_in_trait)]
pub trait AppRunner: Send {
    /// Stop the instance. Best-effort: the orchestrator logs failures and
    /// keeps going.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance could not be stopped cleanly.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Starts new runners bound to a freshly provisioned instance directory.
#[allow(async_fn_in_trait)]
pub trait RunnerFactory {
    type Runner: AppRunner;

    /// Start a runner in `instance_dir` with the given environment, wiring
    /// build output into `build_log` and runtime output into `console_log`.
    ///
    /// Does not return until `waiter` reports the instance ready, the start
    /// fails, or the wait times out. The waiter is consumed by the attempt,
    /// so its scoped resources are released on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance cannot be started or never becomes
    /// ready; no runner handle escapes a failed attempt.
    async fn start<W: ReadinessWaiter + Send>(
        &self,
        name: &str,
        instance_dir: &Path,
        build_log: Arc<dyn LineSink>,
        console_log: Arc<dyn LineSink>,
        env: &HashMap<String, String>,
        waiter: W,
    ) -> Result<Self::Runner>;
}

// ── Readiness and ports ───────────────────────────────────────────────────────

/// Allocates a free network port for a new instance.
pub trait PortAllocator {
    /// # Errors
    ///
    /// Returns an error when no free port can be allocated.
    fn allocate_port(&self) -> Result<u16>;
}

/// Produces scoped readiness waiters bound to an (application, port) pair.
pub trait ReadinessGate {
    type Waiter: ReadinessWaiter + Send;

    /// # Errors
    ///
    /// Returns an error when the waiter's polling resources cannot be set up.
    fn acquire(&self, name: &str, port: u16) -> Result<Self::Waiter>;
}

/// Scoped resource that blocks until the application answers on its port.
/// Dropping the waiter releases anything it holds.
#[allow(async_fn_in_trait)]
pub trait ReadinessWaiter {
    /// # Errors
    ///
    /// Returns an error when the instance does not become ready in time.
    async fn wait_ready(&mut self) -> Result<()>;
}
