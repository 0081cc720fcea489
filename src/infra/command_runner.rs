//! Subprocess execution with a bounded timeout and guaranteed kill.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

/// Default timeout for git subprocess calls. Clones of large repositories
/// dominate, so this is generous.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Abstracts process execution so adapters built on external binaries can be
/// tested with canned outputs instead of real processes.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program to completion and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be spawned or exceeds the
    /// runner's timeout. On timeout the child is killed, not left orphaned.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
}

/// Production runner — tokio process execution with an explicit kill when
/// the timeout fires, and concurrent pipe drains so a chatty child cannot
/// deadlock on a full pipe buffer.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    drain(&mut stdout_pipe),
                    drain(&mut stderr_pipe),
                );
                let status = status.with_context(|| format!("waiting for {program}"))?;
                Ok(Output { status, stdout, stderr })
            } => result,
            () = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {:?}", self.timeout)
            }
        }
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(pipe: &mut Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}
