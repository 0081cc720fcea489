//! Process runner adapter: each instance runs as one OS child process whose
//! stdout and stderr are pumped line-by-line into the deployment log sinks.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::ports::{AppRunner, LineSink, ReadinessWaiter, RunnerFactory};

/// One command to run inside an instance directory.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// How an instance is built and launched inside its instance directory.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Optional build step, run to completion before launch; its output goes
    /// to the build log.
    pub build: Option<CommandSpec>,
    /// Long-running launch command; its output goes to the console log.
    pub run: CommandSpec,
}

/// Runner factory spawning one OS process per instance according to a fixed
/// launch spec.
pub struct ProcessRunnerFactory {
    spec: LaunchSpec,
}

impl ProcessRunnerFactory {
    #[must_use]
    pub fn new(spec: LaunchSpec) -> Self {
        Self { spec }
    }
}

impl RunnerFactory for ProcessRunnerFactory {
    type Runner = ProcessRunner;

    async fn start<W: ReadinessWaiter + Send>(
        &self,
        name: &str,
        instance_dir: &Path,
        build_log: Arc<dyn LineSink>,
        console_log: Arc<dyn LineSink>,
        env: &HashMap<String, String>,
        mut waiter: W,
    ) -> Result<ProcessRunner> {
        if let Some(build) = &self.spec.build {
            run_build_step(name, instance_dir, build, env, &build_log).await?;
        }

        info!(app = %name, program = %self.spec.run.program, "launching instance");
        let mut child = instance_command(&self.spec.run, instance_dir, env)
            .spawn()
            .with_context(|| format!("spawning {} for app '{name}'", self.spec.run.program))?;

        let pumps = [
            spawn_pump(child.stdout.take(), Arc::clone(&console_log), true),
            spawn_pump(child.stderr.take(), console_log, true),
        ];

        // A child dying before it answers on its port is a start failure,
        // not a readiness timeout.
        let ready = tokio::select! {
            ready = waiter.wait_ready() => ready,
            status = child.wait() => {
                let status = status.with_context(|| format!("waiting on app '{name}'"))?;
                Err(anyhow::anyhow!(
                    "app '{name}' exited with {status} before becoming ready"
                ))
            }
        };
        match ready {
            Ok(()) => Ok(ProcessRunner { child, pumps }),
            Err(e) => {
                let _ = child.kill().await;
                Err(e)
            }
        }
    }
}

/// Handle to one running instance process.
pub struct ProcessRunner {
    child: Child,
    pumps: [JoinHandle<()>; 2],
}

impl AppRunner for ProcessRunner {
    async fn shutdown(&mut self) -> Result<()> {
        if let Some(pid) = self.child.id() {
            info!(pid, "stopping instance process");
        }
        self.child
            .kill()
            .await
            .context("killing instance process")?;
        // The pipes are closed now, so the pumps run out on their own.
        for pump in &mut self.pumps {
            let _ = pump.await;
        }
        Ok(())
    }
}

async fn run_build_step(
    name: &str,
    instance_dir: &Path,
    spec: &CommandSpec,
    env: &HashMap<String, String>,
    build_log: &Arc<dyn LineSink>,
) -> Result<()> {
    info!(app = %name, program = %spec.program, "running build step");
    let mut child = instance_command(spec, instance_dir, env)
        .spawn()
        .with_context(|| format!("spawning build step {} for app '{name}'", spec.program))?;

    let pumps = [
        spawn_pump(child.stdout.take(), Arc::clone(build_log), false),
        spawn_pump(child.stderr.take(), Arc::clone(build_log), false),
    ];
    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting on the build step for app '{name}'"))?;
    for pump in pumps {
        let _ = pump.await;
    }
    anyhow::ensure!(
        status.success(),
        "build step for app '{name}' failed with {status}"
    );
    Ok(())
}

fn instance_command(spec: &CommandSpec, instance_dir: &Path, env: &HashMap<String, String>) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(instance_dir)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Pump one output stream into a sink, line by line. Console sinks receive
/// raw lines with their terminator restored; build sinks receive clean lines.
fn spawn_pump<S>(stream: Option<S>, sink: Arc<dyn LineSink>, keep_terminator: bool) -> JoinHandle<()>
where
    S: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(stream) = stream else { return };
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if keep_terminator {
                sink.line(&format!("{line}\n"));
            } else {
                sink.line(&line);
            }
        }
    })
}
