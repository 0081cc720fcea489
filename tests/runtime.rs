//! Production adapters against real processes and sockets.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use handover::application::ports::{LineSink, PortAllocator, ReadinessGate, ReadinessWaiter};
use handover::infra::net::{OsPortAllocator, TcpReadinessGate};

struct CollectingSink(Mutex<Vec<String>>);

impl CollectingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Vec::new())))
    }

    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl LineSink for CollectingSink {
    fn line(&self, line: &str) {
        self.0.lock().unwrap().push(line.to_owned());
    }
}

#[test]
fn allocated_ports_are_free_to_bind() {
    let port = OsPortAllocator.allocate_port().expect("allocate");
    assert_ne!(port, 0);
    // The probe socket is gone, so the port is ours to take.
    std::net::TcpListener::bind(("127.0.0.1", port)).expect("bind allocated port");
}

#[tokio::test]
async fn waiter_resolves_once_the_port_answers() {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let gate = TcpReadinessGate::new(Duration::from_secs(5), Duration::from_millis(20));
    let mut waiter = gate.acquire("my-app", port).expect("acquire");
    waiter.wait_ready().await.expect("ready");
}

#[tokio::test]
async fn waiter_times_out_against_a_dead_port() {
    let port = OsPortAllocator.allocate_port().expect("allocate");

    let gate = TcpReadinessGate::new(Duration::from_millis(150), Duration::from_millis(20));
    let mut waiter = gate.acquire("my-app", port).expect("acquire");
    let err = waiter.wait_ready().await.expect_err("expected timeout");
    let msg = err.to_string();
    assert!(msg.contains("my-app"), "got: {msg}");
    assert!(msg.contains(&port.to_string()), "got: {msg}");
}

#[cfg(unix)]
mod process {
    use std::collections::HashMap;
    use std::path::Path;

    use anyhow::Result;
    use handover::application::ports::{AppRunner, RunnerFactory};
    use handover::infra::process::{CommandSpec, LaunchSpec, ProcessRunnerFactory};

    use super::*;

    struct InstantWaiter;

    impl ReadinessWaiter for InstantWaiter {
        async fn wait_ready(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct PatientWaiter;

    impl ReadinessWaiter for PatientWaiter {
        async fn wait_ready(&mut self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            anyhow::bail!("gave up")
        }
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    fn env_for(dir: &Path) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("PATH".to_owned(), std::env::var("PATH").unwrap_or_default());
        env.insert("APP_PORT".to_owned(), "0".to_owned());
        env.insert("INSTANCE".to_owned(), dir.display().to_string());
        env
    }

    #[tokio::test]
    async fn runtime_output_reaches_the_console_sink() {
        let dir = tempfile::tempdir().expect("instance dir");
        let factory = ProcessRunnerFactory::new(LaunchSpec {
            build: None,
            run: sh("echo started in $INSTANCE; sleep 30"),
        });
        let build = CollectingSink::new();
        let console = CollectingSink::new();

        let mut runner = factory
            .start(
                "my-app",
                dir.path(),
                build.clone(),
                console.clone(),
                &env_for(dir.path()),
                InstantWaiter,
            )
            .await
            .expect("start");

        // The pump races the assertion; poll briefly.
        let mut seen = false;
        for _ in 0..50 {
            if console.lines().iter().any(|l| l.starts_with("started in")) {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        runner.shutdown().await.expect("shutdown");
        assert!(seen, "console output never arrived: {:?}", console.lines());
        assert!(
            console.lines().iter().all(|l| l.ends_with('\n')),
            "console lines keep their terminator"
        );
        assert!(build.lines().is_empty(), "no build step, no build output");
    }

    #[tokio::test]
    async fn build_step_runs_first_and_feeds_the_build_sink() {
        let dir = tempfile::tempdir().expect("instance dir");
        let factory = ProcessRunnerFactory::new(LaunchSpec {
            build: Some(sh("echo compiling; echo done >&2")),
            run: sh("sleep 30"),
        });
        let build = CollectingSink::new();
        let console = CollectingSink::new();

        let mut runner = factory
            .start(
                "my-app",
                dir.path(),
                build.clone(),
                console.clone(),
                &env_for(dir.path()),
                InstantWaiter,
            )
            .await
            .expect("start");
        runner.shutdown().await.expect("shutdown");

        let lines = build.lines();
        assert!(lines.contains(&"compiling".to_owned()), "got: {lines:?}");
        assert!(lines.contains(&"done".to_owned()), "stderr feeds it too");
    }

    #[tokio::test]
    async fn failing_build_step_aborts_the_start() {
        let dir = tempfile::tempdir().expect("instance dir");
        let factory = ProcessRunnerFactory::new(LaunchSpec {
            build: Some(sh("echo broken; exit 2")),
            run: sh("sleep 30"),
        });

        let err = factory
            .start(
                "my-app",
                dir.path(),
                CollectingSink::new(),
                CollectingSink::new(),
                &env_for(dir.path()),
                InstantWaiter,
            )
            .await
            .expect_err("expected build failure");
        assert!(err.to_string().contains("build step"), "got: {err}");
    }

    #[tokio::test]
    async fn early_exit_is_a_start_failure() {
        let dir = tempfile::tempdir().expect("instance dir");
        let factory = ProcessRunnerFactory::new(LaunchSpec {
            build: None,
            run: sh("exit 3"),
        });

        let err = factory
            .start(
                "my-app",
                dir.path(),
                CollectingSink::new(),
                CollectingSink::new(),
                &env_for(dir.path()),
                PatientWaiter,
            )
            .await
            .expect_err("expected early-exit failure");
        assert!(
            err.to_string().contains("before becoming ready"),
            "got: {err}"
        );
    }
}
