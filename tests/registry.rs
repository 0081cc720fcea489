//! Registry lifecycle: one manager per application name.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use handover::application::ports::{RepositorySync, WorkingCopy};
use handover::application::services::registry::{AppRegistry, RegistryConfig};
// The runner type only pins the registry's type parameter; these tests never
// deploy, so the production process runner serves as-is.
use handover::infra::process::ProcessRunner;

struct StubWorkingCopy {
    root: PathBuf,
}

impl WorkingCopy for StubWorkingCopy {
    async fn set_remote(&self, _remote: &str, _remote_url: &str) -> Result<()> {
        Ok(())
    }

    async fn fetch_and_merge(&self, _remote: &str) -> Result<()> {
        Ok(())
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Records (url, path) per open-or-clone call.
struct StubSync {
    opened: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl StubSync {
    fn new() -> (Self, Arc<Mutex<Vec<(String, PathBuf)>>>) {
        let opened = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                opened: Arc::clone(&opened),
            },
            opened,
        )
    }
}

impl RepositorySync for StubSync {
    type Copy = StubWorkingCopy;

    async fn open_or_clone(&self, remote_url: &str, local_path: &Path) -> Result<StubWorkingCopy> {
        self.opened
            .lock()
            .unwrap()
            .push((remote_url.to_owned(), local_path.to_path_buf()));
        Ok(StubWorkingCopy {
            root: local_path.to_path_buf(),
        })
    }
}

type Opened = Arc<Mutex<Vec<(String, PathBuf)>>>;

fn registry(data_dir: &Path) -> (AppRegistry<StubSync, ProcessRunner>, Opened) {
    let (sync, opened) = StubSync::new();
    let registry = AppRegistry::new(
        sync,
        RegistryConfig {
            data_dir: data_dir.to_path_buf(),
            host: "localhost".to_owned(),
            remote: "origin".to_owned(),
            console_log_lines: 100,
        },
    );
    (registry, opened)
}

#[tokio::test]
async fn register_lays_out_the_app_directories() {
    let data = tempfile::tempdir().expect("data dir");
    let (registry, opened) = registry(data.path());

    let manager = registry
        .register("https://example.com/org/my-app.git")
        .await
        .expect("register");
    assert_eq!(manager.name(), "my-app");
    assert_eq!(manager.repo_url(), "https://example.com/org/my-app.git");

    let app_root = data.path().join("apps").join("my-app");
    assert!(app_root.join("repo").is_dir());
    assert!(app_root.join("instances").is_dir());
    assert_eq!(registry.names(), vec!["my-app".to_owned()]);

    let opened = opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, "https://example.com/org/my-app.git");
    assert_eq!(opened[0].1, app_root.join("repo"));
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let data = tempfile::tempdir().expect("data dir");
    let (registry, _) = registry(data.path());

    registry
        .register("https://example.com/org/my-app.git")
        .await
        .expect("first register");
    let err = registry
        .register("https://other.example.com/my-app")
        .await
        .expect_err("expected duplicate rejection");
    assert!(err.to_string().contains("already registered"));
    assert_eq!(registry.names().len(), 1);
}

#[tokio::test]
async fn unregisterable_urls_are_rejected() {
    let data = tempfile::tempdir().expect("data dir");
    let (registry, _) = registry(data.path());

    let err = registry
        .register("https://example.com/")
        .await
        .expect_err("expected name derivation failure");
    assert!(err.to_string().contains("cannot derive an application name"));
    assert!(registry.names().is_empty());
}

#[tokio::test]
async fn remove_is_rejected_for_unknown_names() {
    let data = tempfile::tempdir().expect("data dir");
    let (registry, _) = registry(data.path());

    let err = registry.remove("ghost").await.expect_err("expected Err");
    assert!(err.to_string().contains("no application named 'ghost'"));
}

#[tokio::test]
async fn remove_drops_the_manager() {
    let data = tempfile::tempdir().expect("data dir");
    let (registry, _) = registry(data.path());

    registry
        .register("https://example.com/org/my-app.git")
        .await
        .expect("register");
    assert!(registry.get("my-app").is_some());

    registry.remove("my-app").await.expect("remove");
    assert!(registry.get("my-app").is_none());
    assert!(registry.names().is_empty());
}
