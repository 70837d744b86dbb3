#![allow(unused_crate_dependencies)]
//! Test utilities for CLI crate integration tests.
#![allow(missing_docs)]
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Run the given future with a timeout, failing the test if it elapses.
///
/// # Panics
///
/// Panics if the timeout elapses before the future completes.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Temp project with `backend/main.py` and a `tether.toml` holding `config`
pub fn project_with_config(config: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    write_script(dir.path(), "# backend\n");
    let config_path = dir.path().join("tether.toml");
    std::fs::write(&config_path, config).expect("write config");
    (dir, config_path)
}

/// Replace the backend script inside a project directory
pub fn write_script(project: &Path, body: &str) {
    std::fs::create_dir_all(project.join("backend")).expect("backend dir");
    std::fs::write(project.join("backend/main.py"), body).expect("write script");
}
