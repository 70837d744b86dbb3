#![allow(unused_crate_dependencies)]

mod common;

use cli::{CliError, Overrides};
use common::project_with_config;
use schema::{HealthCheckType, ReadinessStrategy, TimeoutPolicy};
use std::path::PathBuf;

const CONFIG: &str = r#"
[backend]
interpreter = "python3"
port = 8123
readyMarker = "Uvicorn running"
startupTimeoutMs = 15000
pollIntervalMs = 250

[backend.environment]
APP_ENV = "dev"
"#;

#[test]
fn test_load_spec_resolves_script_next_to_config() {
    let (dir, config) = project_with_config(CONFIG);

    let spec = cli::load_spec(Some(&config), &Overrides::default()).expect("load_spec");
    assert_eq!(spec.port, 8123);
    assert_eq!(spec.ready_marker, "Uvicorn running");
    assert_eq!(spec.startup_timeout_ms, 15_000);
    assert_eq!(spec.base_dir.as_deref().map(PathBuf::from), Some(dir.path().to_path_buf()));

    let summary = cli::describe(&spec).expect("describe");
    let script = dir.path().join("backend/main.py");
    assert!(summary.contains(&format!("python3 {}", script.display())), "{}", summary);
    assert!(summary.contains("mode:      development"), "{}", summary);
    assert!(summary.contains("port:      8123"), "{}", summary);
    assert!(summary.contains("\"Uvicorn running\""), "{}", summary);
    assert!(summary.contains("15000ms (poll every 250ms, Kill on timeout)"), "{}", summary);
}

#[test]
fn test_timeout_override_replaces_config_and_clamps_poll() {
    let (_dir, config) = project_with_config(CONFIG);

    let overrides = Overrides {
        packaged: false,
        timeout_ms: Some(100),
    };
    let spec = cli::load_spec(Some(&config), &overrides).expect("load_spec");
    assert_eq!(spec.startup_timeout_ms, 100);
    assert_eq!(spec.poll_interval_ms, 100);
}

#[test]
fn test_zero_timeout_override_is_rejected() {
    let (_dir, config) = project_with_config(CONFIG);

    let overrides = Overrides {
        packaged: false,
        timeout_ms: Some(0),
    };
    let err = cli::load_spec(Some(&config), &overrides).unwrap_err();
    assert!(matches!(err, CliError::InvalidArgument(_)));
    assert_eq!(err.code(), "CLI002");
}

#[test]
fn test_invalid_config_reports_field_path() {
    let (_dir, config) = project_with_config("[backend]\nstartupTimeoutMs = 0\n");

    let err = cli::load_spec(Some(&config), &Overrides::default()).unwrap_err();
    assert_eq!(err.code(), "CLI003");
    assert!(err.to_string().contains("backend.startupTimeoutMs"), "{}", err);
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = cli::load_spec(Some(&missing), &Overrides::default()).unwrap_err();
    assert!(matches!(err, CliError::ConfigError(_)));
}

#[test]
fn test_packaged_override_looks_for_bundled_executable() {
    let (dir, config) = project_with_config("[backend]\nexecutable = \"bin/backend\"\n");

    let mut spec = cli::load_spec(
        Some(&config),
        &Overrides {
            packaged: true,
            timeout_ms: None,
        },
    )
    .expect("load_spec");
    assert!(spec.packaged);
    spec.resources_dir = Some(dir.path().to_string_lossy().into_owned());

    let err = cli::describe(&spec).unwrap_err();
    assert_eq!(err.code(), "START001");
    assert!(err.to_string().contains("backend"), "{}", err);

    std::fs::create_dir_all(dir.path().join("bin")).unwrap();
    std::fs::write(dir.path().join("bin/backend"), "").unwrap();
    let summary = cli::describe(&spec).expect("describe");
    assert!(summary.contains("mode:      packaged"), "{}", summary);
}

#[test]
fn test_probe_readiness_is_described() {
    let (_dir, config) = project_with_config(
        r#"
[backend]
port = 9001
timeoutPolicy = "leaveRunning"

[backend.readiness]
mode = "probeOrMarker"

[backend.readiness.check]
type = "http"
path = "/api/health"
successCodes = [200, 204]
"#,
    );

    let spec = cli::load_spec(Some(&config), &Overrides::default()).expect("load_spec");
    assert_eq!(spec.timeout_policy, TimeoutPolicy::LeaveRunning);
    assert!(matches!(
        spec.readiness,
        ReadinessStrategy::ProbeOrMarker {
            check: HealthCheckType::Http { .. }
        }
    ));

    let summary = cli::describe(&spec).expect("describe");
    assert!(
        summary.contains("GET http://127.0.0.1:9001/api/health -> [200, 204] or marker"),
        "{}",
        summary
    );
    assert!(summary.contains("LeaveRunning on timeout"), "{}", summary);
}
