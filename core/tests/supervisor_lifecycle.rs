//! Lifecycle tests for the backend supervisor using the scripted mock adapter
//!
//! Timing assertions run on tokio's paused clock, so offsets are exact and
//! the 30 second default timeout costs nothing.

use schema::{BackendEvent, BackendSpec, BackendState, HealthCheckType, ReadinessStrategy};
use schema::{ReadyStream, TimeoutPolicy};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tether_core::supervisor::{MockInstruction, MockProcessAdapter, MockTerminator};
use tether_core::{BackendSupervisor, StartupError, StartupErrorKind, SupervisorConfig};
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

const READY_LINE: &str = "INFO:     Application startup complete.\n";

struct Harness {
    supervisor: BackendSupervisor,
    adapter: MockProcessAdapter,
    terminator: MockTerminator,
    events: broadcast::Receiver<BackendEvent>,
    _dir: TempDir,
}

/// Temp directory containing `backend/main.py` so launch resolution succeeds
fn backend_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("backend")).unwrap();
    std::fs::write(dir.path().join("backend/main.py"), "# backend").unwrap();
    dir
}

fn harness_with(configure: impl FnOnce(&mut BackendSpec), instructions: Vec<MockInstruction>) -> Harness {
    let dir = backend_dir();
    let mut spec = BackendSpec {
        base_dir: Some(dir.path().to_string_lossy().into_owned()),
        ..BackendSpec::default()
    };
    configure(&mut spec);

    let adapter = MockProcessAdapter::with_instructions(instructions);
    let terminator = MockTerminator::new();
    let (event_tx, events) = broadcast::channel(256);
    let supervisor = BackendSupervisor::new(SupervisorConfig {
        spec,
        process_adapter: Arc::new(adapter.clone()),
        terminator: Arc::new(terminator.clone()),
        event_tx,
    });

    Harness {
        supervisor,
        adapter,
        terminator,
        events,
        _dir: dir,
    }
}

fn harness(instructions: Vec<MockInstruction>) -> Harness {
    harness_with(|_| {}, instructions)
}

fn drain(events: &mut broadcast::Receiver<BackendEvent>) -> Vec<BackendEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn marker_makes_backend_ready_and_clean_exit_stops_it() {
    let mut h = harness(vec![MockInstruction::new()
        .stdout_at(200, READY_LINE)
        .exit_at(5_000, 0)]);
    let mut status = h.supervisor.status();
    assert!(!status.is_running());

    let probe_status = status.clone();
    let (started, running_at_250) = tokio::join!(h.supervisor.start(), async {
        sleep(Duration::from_millis(250)).await;
        probe_status.is_running()
    });
    started.expect("backend should start");
    assert!(running_at_250, "marker at 200ms should be visible by 250ms");
    assert!(h.supervisor.is_running());
    assert_eq!(h.supervisor.state(), BackendState::Ready);

    assert_eq!(status.wait_while_ready().await, BackendState::Stopped);
    assert!(!h.supervisor.is_running());
    assert_eq!(h.supervisor.pid(), None);

    let events = drain(&mut h.events);
    assert!(matches!(events.first(), Some(BackendEvent::ProcessStarted { .. })));
    assert!(events.iter().any(|e| matches!(e, BackendEvent::Ready { .. })));
    match events.last() {
        Some(BackendEvent::Exited { exit, was_ready }) => {
            assert!(exit.is_success());
            assert!(*was_ready);
        }
        other => panic!("expected Exited last, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn marker_split_across_chunks_is_detected() {
    let mut h = harness(vec![MockInstruction::new()
        .stdout_at(100, "INFO:     Applica")
        .stdout_at(150, "tion startup complete.\n")]);

    h.supervisor.start().await.expect("split marker should be detected");
    assert!(h.supervisor.is_running());
    let tail: Vec<String> = h
        .supervisor
        .output_tail()
        .into_iter()
        .map(|e| e.content)
        .collect();
    assert_eq!(tail, vec!["INFO:     Application startup complete."]);
}

#[tokio::test(start_paused = true)]
async fn start_resolves_on_first_poll_after_marker() {
    let mut h = harness(vec![MockInstruction::new().stdout_at(700, READY_LINE)]);

    let started = Instant::now();
    h.supervisor.start().await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1_000));
    assert!(elapsed < Duration::from_millis(1_100));
}

#[tokio::test(start_paused = true)]
async fn status_reflects_crash_after_ready() {
    let mut h = harness(vec![MockInstruction::new()
        .stdout_at(100, READY_LINE)
        .exit_at(800, 1)]);
    let mut status = h.supervisor.status();

    h.supervisor.start().await.unwrap();
    assert!(status.is_running());

    assert_eq!(status.wait_while_ready().await, BackendState::Stopped);
    assert!(!h.supervisor.is_running());
    assert!(h.terminator.requests().is_empty());

    let exited = drain(&mut h.events)
        .into_iter()
        .find_map(|e| match e {
            BackendEvent::Exited { exit, was_ready } => Some((exit, was_ready)),
            _ => None,
        })
        .expect("exit event");
    assert_eq!(exited.0.exit_code, Some(1));
    assert!(exited.1);
}

#[tokio::test(start_paused = true)]
async fn exit_before_marker_short_circuits_wait() {
    let mut h = harness(vec![MockInstruction::new()
        .stderr_at(50, "Traceback (most recent call last):\n")
        .stderr_at(60, "ModuleNotFoundError: No module named 'uvicorn'\n")
        .exit_at(100, 1)]);

    let started = Instant::now();
    let err = h.supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::ProcessError);
    assert!(err.to_string().contains("exit code 1"), "{}", err);
    assert!(started.elapsed() < Duration::from_secs(1));

    let waits = h.supervisor.wait_tracker();
    assert_eq!(waits.active(), 0);
    assert_eq!(h.supervisor.state(), BackendState::Stopped);
    // Already exited: nothing to terminate
    assert!(h.terminator.requests().is_empty());

    let tail: Vec<String> = h
        .supervisor
        .output_tail()
        .into_iter()
        .map(|e| e.content)
        .collect();
    assert!(tail.contains(&"ModuleNotFoundError: No module named 'uvicorn'".to_string()));

    let failed = drain(&mut h.events).into_iter().find_map(|e| match e {
        BackendEvent::StartFailed { kind, .. } => Some(kind),
        _ => None,
    });
    assert_eq!(failed.as_deref(), Some("processError"));
}

#[tokio::test(start_paused = true)]
async fn wait_failure_is_process_error() {
    let mut h = harness(vec![MockInstruction::new().wait_error_at(300, "wait4 failed")]);

    let err = h.supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::ProcessError);
    assert!(err.to_string().contains("wait4 failed"));
    assert_eq!(h.supervisor.state(), BackendState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn spawn_failure_is_process_error() {
    let mut h = harness(vec![MockInstruction::spawn_failure("permission denied")]);

    let err = h.supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::ProcessError);
    assert_eq!(err.code(), "START003");
    assert_eq!(h.supervisor.state(), BackendState::Stopped);
    assert_eq!(h.supervisor.wait_tracker().armed_total(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_once_and_kills_by_default() {
    let mut h = harness_with(
        |spec| spec.startup_timeout_ms = 2_000,
        vec![MockInstruction::new().stdout_at(100, "INFO:     Started server process\n")],
    );

    let started = Instant::now();
    let err = h.supervisor.start().await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(2_000));
    match err {
        StartupError::Timeout { waited } => assert_eq!(waited, Duration::from_millis(2_000)),
        other => panic!("expected timeout, got {:?}", other),
    }

    let waits = h.supervisor.wait_tracker();
    assert_eq!(waits.armed_total(), 1);
    assert_eq!(waits.active(), 0);

    let spawned_pid = match drain(&mut h.events).first() {
        Some(BackendEvent::ProcessStarted { pid, .. }) => *pid,
        other => panic!("expected ProcessStarted, got {:?}", other),
    };
    assert_eq!(h.terminator.requests(), vec![spawned_pid]);
    assert_eq!(h.supervisor.state(), BackendState::Stopped);
    assert_eq!(h.supervisor.pid(), None);
}

#[tokio::test(start_paused = true)]
async fn timeout_can_leave_process_running() {
    let mut h = harness_with(
        |spec| {
            spec.startup_timeout_ms = 1_000;
            spec.timeout_policy = TimeoutPolicy::LeaveRunning;
        },
        vec![MockInstruction::new()],
    );

    let err = h.supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::Timeout);
    assert!(h.terminator.requests().is_empty());

    let pid = h.supervisor.pid().expect("process stays owned");
    assert!(!h.supervisor.is_running());

    h.supervisor.stop();
    assert_eq!(h.terminator.requests(), vec![pid]);
    assert_eq!(h.supervisor.pid(), None);
}

#[tokio::test(start_paused = true)]
async fn start_replaces_process_that_is_not_ready() {
    let mut h = harness_with(
        |spec| {
            spec.startup_timeout_ms = 1_000;
            spec.timeout_policy = TimeoutPolicy::LeaveRunning;
        },
        vec![
            MockInstruction::new(),
            MockInstruction::new().stdout_at(100, READY_LINE),
        ],
    );

    h.supervisor.start().await.unwrap_err();
    let stale_pid = h.supervisor.pid().unwrap();

    h.supervisor.start().await.expect("second attempt should succeed");
    assert_eq!(h.terminator.requests(), vec![stale_pid]);
    assert_ne!(h.supervisor.pid(), Some(stale_pid));
    assert!(h.supervisor.is_running());
}

#[tokio::test(start_paused = true)]
async fn start_when_ready_returns_without_waiting() {
    let mut h = harness(vec![MockInstruction::new().stdout_at(100, READY_LINE)]);
    h.supervisor.start().await.unwrap();

    let armed = h.supervisor.wait_tracker().armed_total();
    let started = Instant::now();
    h.supervisor.start().await.unwrap();
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(h.supervisor.wait_tracker().armed_total(), armed);
    assert_eq!(h.adapter.spawned_commands().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let mut h = harness(vec![MockInstruction::new().stdout_at(100, READY_LINE)]);

    // before start
    h.supervisor.stop();

    h.supervisor.start().await.unwrap();
    let pid = h.supervisor.pid().unwrap();
    h.supervisor.stop();
    h.supervisor.stop();

    assert_eq!(h.terminator.requests(), vec![pid]);
    assert!(!h.supervisor.is_running());
    let stops = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, BackendEvent::StopRequested { .. }))
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test(start_paused = true)]
async fn termination_failure_is_not_surfaced() {
    let dir = backend_dir();
    let terminator = MockTerminator::failing();
    let mut supervisor = BackendSupervisor::new(SupervisorConfig {
        spec: BackendSpec {
            base_dir: Some(dir.path().to_string_lossy().into_owned()),
            ..BackendSpec::default()
        },
        process_adapter: Arc::new(MockProcessAdapter::with_instructions(vec![
            MockInstruction::new().stdout_at(10, READY_LINE),
        ])),
        terminator: Arc::new(terminator.clone()),
        event_tx: broadcast::channel(16).0,
    });

    supervisor.start().await.unwrap();
    supervisor.stop();
    assert_eq!(terminator.requests().len(), 1);
    assert_eq!(supervisor.state(), BackendState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn dropping_supervisor_terminates_backend() {
    let h = harness(vec![MockInstruction::new().stdout_at(10, READY_LINE)]);
    let Harness {
        mut supervisor,
        terminator,
        ..
    } = h;

    supervisor.start().await.unwrap();
    let pid = supervisor.pid().unwrap();
    let status = supervisor.status();
    drop(supervisor);

    assert_eq!(terminator.requests(), vec![pid]);
    assert!(!status.is_running());
}

#[tokio::test(start_paused = true)]
async fn invalid_spec_fails_without_spawning() {
    let mut h = harness_with(
        |spec| spec.poll_interval_ms = 0,
        vec![MockInstruction::new().stdout_at(10, READY_LINE)],
    );

    let err = h.supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::ProcessError);
    assert!(err.to_string().contains("backend.pollIntervalMs"), "{}", err);
    assert!(h.adapter.spawned_commands().await.is_empty());
    assert_eq!(h.supervisor.state(), BackendState::Stopped);
    assert!(matches!(
        drain(&mut h.events).as_slice(),
        [BackendEvent::StartFailed { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn missing_script_fails_without_spawning() {
    let mut h = harness_with(
        |spec| spec.script = "backend/missing.py".to_string(),
        vec![MockInstruction::new().stdout_at(10, READY_LINE)],
    );

    let err = h.supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::MissingExecutable);
    assert!(err.to_string().contains("missing.py"));
    assert!(h.adapter.spawned_commands().await.is_empty());
    assert_eq!(h.supervisor.state(), BackendState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stderr_marker_ignored_unless_configured() {
    let mut h = harness_with(
        |spec| spec.startup_timeout_ms = 1_000,
        vec![MockInstruction::new().stderr_at(100, READY_LINE)],
    );
    let err = h.supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::Timeout);

    let mut h = harness_with(
        |spec| {
            spec.startup_timeout_ms = 1_000;
            spec.ready_stream = ReadyStream::Both;
        },
        vec![MockInstruction::new().stderr_at(100, READY_LINE)],
    );
    h.supervisor.start().await.expect("stderr marker accepted");
}

#[tokio::test(start_paused = true)]
async fn launch_command_uses_interpreter_and_script() {
    let mut h = harness(vec![MockInstruction::new().stdout_at(10, READY_LINE)]);
    h.supervisor.start().await.unwrap();

    let commands = h.adapter.spawned_commands().await;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].program, std::path::PathBuf::from(&h.supervisor.spec().interpreter));
    assert!(commands[0].args[0].ends_with("main.py"));
    assert_eq!(
        commands[0].environment.get("PYTHONUNBUFFERED").map(String::as_str),
        Some("1")
    );
}

#[tokio::test]
async fn probe_strategy_ready_without_marker() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut h = harness_with(
        |spec| {
            spec.poll_interval_ms = 50;
            spec.startup_timeout_ms = 5_000;
            spec.readiness = ReadinessStrategy::Probe {
                check: HealthCheckType::Tcp { port: Some(port) },
            };
        },
        vec![MockInstruction::new()],
    );

    h.supervisor.start().await.expect("probe should pass");
    assert!(h.supervisor.is_running());
}

#[tokio::test]
async fn probe_strategy_does_not_accept_marker() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);

    let mut h = harness_with(
        |spec| {
            spec.port = port;
            spec.poll_interval_ms = 50;
            spec.startup_timeout_ms = 600;
            spec.probe_timeout_ms = 200;
            spec.readiness = ReadinessStrategy::Probe {
                check: HealthCheckType::Tcp { port: None },
            };
        },
        vec![MockInstruction::new().stdout_at(10, READY_LINE)],
    );

    let err = h.supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::Timeout);
}

#[tokio::test]
async fn probe_or_marker_accepts_marker() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);

    let mut h = harness_with(
        |spec| {
            spec.port = port;
            spec.poll_interval_ms = 50;
            spec.startup_timeout_ms = 5_000;
            spec.probe_timeout_ms = 200;
            spec.readiness = ReadinessStrategy::ProbeOrMarker {
                check: HealthCheckType::Tcp { port: None },
            };
        },
        vec![MockInstruction::new().stdout_at(100, READY_LINE)],
    );

    h.supervisor.start().await.expect("marker fallback should work");
    assert!(h.supervisor.is_running());
}

#[tokio::test]
async fn tcp_check_waits_for_backend_port() {
    let port = {
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        reserved.local_addr().unwrap().port()
    };

    let mut h = harness_with(
        |spec| {
            spec.port = port;
            spec.poll_interval_ms = 50;
            spec.startup_timeout_ms = 5_000;
            spec.probe_timeout_ms = 200;
            spec.readiness = ReadinessStrategy::Probe {
                check: HealthCheckType::Tcp { port: None },
            };
        },
        vec![MockInstruction::new()],
    );

    let bind_later = tokio::spawn(async move {
        sleep(Duration::from_millis(300)).await;
        tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap()
    });

    let started = Instant::now();
    h.supervisor.start().await.expect("port should open in time");
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(h.supervisor.is_running());
    drop(bind_later.await.unwrap());
}
