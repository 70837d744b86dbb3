//! Tether launcher library
//!
//! Orchestrates application startup around the backend supervisor: load the
//! configuration, start the backend, report readiness, keep it running until
//! shutdown is requested or the backend dies, then stop it.

pub mod error;

pub use error::{CliError, Result};

use schema::{BackendSpec, HealthCheckType, LogStream, ReadinessStrategy};
use std::future::Future;
use std::path::{Path, PathBuf};
use tether_core::config::{self, ConfigFile};
use tether_core::{health, launch, BackendSupervisor};
use tracing::{info, warn};

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "tether.toml";

/// Stderr lines printed after a failed start
const FAILURE_TAIL_LINES: usize = 20;

/// Command-line overrides applied on top of the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Force packaged mode
    pub packaged: bool,
    /// Replace the startup timeout
    pub timeout_ms: Option<u64>,
}

/// How a `run` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested and the backend was stopped
    Shutdown,
    /// The backend left the ready state on its own
    BackendExited,
}

/// Load the backend spec from `config` (or `tether.toml` if present) and apply overrides
pub fn load_spec(config: Option<&Path>, overrides: &Overrides) -> Result<BackendSpec> {
    let file = match config {
        Some(path) => config::load_from_toml_path(path)?,
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                config::load_from_toml_path(&default)?
            } else {
                ConfigFile::default()
            }
        }
    };

    let mut spec = file.backend;
    if overrides.packaged {
        spec.packaged = true;
    }
    if let Some(timeout_ms) = overrides.timeout_ms {
        if timeout_ms == 0 {
            return Err(CliError::InvalidArgument(
                "--timeout-ms must be greater than 0".to_string(),
            ));
        }
        spec.startup_timeout_ms = timeout_ms;
        spec.poll_interval_ms = spec.poll_interval_ms.min(timeout_ms);
    }
    config::validate_backend(&spec)?;
    Ok(spec)
}

/// Human-readable summary of how the backend will be launched
pub fn describe(spec: &BackendSpec) -> Result<String> {
    let command = launch::resolve(spec)?;
    let mut lines = vec![
        format!("command:   {}", command.display()),
        format!("mode:      {}", if spec.packaged { "packaged" } else { "development" }),
        format!("port:      {}", spec.port),
        format!("readiness: {}", describe_readiness(spec)),
        format!(
            "timeout:   {}ms (poll every {}ms, {:?} on timeout)",
            spec.startup_timeout_ms, spec.poll_interval_ms, spec.timeout_policy
        ),
    ];
    if let Some(dir) = &command.working_directory {
        lines.push(format!("cwd:       {}", dir.display()));
    }
    Ok(lines.join("\n"))
}

fn describe_readiness(spec: &BackendSpec) -> String {
    let marker = format!("marker {:?} on {:?}", spec.ready_marker, spec.ready_stream);
    match &spec.readiness {
        ReadinessStrategy::Marker => marker,
        ReadinessStrategy::Probe { check } => describe_check(check, spec.port),
        ReadinessStrategy::ProbeOrMarker { check } => {
            format!("{} or {}", describe_check(check, spec.port), marker)
        }
    }
}

fn describe_check(check: &HealthCheckType, backend_port: u16) -> String {
    let port = check.port_or(backend_port);
    match check {
        HealthCheckType::Tcp { .. } => format!("tcp connect to port {}", port),
        HealthCheckType::Http {
            path,
            success_codes,
            ..
        } => format!("GET http://{}:{}{} -> {:?}", health::PROBE_HOST, port, path, success_codes),
    }
}

/// Run the configured probe once; without a probe strategy, check the backend port
pub async fn probe_once(spec: &BackendSpec) -> Result<()> {
    let check = spec
        .readiness
        .probe()
        .cloned()
        .unwrap_or(HealthCheckType::Tcp { port: None });
    health::probe_once(&check, spec.port, spec.probe_timeout()).await?;
    Ok(())
}

/// Start the backend and keep it running until `shutdown` resolves
///
/// The backend is always stopped before returning. A start failure prints
/// the captured stderr tail before the error is returned.
pub async fn run<F>(supervisor: &mut BackendSupervisor, shutdown: F) -> Result<RunOutcome>
where
    F: Future<Output = ()>,
{
    let mut status = supervisor.status();

    if let Err(e) = supervisor.start().await {
        let tail: Vec<String> = supervisor
            .output_tail()
            .into_iter()
            .filter(|entry| entry.stream == LogStream::Stderr)
            .map(|entry| entry.content)
            .collect();
        for line in tail.iter().skip(tail.len().saturating_sub(FAILURE_TAIL_LINES)) {
            eprintln!("  backend: {}", line);
        }
        supervisor.stop();
        return Err(e.into());
    }

    match supervisor.pid() {
        Some(pid) => println!("Backend ready (pid {}) on port {}", pid, supervisor.spec().port),
        None => println!("Backend ready on port {}", supervisor.spec().port),
    }

    let outcome = tokio::select! {
        _ = shutdown => {
            info!("Shutdown requested");
            RunOutcome::Shutdown
        }
        state = status.wait_while_ready() => {
            warn!("Backend left the ready state ({:?})", state);
            RunOutcome::BackendExited
        }
    };

    supervisor.stop();
    Ok(outcome)
}

