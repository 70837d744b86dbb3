//! Configuration loading and validation for the backend launcher
//!
//! A TOML file carries a single `[backend]` table that deserializes into
//! `schema::BackendSpec`. Every field has a serde default, so an empty file
//! (or a missing `[backend]` table) describes the stock development setup.
//! Validation is strict and reports field-path error messages.

use crate::{CoreError, Result};
use schema::{BackendSpec, HealthCheckType, ReadinessStrategy};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Top-level TOML structure of a launcher config file
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// The supervised backend
    #[serde(default)]
    pub backend: BackendSpec,
}

impl ConfigFile {
    /// Validate the configuration and return `Result<()>` with field-path errors
    pub fn validate(&self) -> Result<()> {
        validate_backend(&self.backend)
    }
}

/// Validate a backend specification
pub fn validate_backend(spec: &BackendSpec) -> Result<()> {
    if spec.packaged {
        if spec.executable.trim().is_empty() {
            return invalid("backend.executable: cannot be empty when packaged");
        }
    } else {
        if spec.interpreter.trim().is_empty() {
            return invalid("backend.interpreter: cannot be empty");
        }
        if spec.script.trim().is_empty() {
            return invalid("backend.script: cannot be empty");
        }
    }

    if spec.port == 0 {
        return invalid("backend.port: must be 1..=65535");
    }
    if spec.ready_marker.is_empty() && spec.readiness.accepts_marker() {
        return invalid("backend.readyMarker: cannot be empty");
    }

    // timeouts
    if spec.startup_timeout_ms == 0 {
        return invalid("backend.startupTimeoutMs: must be > 0");
    }
    if spec.poll_interval_ms == 0 {
        return invalid("backend.pollIntervalMs: must be > 0");
    }
    if spec.poll_interval_ms > spec.startup_timeout_ms {
        return invalid("backend.pollIntervalMs: must not exceed startupTimeoutMs");
    }
    if spec.tail_capacity == 0 {
        return invalid("backend.tailCapacity: must be > 0");
    }

    for key in spec.environment.keys() {
        if key.trim().is_empty() {
            return invalid("backend.environment: keys cannot be empty");
        }
    }

    if let Some(check) = spec.readiness.probe() {
        let field = match spec.readiness {
            ReadinessStrategy::ProbeOrMarker { .. } => "probeOrMarker",
            _ => "probe",
        };
        validate_probe(field, check, spec.probe_timeout_ms)?;
    }

    Ok(())
}

fn validate_probe(field: &str, check: &HealthCheckType, probe_timeout_ms: u64) -> Result<()> {
    if probe_timeout_ms == 0 {
        return invalid("backend.probeTimeoutMs: must be > 0");
    }

    match check {
        HealthCheckType::Tcp { port } => {
            if *port == Some(0) {
                return Err(CoreError::ValidationError(format!(
                    "backend.readiness[{}].check[Tcp].port: must be 1..=65535",
                    field
                )));
            }
        }
        HealthCheckType::Http {
            port,
            path,
            success_codes,
            ..
        } => {
            if *port == Some(0) {
                return Err(CoreError::ValidationError(format!(
                    "backend.readiness[{}].check[Http].port: must be 1..=65535",
                    field
                )));
            }
            if !path.starts_with('/') {
                return Err(CoreError::ValidationError(format!(
                    "backend.readiness[{}].check[Http].path: must start with '/'",
                    field
                )));
            }
            if let Some(code) = success_codes.iter().find(|c| !(100..=599).contains(*c)) {
                return Err(CoreError::ValidationError(format!(
                    "backend.readiness[{}].check[Http].successCodes: {} is not an HTTP status",
                    field, code
                )));
            }
        }
    }
    Ok(())
}

fn invalid(message: &str) -> Result<()> {
    Err(CoreError::ValidationError(message.to_string()))
}

/// Load the launcher config from a TOML string
pub fn load_from_toml_str(input: &str) -> Result<ConfigFile> {
    let cfg: ConfigFile = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load the launcher config from a TOML file path
///
/// `baseDir` is anchored at the directory containing the config file: it
/// defaults to that directory, and a relative `baseDir` is joined onto it.
/// The result is absolute so scripts resolve the same way whatever the
/// backend's working directory is.
pub fn load_from_toml_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path, e))
    })?;
    let mut cfg = load_from_toml_str(&data)?;

    let config_dir = env::current_dir()?.join(path.parent().unwrap_or_else(|| Path::new("")));
    let base_dir = match cfg.backend.base_dir.as_deref() {
        Some(base) => config_dir.join(base),
        None => config_dir,
    };
    cfg.backend.base_dir = Some(base_dir.to_string_lossy().into_owned());

    debug!("Loaded backend config from {:?}", path);
    Ok(cfg)
}
