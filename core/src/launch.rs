//! Launch-path resolution
//!
//! Turns a [`BackendSpec`] into the concrete program, arguments and
//! environment used to spawn the backend. In unpackaged (development) mode
//! the backend is an interpreter running a script; in packaged mode it is a
//! bundled executable shipped next to the launcher.

use crate::error::StartupError;
use schema::BackendSpec;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fully resolved command for spawning the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Program to execute
    pub program: PathBuf,
    /// Arguments, starting with the script path in unpackaged mode
    pub args: Vec<String>,
    /// Variables added to the inherited environment
    pub environment: HashMap<String, String>,
    /// Working directory for the process
    pub working_directory: Option<PathBuf>,
}

impl LaunchCommand {
    /// Build a command from a program and arguments with no extra environment
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            environment: HashMap::new(),
            working_directory: None,
        }
    }

    /// Render the command line for logs and diagnostics
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Directory containing the running launcher executable
pub fn default_resources_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve the launch command for the given spec
///
/// # Errors
///
/// Returns [`StartupError::MissingExecutable`] if the script (unpackaged) or
/// the bundled executable (packaged) does not exist.
pub fn resolve(spec: &BackendSpec) -> Result<LaunchCommand, StartupError> {
    let (program, mut args) = if spec.packaged {
        let resources = match &spec.resources_dir {
            Some(dir) => anchored(dir),
            None => default_resources_dir(),
        };
        let executable = resources.join(&spec.executable);
        ensure_exists(&executable)?;
        (executable, Vec::new())
    } else {
        let base = anchored(spec.base_dir.as_deref().unwrap_or(""));
        let script = base.join(&spec.script);
        ensure_exists(&script)?;
        (
            PathBuf::from(&spec.interpreter),
            vec![script.to_string_lossy().into_owned()],
        )
    };
    args.extend(spec.args.iter().cloned());

    let mut environment = spec.environment.clone();
    environment
        .entry("PYTHONUNBUFFERED".to_string())
        .or_insert_with(|| "1".to_string());

    let command = LaunchCommand {
        program,
        args,
        environment,
        working_directory: spec.working_directory.as_ref().map(PathBuf::from),
    };
    debug!("Resolved backend launch command: {}", command.display());
    Ok(command)
}

/// Join a possibly relative directory onto the launcher's working directory
///
/// The backend may run with a different working directory, so paths handed
/// to it must not depend on ours.
fn anchored(dir: &str) -> PathBuf {
    match env::current_dir() {
        Ok(cwd) => cwd.join(dir),
        Err(e) => {
            debug!("Working directory unavailable ({}); using {:?} as is", e, dir);
            PathBuf::from(dir)
        }
    }
}

fn ensure_exists(path: &Path) -> Result<(), StartupError> {
    if path.exists() {
        Ok(())
    } else {
        Err(StartupError::MissingExecutable {
            path: path.to_path_buf(),
        })
    }
}
