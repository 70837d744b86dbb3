//! Process management utilities
//!
//! Spawns the backend with piped output streams. Platform-specific pieces
//! live in submodules:
//!
//! - **Unix**: the child is placed in its own process group via `setsid()` so
//!   the whole tree can be signalled at once
//! - **Windows**: the child is created without a console window; tree
//!   termination goes through `taskkill` (see `supervisor::terminate`)

#[cfg(unix)]
pub mod unix;

use crate::launch::LaunchCommand;
use crate::{CoreError, Result};
use schema::{BackendEvent, ProcessExit};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, error};

/// A spawned backend process with piped stdout/stderr
#[derive(Debug)]
pub struct ChildProcess {
    pid: u32,
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the process to exit and return its exit status (async)
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Take the stdout handle for async reading, if available
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the stderr handle for async reading, if available
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }
}

/// Spawn the backend described by `command`
///
/// Standard output and standard error are piped; standard input is closed.
/// On Unix the child becomes the leader of a new process group.
///
/// ## Example
///
/// ```rust,no_run
/// use tether_core::launch::LaunchCommand;
/// use tether_core::process::spawn;
///
/// # async fn example() -> tether_core::Result<()> {
/// let command = LaunchCommand::new("python3", vec!["backend/main.py".to_string()]);
/// let child = spawn(&command)?;
/// println!("Spawned backend with PID: {}", child.pid());
/// # Ok(())
/// # }
/// ```
pub fn spawn(command: &LaunchCommand) -> Result<ChildProcess> {
    debug!("Spawning process: {}", command.display());

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(&command.environment)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &command.working_directory {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    unix::new_process_group(&mut cmd);

    #[cfg(windows)]
    {
        // CREATE_NO_WINDOW
        cmd.creation_flags(0x0800_0000);
    }

    let child = cmd.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", command.program.display(), e);
        CoreError::ProcessSpawn(format!(
            "Failed to spawn '{}': {}",
            command.program.display(),
            e
        ))
    })?;

    let pid = child
        .id()
        .ok_or_else(|| CoreError::ProcessSpawn("Spawned child did not have a PID".to_string()))?;
    debug!("Successfully spawned process {}", pid);

    Ok(ChildProcess { pid, child })
}

/// Convert an OS exit status into a [`ProcessExit`]
pub fn exit_info(pid: u32, status: ExitStatus) -> ProcessExit {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ProcessExit {
        pid,
        exit_code: status.code(),
        signal,
        timestamp: BackendEvent::current_timestamp(),
    }
}
