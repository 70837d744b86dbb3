//! Platform-specific backend termination
//!
//! Stopping the backend must take its whole process tree down, not just the
//! interpreter: uvicorn with reload or workers forks children that would
//! otherwise keep the port bound.

use std::fmt::Debug;
use std::io;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Issues a termination request for a process and its descendants
///
/// Implementations do not wait for the process to exit.
pub trait Terminator: Send + Sync + Debug {
    /// Request termination of `pid` and its children
    fn terminate(&self, pid: u32) -> io::Result<()>;
}

/// Arguments passed to `taskkill` to force-kill a process tree
pub fn tree_kill_args(pid: u32) -> Vec<String> {
    vec![
        "/pid".to_string(),
        pid.to_string(),
        "/T".to_string(),
        "/F".to_string(),
    ]
}

/// Tree kill through the Windows `taskkill` utility
#[derive(Debug, Clone)]
pub struct TreeKill {
    program: String,
}

impl TreeKill {
    /// Use a different program than `taskkill`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Program invoked for termination
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for TreeKill {
    fn default() -> Self {
        Self::with_program("taskkill")
    }
}

impl Terminator for TreeKill {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        let args = tree_kill_args(pid);
        debug!("Running {} {}", self.program, args.join(" "));

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            // CREATE_NO_WINDOW
            cmd.creation_flags(0x0800_0000);
        }

        let mut child = cmd.spawn()?;
        // Reap in the background so stop() stays non-blocking
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

/// SIGTERM to the backend's process group
///
/// The backend is spawned as a group leader, so signalling the group reaches
/// every process it forked.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalGroup;

impl Terminator for SignalGroup {
    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> io::Result<()> {
        crate::process::unix::signal_term_group(pid).map_err(io::Error::other)
    }

    #[cfg(not(unix))]
    fn terminate(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process groups are not available on this platform",
        ))
    }
}

/// The terminator appropriate for the host platform
pub fn platform_terminator() -> Arc<dyn Terminator> {
    if cfg!(windows) {
        Arc::new(TreeKill::default())
    } else {
        Arc::new(SignalGroup)
    }
}

/// Terminator that records requests instead of signalling anything
#[derive(Debug, Clone, Default)]
pub struct MockTerminator {
    requests: Arc<Mutex<Vec<u32>>>,
    fail: bool,
}

impl MockTerminator {
    /// Create a recording terminator
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a terminator whose requests all fail (they are still recorded)
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// PIDs termination was requested for, in order
    pub fn requests(&self) -> Vec<u32> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Terminator for MockTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        match self.requests.lock() {
            Ok(mut r) => r.push(pid),
            Err(poisoned) => poisoned.into_inner().push(pid),
        }
        if self.fail {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("refusing to terminate {}", pid),
            ));
        }
        Ok(())
    }
}
