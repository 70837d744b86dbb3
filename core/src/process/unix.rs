//! Unix process groups for safe backend cleanup
//!
//! The backend is spawned as the leader of a new session and process group
//! (via `setsid()`), so the interpreter and any workers it forks can be
//! signalled together by sending to the negative process ID.
//!
//! - SIGTERM is used for graceful termination, SIGKILL for forceful termination
//! - `ESRCH` and `EPERM` are treated as "already gone"

// setsid() in pre_exec requires unsafe
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, error};

/// Arrange for the command's child to call `setsid()` before `exec()`
pub(crate) fn new_process_group(command: &mut Command) {
    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Send SIGTERM to the process group led by `pid`
///
/// ## Example
///
/// ```rust,no_run
/// use tether_core::process::unix::signal_term_group;
///
/// signal_term_group(4242)?;
/// # Ok::<(), tether_core::CoreError>(())
/// ```
pub fn signal_term_group(pid: u32) -> Result<()> {
    signal_group(pid, Signal::SIGTERM)
}

/// Send SIGKILL to the process group led by `pid`
pub fn signal_kill_group(pid: u32) -> Result<()> {
    signal_group(pid, Signal::SIGKILL)
}

fn signal_group(pid: u32, signal: Signal) -> Result<()> {
    let raw = i32::try_from(pid)
        .map_err(|_| CoreError::ProcessSignal(format!("PID {} out of range", pid)))?;
    debug!("Sending {} to process group {}", signal, pid);

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process group {} already exited", pid);
            Ok(())
        }
        Err(nix::errno::Errno::EPERM) => {
            debug!(
                "Permission denied signaling process group {} (likely already exited)",
                pid
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process group {}: {}", signal, pid, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send {} to process group {}: {}",
                signal, pid, e
            )))
        }
    }
}
