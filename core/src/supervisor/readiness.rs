//! The startup readiness wait
//!
//! A single `select!` races the startup deadline, a poll interval that
//! rechecks readiness (and runs the probe, if any), and the process fault
//! signal. Whichever fires first decides the outcome; the other branches are
//! dropped with the race, so no timer outlives the wait.

use crate::error::StartupError;
use crate::health::Probe;
use schema::BackendState;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Counts readiness waits that armed timers
#[derive(Debug, Default)]
pub struct WaitTracker {
    active: AtomicUsize,
    armed_total: AtomicU64,
}

impl WaitTracker {
    /// Create a tracker with no recorded waits
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits currently holding timers
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits that armed timers since creation
    pub fn armed_total(&self) -> u64 {
        self.armed_total.load(Ordering::SeqCst)
    }

    fn arm(&self) -> ArmedWait<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.armed_total.fetch_add(1, Ordering::SeqCst);
        ArmedWait(self)
    }
}

struct ArmedWait<'a>(&'a WaitTracker);

impl Drop for ArmedWait<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parameters of one readiness wait
#[derive(Debug, Clone, Copy)]
pub struct WaitParams {
    /// Upper bound on the whole wait
    pub timeout: Duration,
    /// Interval between readiness rechecks
    pub poll_interval: Duration,
}

/// Wait until the backend is ready, the deadline passes, or the process fails
///
/// Returns immediately, without arming any timer, when `state` is already
/// [`BackendState::Ready`]. A passing `probe` also counts as ready; marking
/// the state is left to the caller.
///
/// # Errors
///
/// - [`StartupError::Timeout`] when the deadline passes first
/// - [`StartupError::ProcessError`] when a fault is (or already was) reported
pub async fn await_readiness(
    state: &watch::Receiver<BackendState>,
    fault: &mut watch::Receiver<Option<String>>,
    probe: Option<&(dyn Probe + Send + Sync)>,
    params: WaitParams,
    tracker: &WaitTracker,
) -> Result<(), StartupError> {
    if state.borrow().is_ready() {
        return Ok(());
    }
    if let Some(message) = fault.borrow_and_update().clone() {
        return Err(StartupError::ProcessError(message));
    }

    let _armed = tracker.arm();
    let deadline = Instant::now() + params.timeout;
    let expired = sleep_until(deadline);
    tokio::pin!(expired);

    let mut ticker = interval(params.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut fault_open = true;

    loop {
        tokio::select! {
            biased;

            changed = fault.changed(), if fault_open => {
                fault_open = take_fault(changed, fault)?;
            }
            _ = &mut expired => {
                debug!("Readiness wait expired after {:?}", params.timeout);
                return Err(StartupError::Timeout {
                    waited: params.timeout,
                });
            }
            _ = ticker.tick() => {
                if state.borrow().is_ready() {
                    return Ok(());
                }
                if let Some(probe) = probe {
                    // A probe in flight must not hide a process fault
                    tokio::select! {
                        biased;

                        changed = fault.changed(), if fault_open => {
                            fault_open = take_fault(changed, fault)?;
                        }
                        result = timeout_at(deadline, probe.check()) => match result {
                            Ok(Ok(())) => {
                                debug!("Readiness probe passed");
                                return Ok(());
                            }
                            Ok(Err(e)) => debug!("Readiness probe not passing yet: {}", e),
                            Err(_) => debug!("Readiness probe cut off by startup deadline"),
                        },
                    }
                }
            }
        }
    }
}

/// Turn a fault-channel wakeup into an error, or report whether the channel is still open
fn take_fault(
    changed: Result<(), watch::error::RecvError>,
    fault: &mut watch::Receiver<Option<String>>,
) -> Result<bool, StartupError> {
    match changed {
        Ok(()) => match fault.borrow_and_update().clone() {
            Some(message) => Err(StartupError::ProcessError(message)),
            None => Ok(true),
        },
        // The exit watcher is gone without reporting
        Err(_) => Ok(false),
    }
}
