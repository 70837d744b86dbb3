//! Backend process supervisor
//!
//! Owns the lifecycle of one external backend process: spawn it, wait until
//! it reports readiness, notice when it dies, and tear it down.
//!
//! ```text
//! Stopped → Starting → Ready → Stopped
//!              └──────────────→ Stopped   (timeout / process error)
//! ```
//!
//! ## Components
//!
//! - [`BackendSupervisor`]: control interface (`start`, `stop`, queries)
//! - [`StatusHandle`]: cloneable read-only view of the backend state
//! - [`ProcessAdapter`]: trait for abstracting process spawning
//! - [`Terminator`]: platform-specific tree termination
//!
//! Background tasks (one reader per output stream plus an exit watcher)
//! belong to the current process. They write state only through
//! the shared state cell, tagged with the generation they were started under, so
//! a task outliving its process can never overwrite newer state.

use crate::config;
use crate::error::StartupError;
use crate::health;
use crate::launch;
use crate::logging::{LogEntry, LogRing};
use schema::{BackendEvent, BackendSpec, BackendState, LogStream, ReadyStream, TimeoutPolicy};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub mod adapters;
pub mod output;
pub mod readiness;
pub mod terminate;

pub use adapters::*;
pub use output::{MarkerScanner, OutputObserver};
pub use readiness::{await_readiness, WaitParams, WaitTracker};
pub use terminate::*;

/// Capacity of the event broadcast channel created by [`BackendSupervisor::with_defaults`]
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Backend state plus the generation that owns it
#[derive(Debug)]
pub(crate) struct SharedState {
    tx: watch::Sender<BackendState>,
    generation: AtomicU64,
}

impl SharedState {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(BackendState::Stopped);
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    fn subscribe(&self) -> watch::Receiver<BackendState> {
        self.tx.subscribe()
    }

    #[cfg(test)]
    fn current(&self) -> BackendState {
        *self.tx.borrow()
    }

    /// Start a new generation in state `to`, invalidating older writers
    fn advance(&self, to: BackendState) -> u64 {
        let mut next = 0;
        self.tx.send_if_modified(|state| {
            next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let changed = *state != to;
            *state = to;
            changed
        });
        next
    }

    /// `Starting → Ready`, if `generation` is still current
    pub(crate) fn mark_ready(&self, generation: u64) -> bool {
        self.tx.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation
                || *state != BackendState::Starting
            {
                return false;
            }
            *state = BackendState::Ready;
            true
        })
    }

    /// Move to `Stopped` after the process exited, returning the prior state
    ///
    /// Returns `None` when `generation` is stale.
    pub(crate) fn mark_exited(&self, generation: u64) -> Option<BackendState> {
        let mut previous = None;
        self.tx.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            previous = Some(*state);
            let changed = *state != BackendState::Stopped;
            *state = BackendState::Stopped;
            changed
        });
        previous
    }
}

/// Cloneable read-only view of the backend state
///
/// Hand this to whatever needs to know whether the backend can serve
/// requests instead of sharing the supervisor itself.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<BackendState>,
}

impl StatusHandle {
    /// Whether the backend is ready to handle requests
    pub fn is_running(&self) -> bool {
        self.rx.borrow().is_ready()
    }

    /// Current backend state
    pub fn state(&self) -> BackendState {
        *self.rx.borrow()
    }

    /// Wait for the next state change
    ///
    /// Returns `None` once the supervisor has been dropped.
    pub async fn changed(&mut self) -> Option<BackendState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Wait until the backend is no longer ready
    ///
    /// Resolves with the new state, or [`BackendState::Stopped`] if the
    /// supervisor is dropped.
    pub async fn wait_while_ready(&mut self) -> BackendState {
        match self.rx.wait_for(|state| !state.is_ready()).await {
            Ok(state) => *state,
            Err(_) => BackendState::Stopped,
        }
    }
}

/// Configuration for creating a supervisor
pub struct SupervisorConfig {
    /// Backend specification
    pub spec: BackendSpec,
    /// Process adapter for spawning processes
    pub process_adapter: Arc<dyn ProcessAdapter>,
    /// Terminator used by `stop`
    pub terminator: Arc<dyn Terminator>,
    /// Event broadcaster for emitting backend events
    pub event_tx: broadcast::Sender<BackendEvent>,
}

/// The live process owned by the supervisor
struct ProcessHandle {
    pid: u32,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Supervisor for a single backend process
pub struct BackendSupervisor {
    spec: BackendSpec,
    adapter: Arc<dyn ProcessAdapter>,
    terminator: Arc<dyn Terminator>,
    shared: Arc<SharedState>,
    state_rx: watch::Receiver<BackendState>,
    event_tx: broadcast::Sender<BackendEvent>,
    waits: Arc<WaitTracker>,
    handle: Option<ProcessHandle>,
    /// Output of the current (or most recent) process
    tail: Arc<Mutex<LogRing>>,
}

impl std::fmt::Debug for BackendSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSupervisor")
            .field("state", &self.state())
            .field("pid", &self.pid())
            .field("terminator", &self.terminator)
            .finish_non_exhaustive()
    }
}

impl BackendSupervisor {
    /// Create a supervisor; nothing is spawned until [`start`](Self::start)
    pub fn new(config: SupervisorConfig) -> Self {
        let SupervisorConfig {
            spec,
            process_adapter,
            terminator,
            event_tx,
        } = config;

        let shared = Arc::new(SharedState::new());
        let state_rx = shared.subscribe();
        let tail = Arc::new(Mutex::new(LogRing::new(spec.tail_capacity)));

        Self {
            spec,
            adapter: process_adapter,
            terminator,
            shared,
            state_rx,
            event_tx,
            waits: Arc::new(WaitTracker::new()),
            handle: None,
            tail,
        }
    }

    /// Create a supervisor spawning real processes with the platform terminator
    pub fn with_defaults(spec: BackendSpec) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::new(SupervisorConfig {
            spec,
            process_adapter: Arc::new(TokioProcessAdapter::new()),
            terminator: terminate::platform_terminator(),
            event_tx,
        })
    }

    /// The backend specification
    pub fn spec(&self) -> &BackendSpec {
        &self.spec
    }

    /// Whether the backend is ready to handle requests
    pub fn is_running(&self) -> bool {
        self.state_rx.borrow().is_ready()
    }

    /// Current backend state
    pub fn state(&self) -> BackendState {
        *self.state_rx.borrow()
    }

    /// Read-only status view for other components
    pub fn status(&self) -> StatusHandle {
        StatusHandle {
            rx: self.shared.subscribe(),
        }
    }

    /// Subscribe to backend events
    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.event_tx.subscribe()
    }

    /// PID of the owned process while it is alive
    pub fn pid(&self) -> Option<u32> {
        self.handle
            .as_ref()
            .filter(|h| h.alive.load(Ordering::SeqCst))
            .map(|h| h.pid)
    }

    /// Retained output lines of the current or most recent process
    pub fn output_tail(&self) -> Vec<LogEntry> {
        match self.tail.lock() {
            Ok(ring) => ring.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        }
    }

    /// Readiness wait gauge
    pub fn wait_tracker(&self) -> Arc<WaitTracker> {
        self.waits.clone()
    }

    /// Launch the backend and wait until it is ready
    ///
    /// Resolves immediately if the owned backend is already ready; a process
    /// that is owned but not ready is stopped and replaced.
    ///
    /// # Errors
    ///
    /// - [`StartupError::MissingExecutable`] if the script or executable is missing
    /// - [`StartupError::Timeout`] if readiness is not seen within the startup
    ///   window; the process is then killed or left running per the timeout policy
    /// - [`StartupError::ProcessError`] if the spec fails validation, spawning
    ///   fails, or the process exits or fails before becoming ready
    pub async fn start(&mut self) -> Result<(), StartupError> {
        if self.handle.is_some() {
            if self.is_running() {
                debug!("Backend already ready; start() is a no-op");
                return Ok(());
            }
            info!("Replacing backend process that is not ready");
            self.stop();
        }

        if let Err(e) = config::validate_backend(&self.spec) {
            return Err(self.fail(e.into()));
        }

        let command = match launch::resolve(&self.spec) {
            Ok(command) => command,
            Err(e) => return Err(self.fail(e)),
        };

        let generation = self.shared.advance(BackendState::Starting);
        info!("Starting backend: {}", command.display());

        let mut process = match self.adapter.spawn(&command).await {
            Ok(process) => process,
            Err(e) => {
                error!("Failed to spawn backend: {}", e);
                self.shared.advance(BackendState::Stopped);
                return Err(self.fail(e.into()));
            }
        };
        let pid = process.pid();
        let started_at = Instant::now();

        self.emit(BackendEvent::ProcessStarted {
            pid,
            command: command.program.display().to_string(),
            args: command.args.clone(),
            timestamp: BackendEvent::current_timestamp(),
        });

        let ring = Arc::new(Mutex::new(LogRing::new(self.spec.tail_capacity)));
        self.tail = ring.clone();

        let (fault_tx, mut fault_rx) = watch::channel(None);
        let alive = Arc::new(AtomicBool::new(true));
        let mut tasks = Vec::with_capacity(3);

        let reader = |scan: bool| output::ReaderContext {
            pid,
            generation,
            shared: self.shared.clone(),
            ring: ring.clone(),
            event_tx: self.event_tx.clone(),
            scanner: scan.then(|| MarkerScanner::new(&self.spec.ready_marker)),
            marker_sets_ready: self.spec.readiness.accepts_marker(),
        };
        if let Some(stdout) = process.take_stdout() {
            tasks.push(output::spawn_stream_reader(
                reader(true),
                stdout,
                LogStream::Stdout,
            ));
        }
        if let Some(stderr) = process.take_stderr() {
            let scan = self.spec.ready_stream == ReadyStream::Both;
            tasks.push(output::spawn_stream_reader(
                reader(scan),
                stderr,
                LogStream::Stderr,
            ));
        }
        tasks.push(spawn_exit_watcher(
            process,
            ExitWatch {
                generation,
                shared: self.shared.clone(),
                alive: alive.clone(),
                fault_tx,
                event_tx: self.event_tx.clone(),
            },
        ));

        self.handle = Some(ProcessHandle { pid, alive, tasks });

        let probe = self.spec.readiness.probe().map(|check| {
            health::create_probe(check, self.spec.port, self.spec.probe_timeout())
        });
        let params = WaitParams {
            timeout: self.spec.startup_timeout(),
            poll_interval: self.spec.poll_interval(),
        };

        let outcome = await_readiness(
            &self.state_rx,
            &mut fault_rx,
            probe.as_deref(),
            params,
            &self.waits,
        )
        .await;

        let outcome = outcome.and_then(|()| {
            if self.shared.mark_ready(generation) || self.is_running() {
                Ok(())
            } else {
                Err(StartupError::ProcessError(
                    "backend exited before becoming ready".to_string(),
                ))
            }
        });

        match outcome {
            Ok(()) => {
                let elapsed = started_at.elapsed();
                info!("Backend process {} ready after {:?}", pid, elapsed);
                self.emit(BackendEvent::Ready {
                    pid,
                    elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    timestamp: BackendEvent::current_timestamp(),
                });
                Ok(())
            }
            Err(err @ StartupError::Timeout { .. }) => {
                match self.spec.timeout_policy {
                    TimeoutPolicy::Kill => {
                        warn!("Backend process {} not ready in time; killing it", pid);
                        self.stop();
                    }
                    TimeoutPolicy::LeaveRunning => {
                        warn!("Backend process {} not ready in time; leaving it running", pid);
                    }
                }
                Err(self.fail(err))
            }
            Err(err) => {
                self.stop();
                Err(self.fail(err))
            }
        }
    }

    /// Terminate the backend process, if any
    ///
    /// Does not wait for the process to exit. Termination failures are logged
    /// and otherwise ignored. Calling `stop` without a process is a no-op.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            debug!("No backend process to stop");
            return;
        };

        for task in &handle.tasks {
            task.abort();
        }

        if handle.alive.load(Ordering::SeqCst) {
            info!("Stopping backend process {}", handle.pid);
            if let Err(e) = self.terminator.terminate(handle.pid) {
                warn!("Failed to terminate backend process {}: {}", handle.pid, e);
            }
            self.emit(BackendEvent::StopRequested {
                pid: handle.pid,
                timestamp: BackendEvent::current_timestamp(),
            });
        } else {
            debug!("Backend process {} already exited", handle.pid);
        }

        self.shared.advance(BackendState::Stopped);
    }

    fn fail(&self, err: StartupError) -> StartupError {
        warn!("Backend failed to start [{}]: {}", err.code(), err);
        self.emit(BackendEvent::StartFailed {
            kind: err.kind().as_str().to_string(),
            message: err.to_string(),
            timestamp: BackendEvent::current_timestamp(),
        });
        err
    }

    fn emit(&self, event: BackendEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

impl Drop for BackendSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ExitWatch {
    generation: u64,
    shared: Arc<SharedState>,
    alive: Arc<AtomicBool>,
    fault_tx: watch::Sender<Option<String>>,
    event_tx: broadcast::Sender<BackendEvent>,
}

fn spawn_exit_watcher(mut process: Box<dyn ManagedProcess>, ctx: ExitWatch) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pid = process.pid();
        let result = process.wait().await;
        ctx.alive.store(false, Ordering::SeqCst);
        let was_ready = ctx.shared.mark_exited(ctx.generation) == Some(BackendState::Ready);

        match result {
            Ok(exit) => {
                if was_ready {
                    warn!("Backend process {} exited unexpectedly ({})", pid, exit.describe());
                } else {
                    info!("Backend process {} exited ({})", pid, exit.describe());
                }
                let _ = ctx
                    .fault_tx
                    .send(Some(format!("backend exited with {}", exit.describe())));
                let _ = ctx.event_tx.send(BackendEvent::Exited { exit, was_ready });
            }
            Err(e) => {
                error!("Failed to wait for backend process {}: {}", pid, e);
                let _ = ctx.fault_tx.send(Some(e.to_string()));
            }
        }
    })
}
