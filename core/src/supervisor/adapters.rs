//! Process adapters for abstracting process management
//!
//! The supervisor spawns the backend through a [`ProcessAdapter`] so tests
//! can substitute a scripted [`MockProcessAdapter`] for real processes.

use crate::launch::LaunchCommand;
use crate::process::{self, ChildProcess};
use crate::{CoreError, Result};
use async_trait::async_trait;
use schema::{BackendEvent, ProcessExit};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;
use tracing::debug;

/// Boxed reader over one of the child's output streams
pub type OutputReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Trait for spawning the backend in a platform-agnostic way
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Spawn a new managed process for the resolved launch command
    async fn spawn(&self, command: &LaunchCommand) -> Result<Box<dyn ManagedProcess>>;
}

/// A spawned backend process
///
/// Termination is not part of this trait; it goes through a
/// [`Terminator`](super::Terminator) by PID so it can run without owning
/// the process.
#[async_trait]
pub trait ManagedProcess: Send {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Take a readable handle to the child's stdout.
    /// Returns None if stdout was not piped or already taken.
    fn take_stdout(&mut self) -> Option<OutputReader>;

    /// Take a readable handle to the child's stderr.
    /// Returns None if stderr was not piped or already taken.
    fn take_stderr(&mut self) -> Option<OutputReader>;
}

/// Adapter spawning real OS processes with tokio
#[derive(Copy, Clone, Debug, Default)]
pub struct TokioProcessAdapter;

impl TokioProcessAdapter {
    /// Create a new adapter
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessAdapter for TokioProcessAdapter {
    async fn spawn(&self, command: &LaunchCommand) -> Result<Box<dyn ManagedProcess>> {
        let child = process::spawn(command)?;
        Ok(Box::new(TokioManagedProcess { child }))
    }
}

struct TokioManagedProcess {
    child: ChildProcess,
}

#[async_trait]
impl ManagedProcess for TokioManagedProcess {
    fn pid(&self) -> u32 {
        self.child.pid()
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(process::exit_info(self.child.pid(), status))
    }

    fn take_stdout(&mut self) -> Option<OutputReader> {
        self.child.take_stdout().map(|s| Box::pin(s) as OutputReader)
    }

    fn take_stderr(&mut self) -> Option<OutputReader> {
        self.child.take_stderr().map(|s| Box::pin(s) as OutputReader)
    }
}

/// Scripted behavior for one mock process
///
/// All offsets are measured from the moment the process is spawned, so
/// tests running on a paused clock see exact timings.
#[derive(Debug, Clone, Default)]
pub struct MockInstruction {
    /// Chunks written to stdout, each at its offset
    pub stdout: Vec<(Duration, String)>,
    /// Chunks written to stderr, each at its offset
    pub stderr: Vec<(Duration, String)>,
    /// When the process exits; `None` keeps it running until dropped
    pub exit_after: Option<Duration>,
    /// Exit code reported on exit
    pub exit_code: Option<i32>,
    /// Signal reported on exit
    pub signal: Option<i32>,
    /// Make `wait()` fail at the offset with this message
    pub wait_error: Option<(Duration, String)>,
    /// Make `spawn()` itself fail with this message
    pub spawn_error: Option<String>,
}

impl MockInstruction {
    /// A process that prints nothing and never exits
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `chunk` to stdout after `ms` milliseconds
    pub fn stdout_at(mut self, ms: u64, chunk: impl Into<String>) -> Self {
        self.stdout.push((Duration::from_millis(ms), chunk.into()));
        self
    }

    /// Write `chunk` to stderr after `ms` milliseconds
    pub fn stderr_at(mut self, ms: u64, chunk: impl Into<String>) -> Self {
        self.stderr.push((Duration::from_millis(ms), chunk.into()));
        self
    }

    /// Exit with `code` after `ms` milliseconds
    pub fn exit_at(mut self, ms: u64, code: i32) -> Self {
        self.exit_after = Some(Duration::from_millis(ms));
        self.exit_code = Some(code);
        self.signal = None;
        self
    }

    /// Die from `signal` after `ms` milliseconds
    pub fn killed_at(mut self, ms: u64, signal: i32) -> Self {
        self.exit_after = Some(Duration::from_millis(ms));
        self.exit_code = None;
        self.signal = Some(signal);
        self
    }

    /// Fail the wait after `ms` milliseconds
    pub fn wait_error_at(mut self, ms: u64, message: impl Into<String>) -> Self {
        self.wait_error = Some((Duration::from_millis(ms), message.into()));
        self
    }

    /// Refuse to spawn
    pub fn spawn_failure(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Mock process adapter for testing
///
/// Each spawn consumes the next queued instruction; an empty queue yields a
/// silent process that never exits.
#[derive(Debug, Clone, Default)]
pub struct MockProcessAdapter {
    instructions: Arc<tokio::sync::Mutex<VecDeque<MockInstruction>>>,
    spawned: Arc<tokio::sync::Mutex<Vec<LaunchCommand>>>,
}

static NEXT_MOCK_PID: AtomicU32 = AtomicU32::new(40_000);

impl MockProcessAdapter {
    /// Create a new mock adapter with no pre-configured instructions
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock adapter with the given instructions queued in order
    pub fn with_instructions(instructions: Vec<MockInstruction>) -> Self {
        Self {
            instructions: Arc::new(tokio::sync::Mutex::new(instructions.into())),
            spawned: Arc::default(),
        }
    }

    /// Queue instructions for the next spawned process
    pub async fn add_instruction(&self, instruction: MockInstruction) {
        self.instructions.lock().await.push_back(instruction);
    }

    /// Commands passed to `spawn`, in order
    pub async fn spawned_commands(&self) -> Vec<LaunchCommand> {
        self.spawned.lock().await.clone()
    }
}

#[async_trait]
impl ProcessAdapter for MockProcessAdapter {
    async fn spawn(&self, command: &LaunchCommand) -> Result<Box<dyn ManagedProcess>> {
        debug!("Spawning mock process for: {}", command.display());
        self.spawned.lock().await.push(command.clone());

        let instruction = self
            .instructions
            .lock()
            .await
            .pop_front()
            .unwrap_or_default();

        if let Some(message) = instruction.spawn_error {
            return Err(CoreError::ProcessSpawn(message));
        }

        let pid = NEXT_MOCK_PID.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockManagedProcess::new(pid, instruction)))
    }
}

struct MockManagedProcess {
    pid: u32,
    started_at: Instant,
    instruction: MockInstruction,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
}

impl MockManagedProcess {
    fn new(pid: u32, instruction: MockInstruction) -> Self {
        let started_at = Instant::now();
        let stdout = script_stream(started_at, instruction.stdout.clone());
        let stderr = script_stream(started_at, instruction.stderr.clone());
        Self {
            pid,
            started_at,
            instruction,
            stdout: Some(stdout),
            stderr: Some(stderr),
        }
    }
}

/// Feed the scripted chunks into a pipe on a background task
///
/// The write side closes after the last chunk, which the reader sees as EOF.
fn script_stream(started_at: Instant, chunks: Vec<(Duration, String)>) -> DuplexStream {
    let (reader, mut writer) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        for (offset, chunk) in chunks {
            tokio::time::sleep_until(started_at + offset).await;
            if writer.write_all(chunk.as_bytes()).await.is_err() {
                break;
            }
        }
    });
    reader
}

#[async_trait]
impl ManagedProcess for MockManagedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        if let Some((offset, message)) = &self.instruction.wait_error {
            tokio::time::sleep_until(self.started_at + *offset).await;
            return Err(CoreError::ProcessWait(message.clone()));
        }
        match self.instruction.exit_after {
            Some(offset) => tokio::time::sleep_until(self.started_at + offset).await,
            None => std::future::pending::<()>().await,
        }
        Ok(ProcessExit {
            pid: self.pid,
            exit_code: self.instruction.exit_code,
            signal: self.instruction.signal,
            timestamp: BackendEvent::current_timestamp(),
        })
    }

    fn take_stdout(&mut self) -> Option<OutputReader> {
        self.stdout.take().map(|s| Box::pin(s) as OutputReader)
    }

    fn take_stderr(&mut self) -> Option<OutputReader> {
        self.stderr.take().map(|s| Box::pin(s) as OutputReader)
    }
}
