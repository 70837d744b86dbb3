//! Core functionality for Tether
//!
//! Supervises the HTTP backend process a desktop shell depends on: resolves
//! how to launch it, spawns it, waits until it reports readiness, watches
//! for crashes and tears it down again.
//!
//! ```rust,no_run
//! use tether_core::{BackendSpec, BackendSupervisor};
//!
//! # async fn example() -> Result<(), tether_core::StartupError> {
//! let mut supervisor = BackendSupervisor::with_defaults(BackendSpec::default());
//! let status = supervisor.status();
//!
//! supervisor.start().await?;
//! assert!(status.is_running());
//!
//! supervisor.stop();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod launch;
pub mod logging;
pub mod process;
pub mod supervisor;


// Re-export schema types for convenience
pub use schema::*;

pub use error::{CoreError, Result, StartupError, StartupErrorKind};
pub use launch::LaunchCommand;
pub use logging::{LogEntry, LogRing};
pub use supervisor::{BackendSupervisor, StatusHandle, SupervisorConfig};
