//! Schema definitions for Tether
//!
//! This crate contains the data structures shared between the supervisor
//! core and the launcher. All types here implement JSON Schema generation
//! for external consumption (for example by the desktop renderer).

pub mod backend;
pub mod events;

pub use backend::*;
pub use events::*;
